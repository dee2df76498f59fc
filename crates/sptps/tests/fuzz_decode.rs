mod common;

use rand::{thread_rng, Rng};

use common::{established, pair};
use sptps::Mode;

#[test]
fn fuzz_receive_before_handshake_never_panics() {
    let mut rng = thread_rng();
    for _ in 0..2_000 {
        let (_a, mut b) = pair(if rng.gen() { Mode::Stream } else { Mode::Datagram });
        let len: usize = rng.gen_range(0..512);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = b.session.receive(&data);
    }
}

#[test]
fn fuzz_receive_after_handshake_never_panics() {
    let mut rng = thread_rng();
    let (_a, mut stream) = established(Mode::Stream);
    let (_c, mut datagram) = established(Mode::Datagram);

    for _ in 0..10_000 {
        let len: usize = rng.gen_range(0..2048);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = stream.session.receive(&data);
        let _ = datagram.session.receive(&data);
        let _ = datagram.session.verify_datagram(&data);
    }
}

#[test]
fn random_mutation_of_valid_datagram_is_rejected() {
    let mut rng = thread_rng();
    let (mut a, mut b) = established(Mode::Datagram);
    a.session.send(0, b"mutate me").unwrap();
    let datagram = a.pop().unwrap();

    for _ in 0..1_000 {
        let mut mutated = datagram.clone();
        let idx = rng.gen_range(4..mutated.len());
        mutated[idx] ^= rng.gen_range(1..=255u8);
        assert!(!b.session.verify_datagram(&mutated));
        assert!(b.session.receive(&mutated).is_err());
    }

    b.session.receive(&datagram).unwrap();
    assert_eq!(b.app_records().len(), 1);
}
