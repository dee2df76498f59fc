//! Any split of a byte stream into chunks yields the same records.

mod common;

use proptest::prelude::*;

use common::established;
use sptps::Mode;

fn records() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    prop::collection::vec((0u8..127, prop::collection::vec(any::<u8>(), 0..300)), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chunking_preserves_records(
        records in records(),
        cuts in prop::collection::vec(1usize..64, 1..200),
    ) {
        let (mut a, mut b) = established(Mode::Stream);
        for (ty, payload) in &records {
            a.session.send(*ty, payload).unwrap();
        }
        let wire: Vec<u8> = a.drain().concat();

        let mut rest = &wire[..];
        let mut cuts = cuts.into_iter().cycle();
        while !rest.is_empty() {
            let n = cuts.next().unwrap().min(rest.len());
            b.session.receive_all(&rest[..n]).unwrap();
            rest = &rest[n..];
        }

        prop_assert_eq!(b.app_records(), records);
    }

    #[test]
    fn prop_single_byte_feeding(payload in prop::collection::vec(any::<u8>(), 0..200)) {
        let (mut a, mut b) = established(Mode::Stream);
        a.session.send(9, &payload).unwrap();
        let wire = a.pop().unwrap();

        for byte in &wire {
            prop_assert_eq!(b.session.receive(std::slice::from_ref(byte)).unwrap(), 1);
        }
        prop_assert_eq!(b.app_records(), vec![(9u8, payload)]);
    }
}
