//! Property tests for the reference merge engine.

use listed_core::{LwwDocument, LwwEngine, MergeEngine, Update};
use proptest::prelude::*;

/// One edit: (client, key, value or removal).
type Edit = (u64, String, Option<String>);

fn edit_strategy() -> impl Strategy<Value = Edit> {
    (
        1u64..4,
        prop::string::string_regex("[a-c]").expect("Invalid regex"),
        prop::option::of(prop::string::string_regex("[a-z]{0,5}").expect("Invalid regex")),
    )
}

/// Plays the edits on one document per client and collects the updates.
fn produce_updates(edits: &[Edit]) -> Vec<Update> {
    let mut docs: Vec<LwwDocument> = (1..4).map(LwwDocument::new).collect();
    edits
        .iter()
        .map(|(client, key, value)| {
            let doc = &mut docs[(*client - 1) as usize];
            match value {
                Some(value) => doc.set(key.clone(), value.clone()),
                None => doc.remove(key.clone()),
            }
            .unwrap()
        })
        .collect()
}

fn replay<'a>(updates: impl IntoIterator<Item = &'a Update>) -> LwwDocument {
    let engine = LwwEngine::new(99);
    let mut doc = engine.create();
    for update in updates {
        engine.apply(&mut doc, update).unwrap();
    }
    doc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn applying_twice_equals_applying_once(edits in prop::collection::vec(edit_strategy(), 1..20)) {
        let updates = produce_updates(&edits);
        let once = replay(&updates);
        let twice = replay(updates.iter().chain(updates.iter()));
        prop_assert_eq!(once.encode_full().unwrap(), twice.encode_full().unwrap());
    }

    #[test]
    fn apply_order_does_not_matter(
        edits in prop::collection::vec(edit_strategy(), 1..20),
        rotation in 0usize..20,
    ) {
        let updates = produce_updates(&edits);
        let forward = replay(&updates);
        let backward = replay(updates.iter().rev());

        let mut rotated = updates.clone();
        let len = rotated.len();
        rotated.rotate_left(rotation % len);
        let rotated = replay(&rotated);

        prop_assert_eq!(forward.entries(), backward.entries());
        prop_assert_eq!(forward.encode_full().unwrap(), backward.encode_full().unwrap());
        prop_assert_eq!(forward.encode_full().unwrap(), rotated.encode_full().unwrap());
    }

    #[test]
    fn diff_exchange_converges(
        edits in prop::collection::vec(edit_strategy(), 1..20),
        split in 0usize..20,
    ) {
        let updates = produce_updates(&edits);
        let split = split % (updates.len() + 1);
        let (left, right) = updates.split_at(split);

        let engine_a = LwwEngine::new(10);
        let engine_b = LwwEngine::new(11);
        let mut a = replay(left);
        let mut b = replay(right);

        let vector_b = engine_b.encode_state_vector(&b).unwrap();
        let for_b = engine_a.encode_diff(&a, &vector_b).unwrap();
        let vector_a = engine_a.encode_state_vector(&a).unwrap();
        let for_a = engine_b.encode_diff(&b, &vector_a).unwrap();

        engine_b.apply(&mut b, &for_b).unwrap();
        engine_a.apply(&mut a, &for_a).unwrap();

        prop_assert_eq!(engine_a.encode_full(&a).unwrap(), engine_b.encode_full(&b).unwrap());
    }
}
