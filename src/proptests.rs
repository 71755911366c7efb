use std::collections::HashMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{Config, Status, Store};

/// Reference model backed by a HashMap.
#[derive(Default)]
struct Model {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl Model {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        self.map.insert(key, value).is_none()
    }

    fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.map.get(key)
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Actions to test against both implementations
#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Put(KeyValue),
    Get(Key),
    Delete(Key),
}

/// Wrapper for key generation with custom strategy
#[derive(Debug, Clone)]
struct Key(Vec<u8>);

/// Wrapper for key-value pair
#[derive(Debug, Clone)]
struct KeyValue {
    key: Key,
    value: Vec<u8>,
}

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            // Empty key
            Just(Key(vec![])),
            // Arbitrary bytes, short and medium
            prop::collection::vec(any::<u8>(), 1..4).prop_map(Key),
            prop::collection::vec(any::<u8>(), 4..32).prop_map(Key),
            // Tiny alphabet to force overwrites, deletes of live keys,
            // and tombstone recycling
            "[ab]{1,3}".prop_map(|s| Key(s.into_bytes())),
            // Longest accepted key
            Just(Key(vec![b'k'; 255])),
        ]
        .boxed()
    }
}

impl Arbitrary for KeyValue {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<Key>(), prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(key, value)| KeyValue { key, value })
            .boxed()
    }
}

/// Test harness that executes actions on both the store and the model
struct Test {
    store: Store,
    model: Model,
    out: Vec<u8>,
}

impl Test {
    fn new() -> Self {
        // Provisioned so neither the arena nor the index can saturate
        // within one action sequence.
        let config = Config::default().with_arena_bytes(1 << 20).with_slots(4096);
        Self {
            store: Store::create(config).unwrap(),
            model: Model::default(),
            out: Vec::new(),
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Put(kv) => {
                let key = kv.key.0;
                assert_eq!(
                    self.store.put(&key, &kv.value),
                    Status::Ok,
                    "Put failed: key={:?}",
                    key
                );
                self.model.put(key, kv.value);
            }
            Action::Get(key) => {
                let store_result = self.store.get(&key.0, &mut self.out);
                match self.model.get(&key.0) {
                    Some(expected) => {
                        assert_eq!(
                            store_result,
                            Status::Ok,
                            "Get mismatch: key={:?} expected {:?}",
                            key.0,
                            expected
                        );
                        assert_eq!(
                            &self.out, expected,
                            "Get value mismatch: key={:?}",
                            key.0
                        );
                    }
                    None => {
                        assert_eq!(
                            store_result,
                            Status::NotFound,
                            "Get mismatch: key={:?} should be absent",
                            key.0
                        );
                    }
                }
            }
            Action::Delete(key) => {
                let store_result = self.store.delete(&key.0);
                let model_removed = self.model.delete(&key.0);
                let expected = if model_removed {
                    Status::Ok
                } else {
                    Status::NotFound
                };
                assert_eq!(
                    store_result, expected,
                    "Delete mismatch: key={:?}",
                    key.0
                );
            }
        }
        // Always verify the live-key count matches
        assert_eq!(
            self.store.len(),
            self.model.len(),
            "Length mismatch after action"
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn proptest_vs_hashmap(actions in prop::collection::vec(any::<Action>(), 1..64)) {
        let mut test = Test::new();
        for action in actions {
            test.execute(action);
        }
    }
}
