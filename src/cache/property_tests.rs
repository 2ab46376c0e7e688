//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check keying and storage invariants over generated inputs.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::cache::{CacheEntry, CacheStore, EntryKey, GroupKey, KeyDeriver};

// == Strategies ==
/// Generates group names
fn group_strategy() -> impl Strategy<Value = String> {
    "[a-z_]{1,16}".prop_map(|s| s)
}

/// Generates non-empty argument lists
fn args_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(any::<i64>(), 1..8)
}

#[derive(Debug, Clone)]
enum StoreOp {
    Store { group: String, arg: u8 },
    RemoveEntry { group: String, arg: u8 },
    RemoveGroup { group: String },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    let group = "[abc]";
    prop_oneof![
        (group, 0u8..4).prop_map(|(group, arg)| StoreOp::Store { group, arg }),
        (group, 0u8..4).prop_map(|(group, arg)| StoreOp::RemoveEntry { group, arg }),
        group.prop_map(|group| StoreOp::RemoveGroup { group }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Identical argument lists always derive identical keys.
    #[test]
    fn prop_key_derivation_deterministic(source in group_strategy(), args in args_strategy()) {
        let deriver = KeyDeriver::default();
        let first = deriver.computation_key(&source, &args).unwrap();
        let second = deriver.computation_key(&source, &args.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    // Reordering arguments changes the entry key.
    #[test]
    fn prop_argument_order_is_identity(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let deriver = KeyDeriver::default();
        prop_assert_ne!(
            deriver.args_key(&(a, b)).unwrap(),
            deriver.args_key(&(b, a)).unwrap()
        );
    }

    // Map arguments are keyed independently of insertion order.
    #[test]
    fn prop_map_order_is_not_identity(
        fields in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 1..8)
    ) {
        let deriver = KeyDeriver::default();
        let shuffled: HashMap<String, i32> = fields.iter().rev().map(|(k, v)| (k.clone(), *v)).collect();
        let ordered: BTreeMap<String, i32> = fields;
        prop_assert_eq!(
            deriver.args_key(&(ordered,)).unwrap(),
            deriver.args_key(&(shuffled,)).unwrap()
        );
    }

    // Non-empty argument lists never collapse to the empty sentinel.
    #[test]
    fn prop_non_empty_args_not_sentinel(args in args_strategy()) {
        let deriver = KeyDeriver::default();
        prop_assert_ne!(deriver.args_key(&args).unwrap(), EntryKey::Empty);
    }

    // After any sequence of operations, the store holds exactly the entries
    // a plain model would, and removing an entry never touches its siblings.
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        let mut store = CacheStore::new();
        let mut model: BTreeMap<(String, u8), usize> = BTreeMap::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                StoreOp::Store { group, arg } => {
                    store.store(
                        GroupKey::Name(group.clone()),
                        EntryKey::Fingerprint(u64::from(arg)),
                        CacheEntry::new(step, true),
                    );
                    model.insert((group, arg), step);
                }
                StoreOp::RemoveEntry { group, arg } => {
                    let removed = store.remove_entry(
                        &GroupKey::Name(group.clone()),
                        &EntryKey::Fingerprint(u64::from(arg)),
                    );
                    prop_assert_eq!(removed, model.remove(&(group, arg)).is_some());
                }
                StoreOp::RemoveGroup { group } => {
                    store.remove_group(&GroupKey::Name(group.clone()));
                    model.retain(|(g, _), _| *g != group);
                }
            }
        }

        prop_assert_eq!(store.len(), model.len());
        for ((group, arg), step) in &model {
            let stored = store
                .lookup(&GroupKey::Name(group.clone()), &EntryKey::Fingerprint(u64::from(*arg)))
                .and_then(|entry| entry.cached::<usize>())
                .map(|cached| cached.get());
            prop_assert_eq!(stored, Some(*step));
        }
    }
}
