//! Strategies and helpers for property tests over trees.

use std::collections::BTreeMap;

use proptest::{
    collection::vec,
    prelude::*,
    sample::SizeRange,
};

use crate::prelude::*;

/// A single mutation of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Set(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

impl Arbitrary for Operation {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            3 => (key(), value()).prop_map(|(key, value)| Operation::Set(key, value)),
            1 => key().prop_map(Operation::Remove),
        ]
        .boxed()
    }
}

/// Short keys over a small alphabet, so that generated operations collide often.
pub fn key() -> impl Strategy<Value = Vec<u8>> {
    vec(0u8..16, 1..4)
}

pub fn value() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..8)
}

pub fn keys(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Vec<u8>>> {
    vec(key(), size)
}

pub fn entries(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    vec((key(), value()), size)
}

pub fn operations(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Operation>> {
    vec(any::<Operation>(), size)
}

/// Applies `operations` to both a tree and a plain ordered map.
pub fn apply<D: Digest32, S: NodeStore>(
    tree: &mut MutableTree<D, S>,
    model: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    operations: &[Operation],
) {
    for operation in operations {
        match operation {
            Operation::Set(key, value) => {
                tree.set(key, value);
                model.insert(key.clone(), value.clone());
            }
            Operation::Remove(key) => {
                tree.remove(key);
                model.remove(key);
            }
        }
    }
}

/// Builds a fresh tree from `operations`, along with the map it should match.
pub fn build<D: Digest32, S: NodeStore + Default>(
    operations: &[Operation],
) -> (MutableTree<D, S>, BTreeMap<Vec<u8>, Vec<u8>>) {
    let mut tree = MutableTree::new();
    let mut model = BTreeMap::new();
    apply(&mut tree, &mut model, operations);
    (tree, model)
}
