use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};

use crate::node::NodeRef;

/// Saved versions and the roots they point at.
///
/// An entry holds `None` when the tree was empty at save time. Roots are shared with the
/// working tree and with each other; removing an entry only drops one reference.
#[derive(Debug, Clone, Default)]
pub(crate) struct VersionStore {
    roots: BTreeMap<u64, Option<NodeRef>>,
}

impl VersionStore {
    pub fn insert(&mut self, version: u64, root: Option<NodeRef>) {
        self.roots.insert(version, root);
    }

    pub fn remove(&mut self, version: u64) -> bool {
        self.roots.remove(&version).is_some()
    }

    pub fn contains(&self, version: u64) -> bool {
        self.roots.contains_key(&version)
    }

    /// Returns the root of `version`, or `None` if it was never saved or has been deleted.
    pub fn get(&self, version: u64) -> Option<Option<&NodeRef>> {
        self.roots.get(&version).map(Option::as_ref)
    }

    pub fn latest(&self) -> Option<u64> {
        self.roots.keys().next_back().copied()
    }

    pub fn versions(&self) -> Vec<u64> {
        self.roots.keys().copied().collect()
    }

    pub fn in_range(&self, range: impl RangeBounds<u64>) -> Vec<u64> {
        self.roots.range(range).map(|(version, _)| *version).collect()
    }

    /// Versions strictly newer than `version`.
    pub fn after(&self, version: u64) -> Vec<u64> {
        self.in_range((Bound::Excluded(version), Bound::Unbounded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn store(versions: &[u64]) -> VersionStore {
        let mut store = VersionStore::default();
        for version in versions {
            store.insert(*version, Some(Node::leaf(vec![*version as u8], vec![], *version)));
        }
        store
    }

    #[test]
    fn test_insert_get_remove() {
        let mut versions = store(&[1, 2]);
        versions.insert(3, None);

        assert!(versions.contains(1));
        assert_eq!(versions.get(1).flatten().map(|root| root.key()), Some(&[1][..]));
        assert!(matches!(versions.get(3), Some(None)));
        assert!(versions.get(4).is_none());

        assert!(versions.remove(1));
        assert!(!versions.remove(1));
        assert!(!versions.contains(1));
    }

    #[test]
    fn test_latest_and_listing() {
        let versions = store(&[3, 1, 2]);

        assert_eq!(versions.latest(), Some(3));
        assert_eq!(versions.versions(), vec![1, 2, 3]);
        assert_eq!(VersionStore::default().latest(), None);
    }

    #[test]
    fn test_ranges() {
        let versions = store(&[1, 2, 4, 5, 9]);

        assert_eq!(versions.in_range(2..5), vec![2, 4]);
        assert_eq!(versions.after(4), vec![5, 9]);
        assert!(versions.after(9).is_empty());
    }

    #[test]
    fn test_after_includes_max_version() {
        let versions = store(&[u64::MAX - 1, u64::MAX]);

        assert_eq!(versions.after(1), vec![u64::MAX - 1, u64::MAX]);
        assert!(versions.after(u64::MAX).is_empty());
    }
}
