use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::{
    hash::DefaultDigest,
    node::{self, NodeRef},
    prelude::*,
    proof,
    tree::{self, Set},
    version::VersionStore,
};

/// The working tree: absorbs mutations and checkpoints them as numbered versions.
///
/// Mutations never touch saved versions; they build new nodes along the modified path and
/// share everything else. Saved versions are read through [`get_versioned`], proven through
/// [`get_versioned_with_proof`] and detached as snapshots with [`get_immutable`].
///
/// [`get_versioned`]: MutableTree::get_versioned
/// [`get_versioned_with_proof`]: MutableTree::get_versioned_with_proof
/// [`get_immutable`]: MutableTree::get_immutable
pub struct MutableTree<D: Digest32 = DefaultDigest, S: NodeStore = MemoryStore> {
    root: Option<NodeRef>,
    versions: VersionStore,
    /// Latest saved version, zero before the first save.
    version: u64,
    options: Options,
    store: S,
    _digest: PhantomData<fn() -> D>,
}

impl<D: Digest32, S: NodeStore + Default> MutableTree<D, S> {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self::with_store(S::default(), options)
    }
}

impl<D: Digest32, S: NodeStore + Default> Default for MutableTree<D, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest32, S: NodeStore> MutableTree<D, S> {
    pub fn with_store(store: S, options: Options) -> Self {
        Self {
            root: None,
            versions: VersionStore::default(),
            version: 0,
            options,
            store,
            _digest: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The version the next [`save_version`](Self::save_version) will create. New nodes are
    /// stamped with it.
    ///
    /// Fails with [`Error::VersionOverflow`] once `u64::MAX` has been saved.
    pub fn working_version(&self) -> Result<u64> {
        if self.version == 0 {
            return Ok(self.options.first_version());
        }

        self.version
            .checked_add(1)
            .ok_or(Error::VersionOverflow(self.version))
    }

    /// Creation version for new nodes. Past the last version nothing can be saved anyway.
    fn stamp(&self) -> u64 {
        self.working_version().unwrap_or(u64::MAX)
    }

    /// Inserts or replaces `key`. Returns `true` if the key already existed.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        match tree::set(self.root.as_ref(), key, value, self.stamp()) {
            Set::Unchanged => true,
            Set::Updated(root) => {
                self.root = Some(root);
                true
            }
            Set::Inserted(root) => {
                self.root = Some(root);
                false
            }
        }
    }

    /// Removes `key`, returning its value, or `None` if it was not there.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let (root, value) = tree::remove(self.root.as_ref(), key, self.stamp())?;
        self.root = root;
        Some(value)
    }

    /// Checkpoints the working tree as a new version and returns its hash and number.
    ///
    /// Nodes created since the previous save and the new root are written to the node store
    /// first. If the store fails, the error is returned, no version is registered and the
    /// working tree is left as it was, so the save can be retried.
    pub fn save_version(&mut self) -> Result<(Hash, u64)> {
        let version = self.working_version()?;
        let hash = self.hash();

        if let Err(error) = self.persist(version, hash) {
            warn!(version, %error, "node store failed, version not saved");
            return Err(error);
        }

        self.versions.insert(version, self.root.clone());
        self.version = version;

        debug!(version, %hash, size = self.size(), "saved version");
        Ok((hash, version))
    }

    fn persist(&mut self, version: u64, hash: Hash) -> Result<()> {
        if let Some(root) = &self.root {
            persist_nodes::<D, S>(&mut self.store, root, version).map_err(Error::storage)?;
        }

        self.store
            .save_root(version, self.root.as_ref().map(|_| hash))
            .map_err(Error::storage)
    }

    /// Drops version `version`. Nodes still reachable from other versions or from the
    /// working tree are kept.
    ///
    /// The latest saved version cannot be deleted, since the working tree is built on it.
    pub fn delete_version(&mut self, version: u64) -> Result<()> {
        if !self.versions.contains(version) {
            return Err(Error::VersionNotFound(version));
        }

        if version == self.version {
            return Err(Error::ActiveVersion(version));
        }

        self.store.delete_root(version).map_err(Error::storage)?;
        self.versions.remove(version);

        debug!(version, "deleted version");
        Ok(())
    }

    /// Deletes every saved version in `[from, to)` except the latest one. Gaps are skipped.
    pub fn delete_versions_range(&mut self, from: u64, to: u64) -> Result<()> {
        if from >= to {
            return Err(Error::InvalidVersionRange { from, to });
        }

        for version in self.versions.in_range(from..to) {
            if version != self.version {
                self.delete_version(version)?;
            }
        }

        Ok(())
    }

    pub fn version_exists(&self, version: u64) -> bool {
        self.versions.contains(version)
    }

    /// Saved versions, oldest first.
    pub fn available_versions(&self) -> Vec<u64> {
        self.versions.versions()
    }

    /// The newest saved version, if any.
    pub fn latest_version(&self) -> Option<u64> {
        self.versions.latest()
    }

    fn versioned_root(&self, version: u64) -> Result<Option<&NodeRef>> {
        self.versions
            .get(version)
            .ok_or(Error::VersionNotFound(version))
    }

    /// Looks `key` up in a saved version, returning its rank and value.
    pub fn get_versioned(&self, key: &[u8], version: u64) -> Result<(u64, Option<&[u8]>)> {
        Ok(tree::get(self.versioned_root(version)?, key))
    }

    /// Looks `key` up in a saved version and proves the answer against that version's hash.
    pub fn get_versioned_with_proof(
        &self,
        key: &[u8],
        version: u64,
    ) -> Result<(Option<&[u8]>, Proof)> {
        Ok(proof::build::<D>(self.versioned_root(version)?, key))
    }

    /// Returns a read-only snapshot of a saved version.
    pub fn get_immutable(&self, version: u64) -> Result<ImmutableTree<D>> {
        let root = self.versioned_root(version)?;
        Ok(ImmutableTree::new(root.cloned(), version))
    }

    /// Discards every change made since the last save.
    pub fn rollback(&mut self) {
        self.root = self.versions.get(self.version).flatten().cloned();
        debug!(version = self.version, "rolled back working tree");
    }

    /// Resets the working tree to `version` and deletes every newer version, so that the
    /// next save overwrites them.
    pub fn load_version_for_overwriting(&mut self, version: u64) -> Result<u64> {
        let root = self.versioned_root(version)?.cloned();

        for newer in self.versions.after(version) {
            self.store.delete_root(newer).map_err(Error::storage)?;
            self.versions.remove(newer);
        }

        self.root = root;
        self.version = version;

        debug!(version, "loaded version for overwriting");
        Ok(version)
    }
}

/// Writes the nodes stamped with `version`, children first.
///
/// Older nodes were written by the save that created them, so their subtrees are skipped.
fn persist_nodes<D: Digest32, S: NodeStore>(
    store: &mut S,
    node: &NodeRef,
    version: u64,
) -> Result<(), S::Error> {
    if node.version() != version {
        return Ok(());
    }

    if let (Some(left), Some(right)) = (node.left(), node.right()) {
        persist_nodes::<D, S>(store, left, version)?;
        persist_nodes::<D, S>(store, right, version)?;
    }

    store.save_node(node.hash::<D>(), node::encode::<D>(node))
}

impl<D: Digest32, S: NodeStore> TreeView for MutableTree<D, S> {
    type Hasher = D;

    fn root_node(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl<D: Digest32, S: NodeStore + Debug> Debug for MutableTree<D, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableTree")
            .field("version", &self.version)
            .field("versions", &self.versions.versions())
            .field("size", &self.size())
            .field("options", &self.options)
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use blake2::Blake2s256;
    use blake3::Hasher as Blake3;
    use sha2::Sha256;

    use super::*;

    type Tree = MutableTree<Blake3, MemoryStore>;

    crate::test_tree_properties!(Blake3);
    crate::test_tree_properties!(Blake2s256);
    crate::test_tree_properties!(Sha256);

    #[test]
    fn test_set_reports_updates() {
        let mut tree = Tree::new();

        assert!(!tree.set(b"a", b"1"));
        assert!(tree.set(b"a", b"2"));
        assert!(tree.set(b"a", b"2"));
        assert_eq!(tree.get(b"a"), (0, Some(&b"2"[..])));
    }

    #[test]
    fn test_remove_missing_key_is_a_no_op() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        let before = tree.hash();

        assert_eq!(tree.remove(b"z"), None);
        assert_eq!(tree.hash(), before);
        assert_eq!(tree.remove(b"a"), Some(b"1".to_vec()));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_versions_count_up_from_initial_version() {
        let mut tree = Tree::with_options(Options::new().initial_version(10));

        assert_eq!(tree.version(), 0);
        assert_eq!(tree.working_version().unwrap(), 10);
        assert_eq!(tree.save_version().unwrap().1, 10);
        assert_eq!(tree.save_version().unwrap().1, 11);
        assert_eq!(tree.available_versions(), vec![10, 11]);
        assert_eq!(tree.latest_version(), Some(11));
    }

    #[test]
    fn test_last_version_cannot_be_followed() {
        let mut tree = Tree::with_options(Options::new().initial_version(u64::MAX));
        tree.set(b"a", b"1");
        assert_eq!(tree.save_version().unwrap().1, u64::MAX);

        tree.set(b"b", b"2");
        let working = tree.hash();

        assert!(matches!(tree.working_version(), Err(Error::VersionOverflow(u64::MAX))));
        assert!(matches!(tree.save_version(), Err(Error::VersionOverflow(u64::MAX))));
        assert_eq!(tree.available_versions(), vec![u64::MAX]);
        assert_eq!(tree.version(), u64::MAX);
        assert_eq!(tree.hash(), working);
        assert_eq!(tree.get_versioned(b"b", u64::MAX).unwrap().1, None);
    }

    #[test]
    fn test_empty_tree_saves_empty_hash() {
        let mut tree = Tree::new();
        let (hash, version) = tree.save_version().unwrap();

        assert_eq!(hash, Hash::empty::<Blake3>());
        assert_eq!(tree.store().root(version), Some(None));
    }

    #[test]
    fn test_only_new_nodes_are_persisted() {
        let mut tree = Tree::new();
        for key in 0..16u8 {
            tree.set(&[key], &[key]);
        }
        tree.save_version().unwrap();
        let after_first = tree.store().node_count();
        assert_eq!(after_first, 31);

        tree.set(&[3], b"changed");
        tree.save_version().unwrap();
        let written = tree.store().node_count() - after_first;

        let (_, Proof::Existence(leaf)) = tree.get_with_proof(&[3]) else {
            panic!("key 3 should exist");
        };
        assert_eq!(written, 1 + leaf.path.len());
    }

    #[test]
    fn test_persisted_root_reads_back() {
        let mut tree = Tree::new();
        for (key, value) in [(b"a", b"1"), (b"b", b"2"), (b"c", b"3")] {
            tree.set(key, value);
        }
        let (hash, version) = tree.save_version().unwrap();
        let root = tree.root_node().unwrap();

        let bytes = tree.store().node(&hash).unwrap();
        assert_eq!(bytes, node::encode::<Blake3>(root).as_slice());
        assert_eq!(bytes[0], 0x01);
        assert_eq!(tree.store().root(version), Some(Some(hash)));

        let leaf = tree.store().node(&Hash::leaf::<Blake3>(b"b", b"2")).unwrap();
        assert_eq!(leaf[0], 0x00);
        assert!(tree.store().node(&Hash::leaf::<Blake3>(b"b", b"3")).is_none());
    }

    #[test]
    fn test_saved_version_is_isolated_from_working_changes() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        let (hash, version) = tree.save_version().unwrap();

        tree.set(b"a", b"2");
        tree.set(b"b", b"3");

        assert_eq!(tree.get_versioned(b"a", version).unwrap().1, Some(&b"1"[..]));
        assert_eq!(tree.get_versioned(b"b", version).unwrap().1, None);
        assert_eq!(tree.get_immutable(version).unwrap().hash(), hash);
        assert_ne!(tree.hash(), hash);
    }

    #[test]
    fn test_delete_version_errors() {
        let mut tree = Tree::new();
        tree.save_version().unwrap();
        tree.save_version().unwrap();

        assert!(matches!(tree.delete_version(7), Err(Error::VersionNotFound(7))));
        assert!(matches!(tree.delete_version(2), Err(Error::ActiveVersion(2))));

        tree.delete_version(1).unwrap();
        assert!(!tree.version_exists(1));
        assert!(matches!(tree.delete_version(1), Err(Error::VersionNotFound(1))));
        assert_eq!(tree.store().root(1), None);
    }

    #[test]
    fn test_delete_versions_range_keeps_latest() {
        let mut tree = Tree::new();
        for _ in 0..5 {
            tree.save_version().unwrap();
        }
        tree.delete_version(3).unwrap();

        tree.delete_versions_range(2, 6).unwrap();
        assert_eq!(tree.available_versions(), vec![1, 5]);

        assert!(matches!(
            tree.delete_versions_range(4, 4),
            Err(Error::InvalidVersionRange { from: 4, to: 4 })
        ));
    }

    #[test]
    fn test_rollback() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        let (hash, _) = tree.save_version().unwrap();

        tree.set(b"b", b"2");
        tree.remove(b"a");
        tree.rollback();

        assert_eq!(tree.hash(), hash);
        assert!(tree.has(b"a"));
        assert!(!tree.has(b"b"));
    }

    #[test]
    fn test_rollback_before_first_save_empties_the_tree() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        tree.rollback();

        assert!(tree.is_empty());
    }

    #[test]
    fn test_load_version_for_overwriting() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        let (first, _) = tree.save_version().unwrap();
        tree.set(b"a", b"2");
        tree.save_version().unwrap();
        tree.set(b"a", b"3");
        tree.save_version().unwrap();

        assert_eq!(tree.load_version_for_overwriting(1).unwrap(), 1);
        assert_eq!(tree.available_versions(), vec![1]);
        assert_eq!(tree.hash(), first);
        assert_eq!(tree.store().versions().collect::<Vec<_>>(), vec![1]);

        tree.set(b"a", b"4");
        assert_eq!(tree.save_version().unwrap().1, 2);
        assert_eq!(tree.get_versioned(b"a", 2).unwrap().1, Some(&b"4"[..]));

        assert!(matches!(
            tree.load_version_for_overwriting(9),
            Err(Error::VersionNotFound(9))
        ));
    }

    #[test]
    fn test_versioned_proof() {
        let mut tree = Tree::new();
        tree.set(b"a", b"1");
        tree.set(b"c", b"3");
        let (hash, version) = tree.save_version().unwrap();
        tree.set(b"b", b"2");

        let (value, proof) = tree.get_versioned_with_proof(b"b", version).unwrap();
        assert_eq!(value, None);
        assert!(proof.verify::<Blake3>(&hash, b"b", None));

        assert!(tree.get_versioned_with_proof(b"b", 42).is_err());
    }
}
