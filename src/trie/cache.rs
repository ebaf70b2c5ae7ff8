//! Write-back node cache between the trie and its backing store
//!
//! Stored nodes are reference counted. Equal subtrees at different key
//! positions hash the same and share one record, so a record is only removed
//! once every position that used it has been superseded.

use super::codec;
use super::node::Node;
use crate::model::Hash;
use crate::store::KeyValueStore;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Key prefix of node records in the backing store
pub const NODE_PREFIX: u8 = 0xf0;

/// Backing-store key of the node with `hash`
pub fn node_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + Hash::LEN);
    key.push(NODE_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryState {
    /// Matches the backing store
    Clean,
    /// Must be written on commit
    Changed,
    /// Must be removed on commit
    Deleted,
}

#[derive(Debug)]
struct CacheEntry {
    encoded: Vec<u8>,
    references: u32,
    /// Count held by the backing store, 0 if the record is not there
    stored: u32,
    state: EntryState,
}

/// Counts reported by [`NodeCache::commit`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Records written (new nodes and changed reference counts)
    pub written: usize,
    /// Records removed from the backing store
    pub removed: usize,
}

/// Resolves, stages and flushes trie nodes
///
/// The cache is the only component that touches the backing store.
pub struct NodeCache<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
    retain_history: bool,
    entries: HashMap<Hash, CacheEntry>,
}

impl<'a, S: KeyValueStore + ?Sized> NodeCache<'a, S> {
    /// Create a cache over `store`
    pub fn new(store: &'a S, retain_history: bool) -> Self {
        NodeCache {
            store,
            retain_history,
            entries: HashMap::new(),
        }
    }

    /// Whether superseded nodes are kept
    pub fn retain_history(&self) -> bool {
        self.retain_history
    }

    pub(crate) fn set_retain_history(&mut self, retain: bool) {
        self.retain_history = retain;
    }

    /// Number of staged records awaiting commit
    pub fn pending(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state != EntryState::Clean)
            .count()
    }

    /// Load the node stored under `hash`
    ///
    /// A node that is absent, or was deleted earlier in this batch, means the
    /// store no longer matches the trie: that is a [`Error::MissingNode`].
    pub fn resolve(&self, hash: &Hash) -> Result<Node> {
        if let Some(entry) = self.entries.get(hash) {
            if entry.state == EntryState::Deleted {
                warn!(node = %hash, "resolving a node deleted in this batch");
                return Err(Error::MissingNode(*hash));
            }
            trace!(node = %hash, "resolved from cache");
            return codec::decode(hash, &entry.encoded);
        }

        match self.store.get(&node_key(hash))? {
            Some(record) => {
                trace!(node = %hash, "resolved from store");
                codec::decode_record(hash, &record).map(|(node, _)| node)
            }
            None => {
                warn!(node = %hash, "node missing from backing store");
                Err(Error::MissingNode(*hash))
            }
        }
    }

    /// Stage one more reference to the node with the given encoding
    pub fn put_node(&mut self, hash: Hash, encoded: Vec<u8>) -> Result<()> {
        if self.load(&hash)? {
            if let Some(entry) = self.entries.get_mut(&hash) {
                entry.references += 1;
                entry.encoded = encoded;
                entry.state = EntryState::Changed;
            }
        } else {
            self.entries.insert(
                hash,
                CacheEntry {
                    encoded,
                    references: 1,
                    stored: 0,
                    state: EntryState::Changed,
                },
            );
        }
        Ok(())
    }

    /// Drop one reference to a stored node
    ///
    /// No-op when history is retained or the node was never stored.
    pub fn delete_node(&mut self, hash: &Hash) -> Result<()> {
        if self.retain_history || !self.load(hash)? {
            return Ok(());
        }
        if let Some(entry) = self.entries.get_mut(hash) {
            if entry.state == EntryState::Deleted {
                return Ok(());
            }
            entry.references = entry.references.saturating_sub(1);
            entry.state = if entry.references == 0 {
                EntryState::Deleted
            } else {
                EntryState::Changed
            };
        }
        Ok(())
    }

    /// Write every dirty node under `node` bottom-up and stage it
    ///
    /// Children are flushed before their parent, so each encoding embeds
    /// final child hashes. Flushed nodes keep their hash cached.
    pub fn flush(&mut self, node: &mut Node) -> Result<()> {
        if !node.is_dirty() {
            return Ok(());
        }
        match node {
            Node::Extension(ext) => self.flush(&mut ext.next)?,
            Node::Branch(branch) => {
                for child in branch.children.iter_mut() {
                    self.flush(child)?;
                }
            }
            Node::Leaf(_) | Node::Empty | Node::Hash(_) => {}
        }
        let encoded = codec::encode(node);
        let hash = Hash::digest(&encoded);
        self.put_node(hash, encoded)?;
        node.set_hash(hash);
        Ok(())
    }

    /// Apply staged records to the backing store and clear the stage
    pub fn commit(&mut self) -> Result<CommitStats> {
        let written = self.write()?;
        let mut stats = self.reclaim()?;
        stats.written += written;
        Ok(stats)
    }

    /// Write new records and raised counts, leaving releases staged
    ///
    /// No count is lowered in this phase, so a failure here leaves every
    /// previously committed root intact. Records written before the failure
    /// stay in the store with their raised counts.
    pub fn write(&mut self) -> Result<usize> {
        let mut written = 0;
        for (hash, entry) in self.entries.iter_mut() {
            if entry.state != EntryState::Changed || entry.references <= entry.stored {
                continue;
            }
            let record = codec::encode_record(&entry.encoded, entry.references);
            self.store.put(&node_key(hash), &record)?;
            entry.stored = entry.references;
            entry.state = EntryState::Clean;
            written += 1;
        }
        debug!(written, "wrote node records");
        Ok(written)
    }

    /// Apply lowered counts and removals, then clear the stage
    ///
    /// The stage is cleared even if the store fails; whatever was not
    /// released stays in the store with its old count.
    pub fn reclaim(&mut self) -> Result<CommitStats> {
        let mut stats = CommitStats::default();
        for (hash, entry) in self.entries.drain() {
            match entry.state {
                EntryState::Clean => {}
                EntryState::Changed => {
                    let record = codec::encode_record(&entry.encoded, entry.references);
                    self.store.put(&node_key(&hash), &record)?;
                    stats.written += 1;
                }
                EntryState::Deleted => {
                    self.store.delete(&node_key(&hash))?;
                    stats.removed += 1;
                }
            }
        }
        debug!(
            written = stats.written,
            removed = stats.removed,
            "released node records"
        );
        Ok(stats)
    }

    /// Forget everything staged since the last commit
    pub fn discard(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            warn!(pending, "discarding staged nodes");
        }
        self.entries.clear();
    }

    /// Make sure `hash` has an entry if the store knows it; false if not
    fn load(&mut self, hash: &Hash) -> Result<bool> {
        if self.entries.contains_key(hash) {
            return Ok(true);
        }
        match self.store.get(&node_key(hash))? {
            Some(record) => {
                let (encoded, references) = codec::split_record(&record)?;
                self.entries.insert(
                    *hash,
                    CacheEntry {
                        encoded,
                        references,
                        stored: references,
                        state: EntryState::Clean,
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn leaf(value: &[u8]) -> (Hash, Vec<u8>) {
        let encoded = codec::encode(&Node::leaf(value.to_vec()));
        (Hash::digest(&encoded), encoded)
    }

    fn references(store: &MemoryStore, hash: &Hash) -> Option<u32> {
        store
            .get(&node_key(hash))
            .unwrap()
            .map(|record| codec::split_record(&record).unwrap().1)
    }

    #[test]
    fn test_put_then_resolve() {
        let store = MemoryStore::new();
        let mut cache = NodeCache::new(&store, false);
        let (hash, encoded) = leaf(b"value");

        cache.put_node(hash, encoded).unwrap();
        // visible before commit
        assert_eq!(cache.resolve(&hash).unwrap().hash(), hash);
        assert!(store.is_empty());

        let stats = cache.commit().unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(references(&store, &hash), Some(1));
        assert_eq!(cache.resolve(&hash).unwrap().hash(), hash);
    }

    #[test]
    fn test_missing_node_is_fatal() {
        let store = MemoryStore::new();
        let cache = NodeCache::new(&store, false);
        let err = cache.resolve(&Hash::digest(b"nowhere")).unwrap_err();
        assert!(matches!(err, Error::MissingNode(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reference_counting() {
        let store = MemoryStore::new();
        let (hash, encoded) = leaf(b"shared");

        let mut cache = NodeCache::new(&store, false);
        cache.put_node(hash, encoded.clone()).unwrap();
        cache.put_node(hash, encoded).unwrap();
        cache.commit().unwrap();
        assert_eq!(references(&store, &hash), Some(2));

        let mut cache = NodeCache::new(&store, false);
        cache.delete_node(&hash).unwrap();
        cache.commit().unwrap();
        assert_eq!(references(&store, &hash), Some(1));

        let mut cache = NodeCache::new(&store, false);
        cache.delete_node(&hash).unwrap();
        let stats = cache.commit().unwrap();
        assert_eq!(stats.removed, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_then_put_in_one_batch() {
        let store = MemoryStore::new();
        let (hash, encoded) = leaf(b"same");

        let mut cache = NodeCache::new(&store, false);
        cache.put_node(hash, encoded.clone()).unwrap();
        cache.commit().unwrap();

        cache.delete_node(&hash).unwrap();
        assert!(cache.resolve(&hash).is_err());
        cache.put_node(hash, encoded).unwrap();
        cache.commit().unwrap();
        assert_eq!(references(&store, &hash), Some(1));
    }

    #[test]
    fn test_write_leaves_releases_staged() {
        let store = MemoryStore::new();
        let (old, old_encoded) = leaf(b"old");
        let (new, new_encoded) = leaf(b"new");

        let mut cache = NodeCache::new(&store, false);
        cache.put_node(old, old_encoded.clone()).unwrap();
        cache.put_node(old, old_encoded).unwrap();
        cache.commit().unwrap();

        cache.delete_node(&old).unwrap();
        cache.put_node(new, new_encoded).unwrap();
        assert_eq!(cache.write().unwrap(), 1);
        assert_eq!(references(&store, &new), Some(1));
        // lowered count is still staged
        assert_eq!(references(&store, &old), Some(2));
        assert_eq!(cache.pending(), 1);

        let released = cache.reclaim().unwrap();
        assert_eq!(released.written, 1);
        assert_eq!(references(&store, &old), Some(1));
        assert_eq!(cache.pending(), 0);
    }

    #[test]
    fn test_retain_history_keeps_nodes() {
        let store = MemoryStore::new();
        let (hash, encoded) = leaf(b"old");

        let mut cache = NodeCache::new(&store, true);
        assert!(cache.retain_history());
        cache.put_node(hash, encoded).unwrap();
        cache.commit().unwrap();

        cache.delete_node(&hash).unwrap();
        assert_eq!(cache.pending(), 0);
        cache.commit().unwrap();
        assert_eq!(references(&store, &hash), Some(1));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let store = MemoryStore::new();
        let mut cache = NodeCache::new(&store, false);
        cache.delete_node(&Hash::digest(b"unknown")).unwrap();
        assert_eq!(cache.commit().unwrap(), CommitStats::default());
    }

    #[test]
    fn test_flush_writes_children_first() {
        let store = MemoryStore::new();
        let mut cache = NodeCache::new(&store, false);

        let mut node = Node::extension(
            crate::model::NibblePath::from_bytes(&[0xab]),
            Node::leaf(b"v".to_vec()),
        );
        let expected = node.hash();
        cache.flush(&mut node).unwrap();

        assert!(!node.is_dirty());
        assert_eq!(node.hash(), expected);
        assert_eq!(cache.pending(), 2);
        cache.commit().unwrap();
        assert_eq!(store.len(), 2);

        let Node::Extension(ext) = &node else {
            panic!("expected extension");
        };
        assert!(!ext.next().is_dirty());
        assert_eq!(cache.resolve(&ext.next().hash()).unwrap().hash(), ext.next().hash());
    }

    #[test]
    fn test_discard_drops_stage() {
        let store = MemoryStore::new();
        let mut cache = NodeCache::new(&store, false);
        let (hash, encoded) = leaf(b"v");
        cache.put_node(hash, encoded).unwrap();
        cache.discard();
        cache.commit().unwrap();
        assert!(store.is_empty());
    }
}
