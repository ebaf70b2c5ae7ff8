//! The trie: one owned root node over a node cache

use super::cache::NodeCache;
use super::config::TrieConfig;
use super::node::{Node, VALUE_SLOT};
use crate::model::Hash;
use crate::store::KeyValueStore;
use crate::{Error, Result, MAX_KEY_LENGTH};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A Merkle Patricia Trie over a backing store
///
/// Mutations build up in memory and reach the store on [`Trie::commit`].
/// One instance must not be mutated from several threads at once.
pub struct Trie<'a, S: KeyValueStore + ?Sized> {
    pub(super) cache: NodeCache<'a, S>,
    pub(super) root: Node,
    /// Root hash as of the last commit; rollback target
    committed: Hash,
    config: TrieConfig,
}

/// Shape of a trie, as counted by [`Trie::verify`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrieStats {
    /// Number of stored values
    pub entries: usize,
    /// Number of leaf, extension and branch nodes
    pub nodes: usize,
    pub branches: usize,
    pub extensions: usize,
    /// Longest key in nibbles
    pub max_depth: usize,
}

/// Where a node sits relative to its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    Root,
    Extension,
    BranchChild,
    ValueSlot,
}

impl<'a, S: KeyValueStore + ?Sized> Trie<'a, S> {
    /// Create a new empty trie
    pub fn new(store: &'a S) -> Self {
        Self::from_root(store, Hash::ZERO)
    }

    /// Open the trie committed under `root_hash`
    ///
    /// Nodes are resolved lazily, so a root that is missing from the store
    /// is only reported by the first operation that needs it.
    pub fn from_root(store: &'a S, root_hash: Hash) -> Self {
        let config = TrieConfig::default();
        Trie {
            cache: NodeCache::new(store, config.retain_history),
            root: Node::from_root(root_hash),
            committed: root_hash,
            config,
        }
    }

    /// Use the given configuration
    pub fn with_config(mut self, config: TrieConfig) -> Self {
        self.cache.set_retain_history(config.retain_history);
        self.config = config;
        self
    }

    pub fn config(&self) -> &TrieConfig {
        &self.config
    }

    /// The current root hash, including uncommitted changes
    pub fn root_hash(&self) -> Hash {
        self.root.hash()
    }

    /// The root hash recorded by the last commit
    pub fn committed_root(&self) -> Hash {
        self.committed
    }

    /// Check if the trie holds no entries
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The root node
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Write all changes to the backing store and return the new root hash
    ///
    /// If a node cannot be written the trie rolls back to the last committed
    /// root, as a failed `put` or `delete` does. Once every node is written
    /// the new root is committed, even if reclaiming superseded records
    /// fails afterwards.
    pub fn commit(&mut self) -> Result<Hash> {
        let written = match self
            .cache
            .flush(&mut self.root)
            .and_then(|()| self.cache.write())
        {
            Ok(written) => written,
            Err(err) => {
                warn!(error = %err, root = %self.committed, "commit failed, rolling back");
                self.rollback();
                return Err(err);
            }
        };

        let root = self.root.hash();
        debug!(previous = %self.committed, "replacing committed root");
        self.committed = root;

        let released = self.cache.reclaim().map_err(|err| {
            warn!(error = %err, root = %root, "superseded nodes were not released");
            err
        })?;
        info!(
            root = %root,
            written = written + released.written,
            removed = released.removed,
            "committed trie"
        );
        Ok(root)
    }

    /// Drop uncommitted changes and return to the last committed root
    pub fn rollback(&mut self) {
        self.cache.discard();
        self.root = Node::from_root(self.committed);
    }

    /// Run a mutation over the owned root
    ///
    /// The root is moved into `op` and the result moved back. If `op` fails
    /// the partially rebuilt tree is gone, so the trie rolls back.
    pub(super) fn apply<T>(
        &mut self,
        op: impl FnOnce(&mut Self, Node) -> Result<(Node, T)>,
    ) -> Result<T> {
        let root = std::mem::take(&mut self.root);
        match op(self, root) {
            Ok((root, out)) => {
                self.root = root;
                Ok(out)
            }
            Err(err) => {
                warn!(error = %err, root = %self.committed, "rolling back to committed root");
                self.rollback();
                Err(err)
            }
        }
    }

    /// Release the stored copy of a node that is being replaced
    ///
    /// Takes the node's cached hash. Dirty nodes were never stored, so
    /// `None` releases nothing.
    pub(super) fn supersede(&mut self, hash: Option<Hash>) -> Result<()> {
        match hash {
            Some(hash) => self.cache.delete_node(&hash),
            None => Ok(()),
        }
    }

    /// Walk the whole trie and check its structural invariants
    ///
    /// Fails with [`Error::Corruption`] on the first violation found.
    pub fn verify(&self) -> Result<TrieStats> {
        let mut stats = TrieStats::default();
        self.verify_node(&self.root, Parent::Root, 0, &mut stats)?;
        Ok(stats)
    }

    fn verify_node(
        &self,
        node: &Node,
        parent: Parent,
        depth: usize,
        stats: &mut TrieStats,
    ) -> Result<()> {
        match node {
            Node::Empty => {
                if parent != Parent::Root {
                    return Err(corrupt(depth, "empty node in an occupied position"));
                }
            }
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(hash)?;
                self.verify_node(&resolved, parent, depth, stats)?;
            }
            Node::Leaf(_) => {
                if depth == 0 || depth % 2 != 0 || depth > MAX_KEY_LENGTH {
                    return Err(corrupt(depth, "leaf at an invalid key length"));
                }
                stats.nodes += 1;
                stats.entries += 1;
                stats.max_depth = stats.max_depth.max(depth);
            }
            Node::Extension(ext) => {
                if matches!(parent, Parent::Extension | Parent::ValueSlot) {
                    return Err(corrupt(depth, "extension below an extension or in a value slot"));
                }
                if ext.key.is_empty() || depth + ext.key.len() > MAX_KEY_LENGTH {
                    return Err(corrupt(depth, "extension key length out of range"));
                }
                if ext.next.is_empty() {
                    return Err(corrupt(depth, "extension over an empty node"));
                }
                stats.nodes += 1;
                stats.extensions += 1;
                self.verify_node(&ext.next, Parent::Extension, depth + ext.key.len(), stats)?;
            }
            Node::Branch(branch) => {
                if parent == Parent::ValueSlot {
                    return Err(corrupt(depth, "branch in a value slot"));
                }
                let occupied = branch.occupied_slots().count();
                if occupied < 2 {
                    return Err(corrupt(
                        depth,
                        &format!("branch with {} occupied slots", occupied),
                    ));
                }
                stats.nodes += 1;
                stats.branches += 1;
                for slot in branch.occupied_slots() {
                    let (position, child_depth) = if slot == VALUE_SLOT {
                        (Parent::ValueSlot, depth)
                    } else {
                        (Parent::BranchChild, depth + 1)
                    };
                    self.verify_node(branch.child(slot), position, child_depth, stats)?;
                }
            }
        }
        Ok(())
    }
}

fn corrupt(depth: usize, what: &str) -> Error {
    Error::Corruption(format!("{} at depth {}", what, depth))
}
