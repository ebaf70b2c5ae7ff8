//! Trie node types
//!
//! A node is one of five variants. Leaf, Extension and Branch are concrete
//! and carry a cached hash: `Some` while the node matches what is (or will be)
//! in the backing store, `None` once it has been mutated. A node without a
//! cached hash is dirty and gets written on the next commit.
//!
//! `Hash` is a placeholder for a node that only exists in the backing store.
//! It has to be resolved through the cache before it can be inspected.

use super::codec;
use crate::model::{Hash, NibblePath};

/// Number of slots in a branch: one per nibble plus the value slot
pub const BRANCH_CHILD_COUNT: usize = 17;

/// Index of the branch slot holding the value of a key that ends at the branch
pub const VALUE_SLOT: usize = 16;

/// A node in the Merkle Patricia Trie
#[derive(Clone, Debug, Default)]
pub enum Node {
    /// No subtree
    #[default]
    Empty,
    /// Terminal value
    Leaf(LeafNode),
    /// Shared path segment in front of a single child
    Extension(ExtensionNode),
    /// 16-way fan-out plus a value slot
    Branch(BranchNode),
    /// Unresolved reference to a stored node
    Hash(Hash),
}

/// A terminal value at the end of a key path
#[derive(Clone, Debug)]
pub struct LeafNode {
    pub(crate) value: Vec<u8>,
    pub(crate) hash: Option<Hash>,
}

/// A run of nibbles shared by every key below `next`
#[derive(Clone, Debug)]
pub struct ExtensionNode {
    pub(crate) key: NibblePath,
    pub(crate) next: Box<Node>,
    pub(crate) hash: Option<Hash>,
}

/// Children indexed by the next nibble, plus the value slot at [`VALUE_SLOT`]
#[derive(Clone, Debug)]
pub struct BranchNode {
    pub(crate) children: Box<[Node; BRANCH_CHILD_COUNT]>,
    pub(crate) hash: Option<Hash>,
}

impl LeafNode {
    /// Create a dirty leaf
    pub fn new(value: Vec<u8>) -> Self {
        LeafNode { value, hash: None }
    }

    /// The stored value
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl ExtensionNode {
    /// Create a dirty extension over `next`
    pub fn new(key: NibblePath, next: Node) -> Self {
        debug_assert!(!key.is_empty());
        ExtensionNode {
            key,
            next: Box::new(next),
            hash: None,
        }
    }

    /// The shared nibbles
    pub fn key(&self) -> &NibblePath {
        &self.key
    }

    /// The node below the shared nibbles
    pub fn next(&self) -> &Node {
        &self.next
    }
}

impl BranchNode {
    /// Create a dirty branch with every slot empty
    pub fn new() -> Self {
        BranchNode {
            children: Box::new(std::array::from_fn(|_| Node::Empty)),
            hash: None,
        }
    }

    /// The node in `slot` (`0..16` for nibbles, [`VALUE_SLOT`] for the value)
    pub fn child(&self, slot: usize) -> &Node {
        &self.children[slot]
    }

    /// Replace the node in `slot`
    pub fn set_child(&mut self, slot: usize, node: Node) {
        self.children[slot] = node;
        self.hash = None;
    }

    /// Indices of the non-empty slots, value slot last
    pub fn occupied_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_empty())
            .map(|(slot, _)| slot)
    }
}

impl Default for BranchNode {
    fn default() -> Self {
        BranchNode::new()
    }
}

impl Node {
    /// Node for a trie rooted at `root_hash`; the zero hash is the empty trie
    pub fn from_root(root_hash: Hash) -> Self {
        if root_hash.is_zero() {
            Node::Empty
        } else {
            Node::Hash(root_hash)
        }
    }

    /// Create a dirty leaf
    pub fn leaf(value: impl Into<Vec<u8>>) -> Self {
        Node::Leaf(LeafNode::new(value.into()))
    }

    /// Create a dirty extension
    pub fn extension(key: NibblePath, next: Node) -> Self {
        Node::Extension(ExtensionNode::new(key, next))
    }

    /// Check if this node is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Whether the node was mutated since it was last written or resolved
    pub fn is_dirty(&self) -> bool {
        match self {
            Node::Empty | Node::Hash(_) => false,
            _ => self.cached_hash().is_none(),
        }
    }

    /// The hash, computing it (and any dirty descendants') if not cached
    ///
    /// The empty node hashes to [`Hash::ZERO`].
    pub fn hash(&self) -> Hash {
        match self {
            Node::Empty => Hash::ZERO,
            Node::Hash(hash) => *hash,
            _ => self
                .cached_hash()
                .unwrap_or_else(|| Hash::digest(&codec::encode(self))),
        }
    }

    pub(crate) fn cached_hash(&self) -> Option<Hash> {
        match self {
            Node::Leaf(leaf) => leaf.hash,
            Node::Extension(ext) => ext.hash,
            Node::Branch(branch) => branch.hash,
            Node::Hash(hash) => Some(*hash),
            Node::Empty => None,
        }
    }

    pub(crate) fn set_hash(&mut self, hash: Hash) {
        match self {
            Node::Leaf(leaf) => leaf.hash = Some(hash),
            Node::Extension(ext) => ext.hash = Some(hash),
            Node::Branch(branch) => branch.hash = Some(hash),
            Node::Hash(_) | Node::Empty => {}
        }
    }
}
