//! Merkle Patricia Trie over a content-addressed node store
//!
//! This implements a radix-16 trie where:
//! - Keys are walked one nibble per level
//! - Extensions factor out shared path segments
//! - Each node's hash is derived from its children's hashes
//! - The root hash commits to every key/value pair
//!
//! Inserts and deletes keep the shape canonical, so equal contents always
//! produce equal root hashes.

pub mod codec;

mod cache;
mod config;
mod delete;
mod find;
mod get;
mod node;
mod put;
mod tree;

pub use cache::{node_key, CommitStats, NodeCache, NODE_PREFIX};
pub use config::TrieConfig;
pub use find::Entry;
pub use node::{BranchNode, ExtensionNode, LeafNode, Node, BRANCH_CHILD_COUNT, VALUE_SLOT};
pub use tree::{Trie, TrieStats};
