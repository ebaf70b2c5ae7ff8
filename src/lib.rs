//! # mptrie
//!
//! A Merkle Patricia Trie for authenticated key-value state.
//!
//! mptrie keeps a key→value mapping in a radix-16 trie whose root hash
//! commits to every entry. Nodes are content-addressed and live in a pluggable
//! backing store, so a trie can be reopened from any committed root.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Leaf, Extension and Branch nodes, plus unresolved hash references
//! - **Node cache**: Stages new nodes and reference-counts stored ones
//! - **Commits**: Flush changed nodes bottom-up and produce a new root hash
//! - **Archival mode**: Keep superseded nodes so old roots stay readable
//!
//! ## Example
//!
//! ```
//! use mptrie::{MemoryStore, Trie};
//!
//! let store = MemoryStore::new();
//! let mut trie = Trie::new(&store);
//! trie.put(b"key", b"value")?;
//! let root = trie.commit()?;
//!
//! let reopened = Trie::from_root(&store, root);
//! assert_eq!(reopened.get(b"key")?, b"value".to_vec());
//! # Ok::<(), mptrie::Error>(())
//! ```

pub mod model;
pub mod store;
pub mod trie;

mod error;

pub use error::{Error, Result};
pub use model::{Hash, NibblePath};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use trie::{Trie, TrieConfig, TrieStats};

/// Longest key path, in nibbles
pub const MAX_KEY_LENGTH: usize = 136;

/// Largest value a leaf can hold, in bytes
pub const MAX_VALUE_LENGTH: usize = 65_539;

/// Store file version for format compatibility
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"MPTRIEDB";
