//! Backing stores for serialized trie nodes
//!
//! The trie never talks to a store directly. Its node cache reads, writes
//! and removes `(key, bytes)` pairs through [`KeyValueStore`], and nothing
//! here knows what a node looks like.

mod file_store;
mod memory;

pub use file_store::FileStore;
pub use memory::MemoryStore;

use crate::Result;

/// A byte-keyed store with atomic single-key operations
///
/// Methods take `&self`; implementations use interior mutability so that
/// several tries can share one store.
pub trait KeyValueStore {
    /// Fetch the value under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite the value under `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Check if `key` is present
    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
