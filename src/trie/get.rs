//! Lookups

use super::node::{Node, VALUE_SLOT};
use super::tree::Trie;
use crate::model::NibblePath;
use crate::store::KeyValueStore;
use crate::{Error, Result};

impl<'a, S: KeyValueStore + ?Sized> Trie<'a, S> {
    /// Get the value stored under `key`, failing with [`Error::NotFound`]
    /// if there is none
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.try_get(key)?
            .ok_or_else(|| Error::NotFound(hex::encode(key)))
    }

    /// Get the value stored under `key`, if any
    pub fn try_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let path = NibblePath::from_key(key)?;
        self.get_at(&self.root, path.as_slice())
    }

    /// Check whether `key` holds a value
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.try_get(key)?.is_some())
    }

    fn get_at(&self, node: &Node, path: &[u8]) -> Result<Option<Vec<u8>>> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf(leaf) => Ok(path.is_empty().then(|| leaf.value.clone())),
            Node::Extension(ext) => {
                if path.starts_with(ext.key.as_slice()) {
                    self.get_at(&ext.next, &path[ext.key.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Branch(branch) => match path.split_first() {
                None => self.get_at(branch.child(VALUE_SLOT), path),
                Some((&nibble, rest)) => self.get_at(branch.child(nibble as usize), rest),
            },
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(hash)?;
                self.get_at(&resolved, path)
            }
        }
    }
}
