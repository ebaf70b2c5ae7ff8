//! Removal and the collapsing that keeps the trie canonical

use super::node::{BranchNode, ExtensionNode, Node, VALUE_SLOT};
use super::tree::Trie;
use crate::model::NibblePath;
use crate::store::KeyValueStore;
use crate::{Error, Result};
use tracing::trace;

impl<'a, S: KeyValueStore + ?Sized> Trie<'a, S> {
    /// Remove the value stored under `key`
    ///
    /// Returns false if the key held no value.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let path = NibblePath::from_key(key)?;
        let deleted = self.apply(|trie, root| trie.delete_at(root, path.as_slice()))?;
        trace!(key = %hex::encode(key), deleted, "delete");
        Ok(deleted)
    }

    fn delete_at(&mut self, node: Node, path: &[u8]) -> Result<(Node, bool)> {
        match node {
            Node::Empty => Ok((Node::Empty, false)),
            Node::Leaf(leaf) => {
                if path.is_empty() {
                    self.supersede(leaf.hash)?;
                    Ok((Node::Empty, true))
                } else {
                    Ok((Node::Leaf(leaf), false))
                }
            }
            Node::Extension(mut ext) => {
                if !path.starts_with(ext.key.as_slice()) {
                    return Ok((Node::Extension(ext), false));
                }
                let next = std::mem::take(&mut *ext.next);
                let (next, deleted) = self.delete_at(next, &path[ext.key.len()..])?;
                if !deleted {
                    *ext.next = next;
                    return Ok((Node::Extension(ext), false));
                }

                self.supersede(ext.hash)?;
                let node = match next {
                    Node::Empty => Node::Empty,
                    Node::Extension(child) => {
                        self.supersede(child.hash)?;
                        let mut key = ext.key;
                        key.extend(&child.key);
                        Node::Extension(ExtensionNode::new(key, *child.next))
                    }
                    next => Node::extension(ext.key, next),
                };
                Ok((node, true))
            }
            Node::Branch(mut branch) => {
                let (slot, rest) = match path.split_first() {
                    None => (VALUE_SLOT, path),
                    Some((&nibble, rest)) => (nibble as usize, rest),
                };
                let child = std::mem::take(&mut branch.children[slot]);
                let (child, deleted) = self.delete_at(child, rest)?;
                if !deleted {
                    branch.children[slot] = child;
                    return Ok((Node::Branch(branch), false));
                }

                self.supersede(branch.hash)?;
                branch.set_child(slot, child);
                let occupied: Vec<usize> = branch.occupied_slots().collect();
                match occupied.as_slice() {
                    [] => Err(Error::Corruption(
                        "branch node left without children".into(),
                    )),
                    [survivor] => Ok((self.collapse(branch, *survivor)?, true)),
                    _ => Ok((Node::Branch(branch), true)),
                }
            }
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(&hash)?;
                self.delete_at(resolved, path)
            }
        }
    }

    /// Replace a branch that has a single occupied slot by that slot's node
    fn collapse(&mut self, mut branch: BranchNode, slot: usize) -> Result<Node> {
        let survivor = std::mem::take(&mut branch.children[slot]);
        if slot == VALUE_SLOT {
            return Ok(survivor);
        }

        let survivor = match survivor {
            Node::Hash(hash) => self.cache.resolve(&hash)?,
            other => other,
        };
        let nibble = slot as u8;
        match survivor {
            Node::Extension(mut ext) => {
                self.supersede(ext.hash.take())?;
                ext.key.prepend(nibble);
                Ok(Node::Extension(ext))
            }
            other => Ok(Node::extension(NibblePath::from(&[nibble][..]), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStore;
    use crate::trie::{Node, Trie};

    #[test]
    fn test_delete_absent() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        assert!(!trie.delete(&[0x01]).unwrap());

        trie.put(&[0x01, 0x02], b"v").unwrap();
        let root = trie.root_hash();
        assert!(!trie.delete(&[0x01]).unwrap());
        assert!(!trie.delete(&[0x01, 0x02, 0x03]).unwrap());
        assert!(!trie.delete(&[0x02]).unwrap());
        assert_eq!(trie.root_hash(), root);
    }

    #[test]
    fn test_delete_validates_key() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        assert!(trie.delete(&[]).unwrap_err().is_validation());
    }

    #[test]
    fn test_delete_last_key_empties_trie() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(&[0x12, 0x34], b"a").unwrap();
        assert!(trie.delete(&[0x12, 0x34]).unwrap());
        assert!(trie.is_empty());
        assert!(trie.root_hash().is_zero());
    }

    #[test]
    fn test_two_child_branch_collapses() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(&[0x12, 0x34], b"a").unwrap();
        trie.put(&[0x12, 0x56], b"b").unwrap();
        assert!(trie.delete(&[0x12, 0x34]).unwrap());

        // a single extension straight to the surviving leaf
        let Node::Extension(ext) = trie.root() else {
            panic!("expected extension root, got {:?}", trie.root());
        };
        assert_eq!(ext.key().as_slice(), &[0x1, 0x2, 0x5, 0x6]);
        assert!(matches!(ext.next(), Node::Leaf(_)));
        assert_eq!(trie.get(&[0x12, 0x56]).unwrap(), b"b".to_vec());

        let mut fresh = Trie::new(&store);
        fresh.put(&[0x12, 0x56], b"b").unwrap();
        assert_eq!(trie.root_hash(), fresh.root_hash());
    }

    #[test]
    fn test_value_slot_survivor_replaces_branch() {
        let store = MemoryStore::new();
        let mut trie = Trie::new(&store);
        trie.put(&[0xab], b"short").unwrap();
        trie.put(&[0xab, 0xcd], b"long").unwrap();
        trie.commit().unwrap();

        let mut reopened = Trie::from_root(&store, trie.root_hash());
        assert!(reopened.delete(&[0xab, 0xcd]).unwrap());
        let Node::Extension(ext) = reopened.root() else {
            panic!("expected extension root");
        };
        assert_eq!(ext.key().as_slice(), &[0xa, 0xb]);
        reopened.verify().unwrap();

        let mut fresh = Trie::new(&store);
        fresh.put(&[0xab], b"short").unwrap();
        assert_eq!(reopened.root_hash(), fresh.root_hash());
    }
}
