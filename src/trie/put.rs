//! Insertion

use super::node::{BranchNode, Node, VALUE_SLOT};
use super::tree::Trie;
use crate::model::{common_prefix_len, NibblePath};
use crate::store::KeyValueStore;
use crate::{Error, Result, MAX_VALUE_LENGTH};
use tracing::trace;

impl<'a, S: KeyValueStore + ?Sized> Trie<'a, S> {
    /// Store `value` under `key`, replacing any previous value
    ///
    /// Arguments are checked before anything changes. If a stored node
    /// cannot be resolved the trie rolls back to its last committed root.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let path = NibblePath::from_key(key)?;
        if value.len() > MAX_VALUE_LENGTH {
            return Err(Error::ValueTooLong {
                len: value.len(),
                max: MAX_VALUE_LENGTH,
            });
        }
        trace!(key = %hex::encode(key), len = value.len(), "put");

        let leaf = Node::leaf(value);
        self.apply(|trie, root| Ok((trie.put_at(root, path.as_slice(), leaf)?, ())))
    }

    /// Insert `leaf` at `path` below `node`, returning the replacement node
    fn put_at(&mut self, node: Node, path: &[u8], leaf: Node) -> Result<Node> {
        match node {
            Node::Leaf(old) => {
                if path.is_empty() {
                    self.supersede(old.hash)?;
                    return Ok(leaf);
                }
                // the old value ends here; the new key continues below
                let mut branch = BranchNode::new();
                branch.set_child(VALUE_SLOT, Node::Leaf(old));
                let child = self.put_at(Node::Empty, &path[1..], leaf)?;
                branch.set_child(path[0] as usize, child);
                Ok(Node::Branch(branch))
            }
            Node::Extension(mut ext) => {
                if path.starts_with(ext.key.as_slice()) {
                    self.supersede(ext.hash.take())?;
                    let next = std::mem::take(&mut *ext.next);
                    *ext.next = self.put_at(next, &path[ext.key.len()..], leaf)?;
                    return Ok(Node::Extension(ext));
                }

                self.supersede(ext.hash)?;
                let shared = common_prefix_len(ext.key.as_slice(), path);
                let key_remain = &ext.key.as_slice()[shared..];
                let path_remain = &path[shared..];

                let mut branch = BranchNode::new();
                let next = *ext.next;
                let moved = if key_remain.len() == 1 {
                    next
                } else {
                    Node::extension(NibblePath::from(&key_remain[1..]), next)
                };
                branch.set_child(key_remain[0] as usize, moved);

                match path_remain.split_first() {
                    None => branch.set_child(VALUE_SLOT, leaf),
                    Some((&nibble, rest)) => {
                        let child = self.put_at(Node::Empty, rest, leaf)?;
                        branch.set_child(nibble as usize, child);
                    }
                }

                if shared == 0 {
                    Ok(Node::Branch(branch))
                } else {
                    Ok(Node::extension(
                        NibblePath::from(&path[..shared]),
                        Node::Branch(branch),
                    ))
                }
            }
            Node::Branch(mut branch) => {
                self.supersede(branch.hash)?;
                let (slot, rest) = match path.split_first() {
                    None => (VALUE_SLOT, path),
                    Some((&nibble, rest)) => (nibble as usize, rest),
                };
                let child = std::mem::take(&mut branch.children[slot]);
                let child = self.put_at(child, rest, leaf)?;
                branch.set_child(slot, child);
                Ok(Node::Branch(branch))
            }
            Node::Empty => {
                if path.is_empty() {
                    Ok(leaf)
                } else {
                    Ok(Node::extension(NibblePath::from(path), leaf))
                }
            }
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(&hash)?;
                self.put_at(resolved, path, leaf)
            }
        }
    }
}
