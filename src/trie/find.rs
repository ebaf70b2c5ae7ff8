//! Ordered prefix scans

use super::node::{Node, VALUE_SLOT};
use super::tree::Trie;
use crate::model::{common_prefix_len, pack_nibbles, NibblePath};
use crate::store::KeyValueStore;
use crate::{Error, Result};

/// An entry returned by [`Trie::find`]
pub type Entry = (Vec<u8>, Vec<u8>);

/// How a subtree relates to the lower bound of a scan
enum Bound {
    /// Every key below is greater than the bound
    All,
    /// Every key below is at most the bound
    Skip,
    /// The subtree straddles the bound
    Descend,
}

impl<'a, S: KeyValueStore + ?Sized> Trie<'a, S> {
    /// All entries whose key starts with `prefix`, in ascending key order
    ///
    /// With `from`, only keys strictly greater than `from` are returned, and
    /// `from` itself must start with `prefix`.
    pub fn find(&self, prefix: &[u8], from: Option<&[u8]>) -> Result<Vec<Entry>> {
        let prefix_path = NibblePath::from_prefix(prefix)?;
        let from_path = match from {
            Some(from) if !from.is_empty() => {
                if !from.starts_with(prefix) {
                    return Err(Error::InvalidKey(format!(
                        "from key {} is outside prefix {}",
                        hex::encode(from),
                        hex::encode(prefix)
                    )));
                }
                Some(NibblePath::from_prefix(from)?)
            }
            _ => None,
        };

        let mut entries = Vec::new();
        let mut path = Vec::with_capacity(prefix_path.len());
        self.seek(
            &self.root,
            prefix_path.as_slice(),
            &mut path,
            from_path.as_ref().map(|p| p.as_slice()),
            &mut entries,
        )?;
        Ok(entries)
    }

    /// Walk down to the subtree holding every key that starts with `remaining`
    fn seek(
        &self,
        node: &Node,
        remaining: &[u8],
        path: &mut Vec<u8>,
        from: Option<&[u8]>,
        entries: &mut Vec<Entry>,
    ) -> Result<()> {
        if remaining.is_empty() {
            return self.collect(node, path, from, entries);
        }
        match node {
            Node::Empty | Node::Leaf(_) => Ok(()),
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(hash)?;
                self.seek(&resolved, remaining, path, from, entries)
            }
            Node::Branch(branch) => {
                let nibble = remaining[0];
                path.push(nibble);
                self.seek(branch.child(nibble as usize), &remaining[1..], path, from, entries)
            }
            Node::Extension(ext) => {
                let key = ext.key.as_slice();
                if remaining.starts_with(key) {
                    path.extend_from_slice(key);
                    self.seek(&ext.next, &remaining[key.len()..], path, from, entries)
                } else if key.starts_with(remaining) {
                    // the prefix ends inside this extension
                    path.extend_from_slice(key);
                    self.collect(&ext.next, path, from, entries)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Append every entry below `node` in key order
    fn collect(
        &self,
        node: &Node,
        path: &mut Vec<u8>,
        mut from: Option<&[u8]>,
        entries: &mut Vec<Entry>,
    ) -> Result<()> {
        if let Some(bound) = from {
            match compare(path, bound) {
                Bound::Skip => return Ok(()),
                Bound::All => from = None,
                Bound::Descend => {}
            }
        }

        match node {
            Node::Empty => {}
            Node::Hash(hash) => {
                let resolved = self.cache.resolve(hash)?;
                self.collect(&resolved, path, from, entries)?;
            }
            Node::Leaf(leaf) => {
                let key = pack_nibbles(path).ok_or_else(|| {
                    Error::Corruption(format!("leaf at odd nibble path of length {}", path.len()))
                })?;
                // a leaf still straddling the bound sits at or before it
                if from.is_none() {
                    entries.push((key, leaf.value.clone()));
                }
            }
            Node::Extension(ext) => {
                let len = path.len();
                path.extend_from_slice(ext.key.as_slice());
                self.collect(&ext.next, path, from, entries)?;
                path.truncate(len);
            }
            Node::Branch(branch) => {
                self.collect(branch.child(VALUE_SLOT), path, from, entries)?;
                for nibble in 0..16u8 {
                    path.push(nibble);
                    self.collect(branch.child(nibble as usize), path, from, entries)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

/// Place the keys under `path` relative to `from`
fn compare(path: &[u8], from: &[u8]) -> Bound {
    let shared = common_prefix_len(path, from);
    if shared == path.len() {
        Bound::Descend
    } else if shared == from.len() || path[shared] > from[shared] {
        Bound::All
    } else {
        Bound::Skip
    }
}
