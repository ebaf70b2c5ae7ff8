//! Node wire encoding
//!
//! ```text
//! Leaf       0x02 | value length (u32 LE) | value
//! Extension  0x01 | nibble count (u8) | nibbles, one per byte | child
//! Branch     0x00 | 17 children (16 nibble slots, then the value slot)
//! child      0x04 (empty) | 0x03 followed by the 32-byte child hash
//! ```
//!
//! The encoding is canonical: a node's hash is the digest of these bytes.
//! A stored record appends the reference count (u32 LE) to the encoding.

use super::node::{BranchNode, ExtensionNode, LeafNode, Node, BRANCH_CHILD_COUNT};
use crate::model::{Hash, NibblePath};
use crate::{Error, Result, MAX_KEY_LENGTH, MAX_VALUE_LENGTH};
use bytes::{Buf, BufMut, BytesMut};

pub const TAG_BRANCH: u8 = 0x00;
pub const TAG_EXTENSION: u8 = 0x01;
pub const TAG_LEAF: u8 = 0x02;
pub const TAG_HASH: u8 = 0x03;
pub const TAG_EMPTY: u8 = 0x04;

const REFERENCE_LEN: usize = 4;

/// Encode a node. Dirty children are hashed on the way.
///
/// `Empty` and `Hash` only ever appear as children, so they encode to their
/// child-reference form.
pub fn encode(node: &Node) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(encoded_len_hint(node));
    match node {
        Node::Leaf(leaf) => {
            buf.put_u8(TAG_LEAF);
            buf.put_u32_le(leaf.value.len() as u32);
            buf.put_slice(&leaf.value);
        }
        Node::Extension(ext) => {
            buf.put_u8(TAG_EXTENSION);
            buf.put_u8(ext.key.len() as u8);
            buf.put_slice(ext.key.as_slice());
            put_child(&mut buf, &ext.next);
        }
        Node::Branch(branch) => {
            buf.put_u8(TAG_BRANCH);
            for child in branch.children.iter() {
                put_child(&mut buf, child);
            }
        }
        Node::Empty | Node::Hash(_) => put_child(&mut buf, node),
    }
    buf.to_vec()
}

/// Append the reference count to an encoding
pub fn encode_record(encoded: &[u8], references: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(encoded.len() + REFERENCE_LEN);
    buf.put_slice(encoded);
    buf.put_u32_le(references);
    buf.to_vec()
}

/// Split a stored record into its encoding and reference count
pub fn split_record(record: &[u8]) -> Result<(Vec<u8>, u32)> {
    if record.len() <= REFERENCE_LEN {
        return Err(Error::Corruption(format!(
            "node record too short: {} bytes",
            record.len()
        )));
    }
    let (encoded, mut references) = record.split_at(record.len() - REFERENCE_LEN);
    Ok((encoded.to_vec(), references.get_u32_le()))
}

/// Decode a stored record fetched under `hash`
pub fn decode_record(hash: &Hash, record: &[u8]) -> Result<(Node, u32)> {
    let (encoded, references) = split_record(record)?;
    Ok((decode(hash, &encoded)?, references))
}

/// Decode a node, checking that its bytes digest to `hash`
///
/// The decoded node comes back clean, with `hash` cached. Its children are
/// unresolved `Hash` references.
pub fn decode(hash: &Hash, encoded: &[u8]) -> Result<Node> {
    if Hash::digest(encoded) != *hash {
        return Err(Error::Corruption(format!(
            "node {} does not match its content",
            hash.short()
        )));
    }

    let mut buf = encoded;
    let mut node = match take_u8(&mut buf)? {
        TAG_LEAF => {
            let len = take_u32(&mut buf)? as usize;
            if len > MAX_VALUE_LENGTH {
                return Err(Error::Corruption(format!("leaf value of {} bytes", len)));
            }
            let value = take_bytes(&mut buf, len)?;
            Node::Leaf(LeafNode::new(value))
        }
        TAG_EXTENSION => {
            let len = take_u8(&mut buf)? as usize;
            if len == 0 || len > MAX_KEY_LENGTH {
                return Err(Error::Corruption(format!(
                    "extension key of {} nibbles",
                    len
                )));
            }
            let key = NibblePath::from_nibbles(take_bytes(&mut buf, len)?)
                .ok_or_else(|| Error::Corruption("extension key holds a non-nibble".into()))?;
            let next = take_child(&mut buf)?;
            if next.is_empty() {
                return Err(Error::Corruption("extension over an empty node".into()));
            }
            Node::Extension(ExtensionNode::new(key, next))
        }
        TAG_BRANCH => {
            let mut branch = BranchNode::new();
            for slot in 0..BRANCH_CHILD_COUNT {
                branch.children[slot] = take_child(&mut buf)?;
            }
            Node::Branch(branch)
        }
        tag => return Err(Error::Corruption(format!("invalid node tag: {:#04x}", tag))),
    };

    if buf.has_remaining() {
        return Err(Error::Corruption(format!(
            "{} trailing bytes after node",
            buf.remaining()
        )));
    }

    node.set_hash(*hash);
    Ok(node)
}

fn put_child(buf: &mut BytesMut, child: &Node) {
    match child {
        Node::Empty => buf.put_u8(TAG_EMPTY),
        other => {
            buf.put_u8(TAG_HASH);
            buf.put_slice(other.hash().as_bytes());
        }
    }
}

fn take_child(buf: &mut &[u8]) -> Result<Node> {
    match take_u8(buf)? {
        TAG_EMPTY => Ok(Node::Empty),
        TAG_HASH => {
            let bytes = take_bytes(buf, Hash::LEN)?;
            let hash = Hash::from_slice(&bytes)
                .ok_or_else(|| Error::Corruption("short child hash".into()))?;
            Ok(Node::Hash(hash))
        }
        tag => Err(Error::Corruption(format!("invalid child tag: {:#04x}", tag))),
    }
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    Ok(buf.get_u32_le())
}

fn take_bytes(buf: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    if buf.remaining() < len {
        return Err(truncated());
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

fn truncated() -> Error {
    Error::Corruption("truncated node encoding".into())
}

fn encoded_len_hint(node: &Node) -> usize {
    match node {
        Node::Leaf(leaf) => 5 + leaf.value.len(),
        Node::Extension(ext) => 2 + ext.key.len() + 1 + Hash::LEN,
        Node::Branch(_) => 1 + BRANCH_CHILD_COUNT * (1 + Hash::LEN),
        Node::Empty | Node::Hash(_) => 1 + Hash::LEN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::node::VALUE_SLOT;

    fn sample_branch() -> Node {
        let mut branch = BranchNode::new();
        branch.children[0] = Node::extension(
            NibblePath::from(&[0x1][..]),
            Node::leaf(b"abcd".to_vec()),
        );
        branch.children[VALUE_SLOT] = Node::leaf(b"2222".to_vec());
        Node::Branch(branch)
    }

    #[test]
    fn test_leaf_layout() {
        let encoded = encode(&Node::leaf(vec![0xab, 0xcd]));
        assert_eq!(encoded, vec![TAG_LEAF, 2, 0, 0, 0, 0xab, 0xcd]);
    }

    #[test]
    fn test_extension_layout() {
        let leaf = Node::leaf(vec![1]);
        let leaf_hash = leaf.hash();
        let encoded = encode(&Node::extension(NibblePath::from(&[0xa, 0xc][..]), leaf));
        assert_eq!(&encoded[..5], &[TAG_EXTENSION, 2, 0xa, 0xc, TAG_HASH]);
        assert_eq!(&encoded[5..], leaf_hash.as_bytes());
    }

    #[test]
    fn test_branch_layout() {
        let encoded = encode(&sample_branch());
        // slot 0 and the value slot are references, the other 15 are empty
        assert_eq!(encoded.len(), 1 + 2 * (1 + Hash::LEN) + 15);
        assert_eq!(encoded[0], TAG_BRANCH);
        assert_eq!(encoded[1], TAG_HASH);
        assert_eq!(encoded[34], TAG_EMPTY);
    }

    #[test]
    fn test_decode_keeps_children_as_references() {
        let branch = sample_branch();
        let hash = branch.hash();
        let decoded = decode(&hash, &encode(&branch)).unwrap();

        assert!(!decoded.is_dirty());
        assert_eq!(decoded.hash(), hash);
        match decoded {
            Node::Branch(b) => {
                assert!(matches!(b.child(0), Node::Hash(_)));
                assert!(matches!(b.child(VALUE_SLOT), Node::Hash(_)));
                assert!(b.child(5).is_empty());
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_record_carries_references() {
        let leaf = Node::leaf(b"v".to_vec());
        let record = encode_record(&encode(&leaf), 3);
        let (node, references) = decode_record(&leaf.hash(), &record).unwrap();
        assert_eq!(references, 3);
        assert_eq!(node.hash(), leaf.hash());
    }

    #[test]
    fn test_decode_rejects_hash_mismatch() {
        let encoded = encode(&Node::leaf(b"v".to_vec()));
        let err = decode(&Hash::digest(b"other"), &encoded).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x09],
            vec![TAG_LEAF, 5, 0, 0, 0, 1],
            vec![TAG_EXTENSION, 0, TAG_EMPTY],
            vec![TAG_EXTENSION, 1, 0x10, TAG_EMPTY],
            vec![TAG_EXTENSION, 1, 0x01, TAG_EMPTY],
            vec![TAG_LEAF, 0, 0, 0, 0, 0xff],
            vec![TAG_BRANCH, TAG_EMPTY],
        ];
        for encoded in cases {
            let hash = Hash::digest(&encoded);
            assert!(
                matches!(decode(&hash, &encoded), Err(Error::Corruption(_))),
                "accepted {:?}",
                encoded
            );
        }
    }

    #[test]
    fn test_short_record() {
        assert!(split_record(&[0, 0, 0, 1]).is_err());
    }
}
