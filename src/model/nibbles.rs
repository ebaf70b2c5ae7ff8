//! Nibble paths: byte keys split into 4-bit symbols
//!
//! Every trie level branches 16 ways on one nibble, high nibble of each byte
//! first. Comparing two paths nibble by nibble gives the same order as
//! comparing the original keys byte by byte.

use crate::{Error, Result, MAX_KEY_LENGTH};
use std::fmt;

/// A sequence of nibbles, each stored in its own byte (`0..=15`)
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NibblePath(Vec<u8>);

impl NibblePath {
    /// Create an empty path
    pub fn new() -> Self {
        NibblePath(Vec::new())
    }

    /// Split bytes into nibbles without any length check
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }
        NibblePath(nibbles)
    }

    /// Convert a trie key, rejecting empty and over-long keys
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".into()));
        }
        Self::from_prefix(key)
    }

    /// Convert a key prefix, which may be empty but not over-long
    pub fn from_prefix(prefix: &[u8]) -> Result<Self> {
        let len = prefix.len() * 2;
        if len > MAX_KEY_LENGTH {
            return Err(Error::KeyTooLong {
                len,
                max: MAX_KEY_LENGTH,
            });
        }
        Ok(Self::from_bytes(prefix))
    }

    /// Wrap raw nibbles, returning `None` if any value is above 15
    pub fn from_nibbles(nibbles: Vec<u8>) -> Option<Self> {
        if nibbles.iter().all(|n| *n < 16) {
            Some(NibblePath(nibbles))
        } else {
            None
        }
    }

    /// Join nibble pairs back into bytes; `None` for an odd-length path
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        pack_nibbles(&self.0)
    }

    /// Number of nibbles
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the path has no nibbles
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the nibbles
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Whether this path begins with `prefix`
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Append one nibble
    pub fn push(&mut self, nibble: u8) {
        debug_assert!(nibble < 16);
        self.0.push(nibble);
    }

    /// Insert one nibble in front of the path
    pub fn prepend(&mut self, nibble: u8) {
        debug_assert!(nibble < 16);
        self.0.insert(0, nibble);
    }

    /// Append another path
    pub fn extend(&mut self, other: &NibblePath) {
        self.0.extend_from_slice(&other.0);
    }
}

impl From<&[u8]> for NibblePath {
    /// Takes already-split nibbles. Callers guarantee every value is below 16.
    fn from(nibbles: &[u8]) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        NibblePath(nibbles.to_vec())
    }
}

impl AsRef<[u8]> for NibblePath {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nibble in &self.0 {
            write!(f, "{:x}", nibble)?;
        }
        Ok(())
    }
}

impl fmt::Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NibblePath({})", self)
    }
}

/// Join nibble pairs into bytes
pub fn pack_nibbles(nibbles: &[u8]) -> Option<Vec<u8>> {
    if nibbles.len() % 2 != 0 {
        return None;
    }
    Some(
        nibbles
            .chunks_exact(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect(),
    )
}

/// Length of the longest common prefix of two nibble slices
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
