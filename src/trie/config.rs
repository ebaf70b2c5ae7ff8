//! Trie configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings fixed when a trie is constructed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrieConfig {
    /// Keep superseded nodes in the backing store so that every historical
    /// root stays readable. Off by default: superseded nodes are reclaimed.
    pub retain_history: bool,
}

impl TrieConfig {
    /// Configuration for an archival trie
    pub fn archival() -> Self {
        TrieConfig {
            retain_history: true,
        }
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_reclaims() {
        assert!(!TrieConfig::default().retain_history);
        assert!(TrieConfig::archival().retain_history);
    }

    #[test]
    fn test_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trie.json");

        std::fs::write(&path, r#"{"retain_history": true}"#).unwrap();
        assert_eq!(TrieConfig::load(&path).unwrap(), TrieConfig::archival());

        std::fs::write(&path, "{}").unwrap();
        assert_eq!(TrieConfig::load(&path).unwrap(), TrieConfig::default());
    }
}
