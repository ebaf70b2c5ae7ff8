//! Single-file key-value store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("MPTRIEDB")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - index_offset: 8 bytes (u64 LE)
//!   - index_len: 8 bytes (u64 LE)
//!   - root: 32 bytes (last committed root hash)
//!
//! [RECORDS: variable]
//!   - zstd-compressed values, appended in write order
//!
//! [INDEX: variable]
//!   - bincode list of (key, offset, size), sorted by key
//! ```
//!
//! Overwritten and deleted records stay in the file; only the index forgets
//! them. Every `sync` appends a fresh index and points the header at it.

use super::KeyValueStore;
use crate::model::Hash;
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_SIZE: u64 = 64;
const ROOT_OFFSET: usize = 32;
const COMPRESSION_LEVEL: i32 = 3;

/// Index entry for a record
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A key-value store backed by a single append-only file
pub struct FileStore {
    /// Path to the store file
    path: PathBuf,
    /// The file handle
    file: RwLock<File>,
    /// In-memory index
    index: RwLock<HashMap<Vec<u8>, IndexEntry>>,
    /// Root hash recorded by the last commit
    root: RwLock<Hash>,
    /// Current append position
    write_offset: RwLock<u64>,
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        // flags, index offset/len and root start zeroed
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(HashMap::new()),
            root: RwLock::new(Hash::ZERO),
            write_offset: RwLock::new(HEADER_SIZE),
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("file shorter than header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = read_u32(&header, 8);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let index_offset = read_u64(&header, 16);
        let index_len = read_u64(&header, 24);
        let root = Hash::from_slice(&header[ROOT_OFFSET..ROOT_OFFSET + Hash::LEN])
            .ok_or_else(|| Error::InvalidFile("truncated root hash".into()))?;

        let file_len = file.metadata()?.len();
        let mut index = HashMap::new();
        if index_offset > 0 && index_len > 0 {
            let in_file = index_offset >= HEADER_SIZE
                && index_offset
                    .checked_add(index_len)
                    .map_or(false, |end| end <= file_len);
            if !in_file {
                return Err(Error::InvalidFile("index lies outside the file".into()));
            }
            file.seek(SeekFrom::Start(index_offset))?;
            let mut raw = vec![0u8; index_len as usize];
            file.read_exact(&mut raw)?;
            let entries: Vec<(Vec<u8>, IndexEntry)> = bincode::deserialize(&raw)?;
            // records always precede the index that lists them
            if entries.iter().any(|(_, e)| {
                e.offset < HEADER_SIZE
                    || e.offset
                        .checked_add(e.size as u64)
                        .map_or(true, |end| end > index_offset)
            }) {
                return Err(Error::InvalidFile("index entry lies outside the file".into()));
            }
            index.extend(entries);
        }

        let write_offset = file.seek(SeekFrom::End(0))?;

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            root: RwLock::new(root),
            write_offset: RwLock::new(write_offset),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Root hash recorded by the last commit
    pub fn root(&self) -> Hash {
        *self.root.read()
    }

    /// Record a new root hash; persisted on the next `sync`
    pub fn set_root(&self, root: Hash) {
        *self.root.write() = root;
    }

    /// Get the number of live records in the store
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Check if the store holds no live records
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Flush changes and write index to disk
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let root = self.root.read();
        let mut write_offset = self.write_offset.write();
        let mut file = self.file.write();

        // Sort by key for determinism
        let mut entries: Vec<_> = index.iter().map(|(k, e)| (k.clone(), *e)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let raw = bincode::serialize(&entries)?;

        let index_offset = *write_offset;
        file.seek(SeekFrom::Start(index_offset))?;
        file.write_all(&raw)?;
        *write_offset = index_offset + raw.len() as u64;

        file.seek(SeekFrom::Start(16))?;
        file.write_all(&index_offset.to_le_bytes())?;
        file.write_all(&(raw.len() as u64).to_le_bytes())?;
        file.write_all(root.as_bytes())?;

        file.sync_all()?;
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = {
            let index = self.index.read();
            index.get(key).copied()
        };

        let Some(entry) = entry else {
            return Ok(None);
        };

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(entry.offset))?;

        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;

        Ok(Some(zstd::decode_all(data.as_slice())?))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let compressed = zstd::encode_all(value, COMPRESSION_LEVEL)?;
        let size = compressed.len() as u32;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&compressed)?;

            *write_offset = offset + size as u64;
            offset
        };

        self.index
            .write()
            .insert(key.to_vec(), IndexEntry { offset, size });
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.index.write().remove(key);
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.index.read().contains_key(key))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.mpt");

        {
            let store = FileStore::create(&path).unwrap();
            assert_eq!(store.len(), 0);
            assert!(store.root().is_zero());
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.len(), 0);
        }
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("state.mpt")).unwrap();

        store.put(b"k1", b"first").unwrap();
        store.put(b"k1", b"second").unwrap();
        store.put(b"k2", &[0u8; 1024]).unwrap();

        assert_eq!(store.get(b"k1").unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.get(b"k2").unwrap(), Some(vec![0u8; 1024]));
        assert_eq!(store.len(), 2);

        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
        assert!(!store.contains(b"k1").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.mpt");
        let root = Hash::digest(b"root");

        {
            let store = FileStore::create(&path).unwrap();
            store.put(b"keep", b"value").unwrap();
            store.put(b"drop", b"value").unwrap();
            store.delete(b"drop").unwrap();
            store.set_root(root);
            store.sync().unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.root(), root);
            assert_eq!(store.get(b"keep").unwrap(), Some(b"value".to_vec()));
            assert_eq!(store.get(b"drop").unwrap(), None);

            // writes after reopening land behind the old index
            store.put(b"more", b"data").unwrap();
            store.sync().unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.len(), 2);
            assert_eq!(store.get(b"more").unwrap(), Some(b"data".to_vec()));
            assert_eq!(store.get(b"keep").unwrap(), Some(b"value".to_vec()));
        }
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign");
        std::fs::write(&path, vec![0xffu8; 128]).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }

    #[test]
    fn test_rejects_index_past_end_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("damaged.mpt");
        {
            let store = FileStore::create(&path).unwrap();
            store.put(b"key", b"value").unwrap();
            store.sync().unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[24..32].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));

        bytes[24..32].copy_from_slice(&(1u64 << 40).to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }

    #[test]
    fn test_rejects_other_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.mpt");
        let mut header = vec![0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&(VERSION + 1).to_le_bytes());
        std::fs::write(&path, header).unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(Error::VersionMismatch { .. })
        ));
    }
}
