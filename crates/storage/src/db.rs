//! Key-value store backends.
//!
//! All persistence flows through the [`KvStore`] trait: a byte-addressable
//! map with batched writes. Production nodes use the RocksDB-backed
//! [`Database`]; tests and in-memory chains use [`MemoryDb`]. Trie commits
//! collect their node writes into a [`WriteBatch`] through the
//! [`TrieWriter`] facet and flush it atomically.

use parking_lot::RwLock;
use rocksdb::{Options, DB};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::{Result, StorageError};

/// A byte-addressable persistent map with batched writes.
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Applies a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;
}

/// The write surface handed to trie commits.
///
/// Tries only ever append node data, so the facet is put-only.
pub trait TrieWriter {
    /// Records a key-value write.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// A single batch operation.
#[derive(Debug, Clone)]
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// An ordered collection of writes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a key-value write.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    /// Queues a key deletion.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Checks if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

impl TrieWriter for WriteBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        WriteBatch::put(self, key, value);
        Ok(())
    }
}

/// An in-memory [`KvStore`] backed by a hash map.
///
/// Used by tests and by chains that never touch disk. Cloning shares the
/// underlying map.
#[derive(Debug, Default)]
pub struct MemoryDb {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Checks if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KvStore for MemoryDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    inner.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    inner.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Database configuration for the RocksDB backend
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory
    pub path: String,
    /// Enable compression (LZ4)
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::from("./data/provenet"),
            enable_compression: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// RocksDB-backed [`KvStore`].
pub struct Database {
    db: DB,
}

impl Database {
    /// Opens (or creates) a database at the configured path.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        info!(path = %config.path, "Opening database");
        let db = DB::open(&opts, Path::new(&config.path))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(Self { db })
    }

    /// Reads a metadata entry.
    pub fn get_metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(&metadata_key(key))
    }

    /// Writes a metadata entry.
    pub fn put_metadata(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(&metadata_key(key), value)
    }
}

fn metadata_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + key.len());
    out.extend_from_slice(b"meta:");
    out.extend_from_slice(key);
    out
}

impl KvStore for Database {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = rocksdb::WriteBatch::default();
        let ops = batch.into_ops();
        let count = ops.len();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => inner.put(key, value),
                BatchOp::Delete(key) => inner.delete(key),
            }
        }
        self.db
            .write(inner)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        debug!(ops = count, "Applied write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_db_roundtrip() {
        let db = MemoryDb::new();
        assert!(db.get(b"missing").unwrap().is_none());

        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").unwrap().unwrap(), b"value");
    }

    #[test]
    fn test_memory_db_batch() {
        let db = MemoryDb::new();
        db.put(b"stale", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"stale".to_vec());
        assert_eq!(batch.len(), 3);

        db.write_batch(batch).unwrap();
        assert_eq!(db.get(b"a").unwrap().unwrap(), b"1");
        assert_eq!(db.get(b"b").unwrap().unwrap(), b"2");
        assert!(db.get(b"stale").unwrap().is_none());
    }

    #[test]
    fn test_trie_writer_facet() {
        let mut batch = WriteBatch::new();
        let writer: &mut dyn TrieWriter = &mut batch;
        writer.put(b"node", b"data").unwrap();
        assert_eq!(batch.len(), 1);
    }
}
