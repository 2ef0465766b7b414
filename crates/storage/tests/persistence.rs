//! Integration tests for the RocksDB-backed store and trie persistence.

use provenet_storage::{Database, DatabaseConfig, KvStore, PrefixTrie, WriteBatch};
use std::sync::Arc;
use tempfile::TempDir;

fn open_db(dir: &TempDir) -> Database {
    let config = DatabaseConfig {
        path: dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    Database::open(config).unwrap()
}

#[test]
fn test_database_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.put(b"key", b"value").unwrap();
    assert_eq!(db.get(b"key").unwrap().unwrap(), b"value");
    assert!(db.get(b"missing").unwrap().is_none());
}

#[test]
fn test_database_batch_atomicity() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    let mut batch = WriteBatch::new();
    batch.put(b"a".to_vec(), b"1".to_vec());
    batch.put(b"b".to_vec(), b"2".to_vec());
    db.write_batch(batch).unwrap();

    assert_eq!(db.get(b"a").unwrap().unwrap(), b"1");
    assert_eq!(db.get(b"b").unwrap().unwrap(), b"2");
}

#[test]
fn test_metadata_namespace() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.put_metadata(b"head", b"42").unwrap();
    assert_eq!(db.get_metadata(b"head").unwrap().unwrap(), b"42");
    // Metadata keys do not shadow plain keys
    assert!(db.get(b"head").unwrap().is_none());
}

#[test]
fn test_trie_survives_database_reopen() {
    let dir = TempDir::new().unwrap();
    let root = {
        let db = Arc::new(open_db(&dir));
        let mut trie = PrefixTrie::new(b"candidate-", Arc::clone(&db) as Arc<dyn KvStore>);
        trie.try_update(b"alpha", b"1").unwrap();
        trie.try_update(b"beta", b"2").unwrap();

        let mut batch = WriteBatch::new();
        let root = trie.commit_to(&mut batch).unwrap();
        db.write_batch(batch).unwrap();
        root
    };

    // Fresh process: reopen the database and resolve the trie by root
    let db = Arc::new(open_db(&dir));
    let trie = PrefixTrie::open(b"candidate-", root, db as Arc<dyn KvStore>);
    assert_eq!(trie.try_get(b"alpha").unwrap().unwrap(), b"1");
    assert_eq!(trie.try_get(b"beta").unwrap().unwrap(), b"2");

    let entries = trie.iter().unwrap();
    assert_eq!(entries.len(), 2);
}
