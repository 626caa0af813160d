//! RocksDB storage layer shared by the ledger and the fairness engine.

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), rocksdb::Error> {
        self.db.put(key, value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), rocksdb::Error> {
        self.db.delete(key)
    }

    /// Write a set of key/value pairs as a single atomic batch.
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), rocksdb::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.db.write(batch)
    }

    /// Scan keys under `prefix` in key order, starting strictly after
    /// `cursor` when one is given. Returns at most `limit` rows.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let start: Vec<u8> = match cursor {
            Some(c) => {
                // Seek past the cursor key itself.
                let mut s = c.to_vec();
                s.push(0);
                s
            }
            None => prefix.to_vec(),
        };

        let mut rows = Vec::with_capacity(limit);
        for item in self.db.iterator(IteratorMode::From(&start, Direction::Forward)) {
            let Ok((key, value)) = item else { break };
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, storage) = open_temp();
        storage.put(b"k1", b"v1").unwrap();
        assert_eq!(storage.get(b"k1"), Some(b"v1".to_vec()));

        storage.delete(b"k1").unwrap();
        assert_eq!(storage.get(b"k1"), None);
    }

    #[test]
    fn test_batch_write_is_visible() {
        let (_dir, storage) = open_temp();
        storage
            .batch_write(&[(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())])
            .unwrap();
        assert_eq!(storage.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_scan_prefix_with_cursor() {
        let (_dir, storage) = open_temp();
        for i in 0u8..5 {
            storage.put(&[b'p', b':', i], &[i]).unwrap();
        }
        storage.put(b"q:0", b"other").unwrap();

        let first = storage.scan_prefix(b"p:", None, 2);
        assert_eq!(first.len(), 2);

        let rest = storage.scan_prefix(b"p:", Some(&first[1].0), 10);
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|(k, _)| k.starts_with(b"p:")));
    }
}
