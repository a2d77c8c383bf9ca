//! Embedded on-disk key-value store
//!
//! Keys and values are byte strings grouped into named buckets, all kept in a
//! single SQLite file. Access goes through closures that run inside a
//! transaction: `update` commits when the closure succeeds and rolls back when
//! it fails, `view` never writes.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;

/// Errors that can occur when using the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Creating the directory or setting file permissions failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying database reported an error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// A write was attempted inside `view`
    #[error("Transaction is read-only")]
    ReadOnly,

    /// Keys must not be empty
    #[error("Key required")]
    KeyRequired,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS buckets (
        name TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS entries (
        bucket TEXT NOT NULL,
        key BLOB NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (bucket, key)
    );
";

/// A key-value store backed by one database file
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Opens the store at `path`, creating the file and its directory if needed.
    ///
    /// A new file is created owner-only (`0600` on Unix) before anything is
    /// written to it. The mode of an existing file is left alone.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            create_private_file(path)?;
            debug!("created key-value store file {}", path.display());
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("opened key-value store at {}", path.display());

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` in a read-write transaction.
    ///
    /// Changes are committed if `f` returns `Ok` and discarded otherwise.
    pub fn update<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, StoreError>,
    {
        let tx = Tx {
            inner: self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?,
            writable: true,
        };
        let value = f(&tx)?;
        tx.inner.commit()?;
        Ok(value)
    }

    /// Runs `f` in a read-only transaction
    pub fn view<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, StoreError>,
    {
        let tx = Tx {
            inner: self.conn.transaction()?,
            writable: false,
        };
        let value = f(&tx)?;
        tx.inner.rollback()?;
        Ok(value)
    }
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .map(|_| ())
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
}

/// An open transaction on a `Store`
pub struct Tx<'conn> {
    inner: Transaction<'conn>,
    writable: bool,
}

impl fmt::Debug for Tx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl<'conn> Tx<'conn> {
    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        let found = self
            .inner
            .query_row(
                "SELECT 1 FROM buckets WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn handle(&self, name: &str) -> Bucket<'_> {
        Bucket {
            conn: &*self.inner,
            writable: self.writable,
            name: name.to_string(),
        }
    }

    /// Creates a bucket, failing if it already exists
    pub fn create_bucket(&self, name: &str) -> Result<Bucket<'_>, StoreError> {
        self.ensure_writable()?;
        if self.bucket_exists(name)? {
            return Err(StoreError::BucketExists(name.to_string()));
        }
        self.inner
            .execute("INSERT INTO buckets (name) VALUES (?1)", params![name])?;
        Ok(self.handle(name))
    }

    /// Creates a bucket unless it already exists
    pub fn create_bucket_if_not_exists(&self, name: &str) -> Result<Bucket<'_>, StoreError> {
        self.ensure_writable()?;
        self.inner.execute(
            "INSERT OR IGNORE INTO buckets (name) VALUES (?1)",
            params![name],
        )?;
        Ok(self.handle(name))
    }

    /// Deletes a bucket and everything in it
    pub fn delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if !self.bucket_exists(name)? {
            return Err(StoreError::BucketNotFound(name.to_string()));
        }
        self.inner
            .execute("DELETE FROM entries WHERE bucket = ?1", params![name])?;
        self.inner
            .execute("DELETE FROM buckets WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Looks up an existing bucket
    pub fn bucket(&self, name: &str) -> Result<Option<Bucket<'_>>, StoreError> {
        if self.bucket_exists(name)? {
            Ok(Some(self.handle(name)))
        } else {
            Ok(None)
        }
    }

    /// Names of all buckets in sorted order
    pub fn bucket_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .inner
            .prepare("SELECT name FROM buckets ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let names = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// A named collection of key/value pairs inside a transaction
#[derive(Debug)]
pub struct Bucket<'tx> {
    conn: &'tx Connection,
    writable: bool,
    name: String,
}

impl<'tx> Bucket<'tx> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores `value` under `key`, overwriting any previous value
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO entries (bucket, key, value) VALUES (?1, ?2, ?3)",
            params![self.name, key, value],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM entries WHERE bucket = ?1 AND key = ?2",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Removes `key`, returning whether it was present
    pub fn delete(&self, key: &[u8]) -> Result<bool, StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        let removed = self.conn.execute(
            "DELETE FROM entries WHERE bucket = ?1 AND key = ?2",
            params![self.name, key],
        )?;
        Ok(removed > 0)
    }

    /// All entries in byte-wise key order
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM entries WHERE bucket = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE bucket = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(&temp_dir.path().join("test.db")).expect("Store should open");
        (store, temp_dir)
    }

    #[test]
    fn test_open_creates_nested_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("data").join("tutorial.db");

        let store = Store::open(&path).expect("Store should open");

        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp_dir) = create_test_store();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("shared.db");
        drop(Store::open(&path).unwrap());
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = Store::open(&path).expect("Store should reopen");

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_open_accepts_empty_existing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("empty.db");
        fs::write(&path, b"").unwrap();

        let mut store = Store::open(&path).expect("Store should open an empty file");
        store
            .update(|tx| tx.create_bucket("MyBucket")?.put(b"k", b"v"))
            .unwrap();
    }

    #[test]
    fn test_tx_and_bucket_debug_output() {
        let (mut store, _temp_dir) = create_test_store();

        let (tx_debug, bucket_debug) = store
            .update(|tx| {
                let bucket = tx.create_bucket("MyBucket")?;
                Ok((format!("{:?}", tx), format!("{:?}", bucket)))
            })
            .unwrap();

        assert!(tx_debug.contains("writable: true"), "{}", tx_debug);
        assert!(bucket_debug.contains("MyBucket"), "{}", bucket_debug);
    }

    #[test]
    fn test_put_then_get() {
        let (mut store, _temp_dir) = create_test_store();

        store
            .update(|tx| {
                let bucket = tx.create_bucket("MyBucket")?;
                bucket.put(b"tut-key", b"go tutorial")
            })
            .unwrap();

        let value = store
            .view(|tx| {
                let bucket = tx.bucket("MyBucket")?.expect("bucket should exist");
                bucket.get(b"tut-key")
            })
            .unwrap();
        assert_eq!(value.as_deref(), Some(&b"go tutorial"[..]));
    }

    #[test]
    fn test_create_bucket_twice_fails() {
        let (mut store, _temp_dir) = create_test_store();
        store.update(|tx| tx.create_bucket("MyBucket").map(|_| ())).unwrap();

        let result = store.update(|tx| tx.create_bucket("MyBucket").map(|_| ()));

        assert!(matches!(result, Err(StoreError::BucketExists(name)) if name == "MyBucket"));
    }

    #[test]
    fn test_create_bucket_if_not_exists_keeps_contents() {
        let (mut store, _temp_dir) = create_test_store();
        store
            .update(|tx| tx.create_bucket("b")?.put(b"k", b"v"))
            .unwrap();

        let len = store
            .update(|tx| tx.create_bucket_if_not_exists("b")?.len())
            .unwrap();
        assert_eq!(len, 1);
    }

    #[test]
    fn test_entries_are_in_key_order() {
        let (mut store, _temp_dir) = create_test_store();
        store
            .update(|tx| {
                let bucket = tx.create_bucket("b")?;
                bucket.put(b"banana", b"2")?;
                bucket.put(b"apple", b"1")?;
                bucket.put(b"cherry", b"3")?;
                bucket.put(&[0xff], b"4")
            })
            .unwrap();

        let keys: Vec<Vec<u8>> = store
            .view(|tx| tx.bucket("b")?.expect("bucket").entries())
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        assert_eq!(
            keys,
            vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec(), vec![0xff]]
        );
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let (mut store, _temp_dir) = create_test_store();

        let result: Result<(), StoreError> = store.update(|tx| {
            tx.create_bucket("b")?.put(b"k", b"v")?;
            Err(StoreError::BucketNotFound("forced".to_string()))
        });
        assert!(result.is_err());

        let exists = store.view(|tx| Ok(tx.bucket("b")?.is_some())).unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_view_rejects_writes() {
        let (mut store, _temp_dir) = create_test_store();
        store.update(|tx| tx.create_bucket("b").map(|_| ())).unwrap();

        let create = store.view(|tx| tx.create_bucket("other").map(|_| ()));
        assert!(matches!(create, Err(StoreError::ReadOnly)));

        let put = store.view(|tx| tx.bucket("b")?.expect("bucket").put(b"k", b"v"));
        assert!(matches!(put, Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let (mut store, _temp_dir) = create_test_store();
        let result = store.update(|tx| tx.create_bucket("b")?.put(b"", b"v"));
        assert!(matches!(result, Err(StoreError::KeyRequired)));
    }

    #[test]
    fn test_delete_key_and_bucket() {
        let (mut store, _temp_dir) = create_test_store();
        store
            .update(|tx| {
                let bucket = tx.create_bucket("b")?;
                bucket.put(b"k1", b"v1")?;
                bucket.put(b"k2", b"v2")
            })
            .unwrap();

        let removed = store
            .update(|tx| tx.bucket("b")?.expect("bucket").delete(b"k1"))
            .unwrap();
        assert!(removed);

        store.update(|tx| tx.delete_bucket("b")).unwrap();
        let names = store.view(|tx| tx.bucket_names()).unwrap();
        assert!(names.is_empty());

        let result = store.update(|tx| tx.delete_bucket("b"));
        assert!(matches!(result, Err(StoreError::BucketNotFound(_))));
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("tutorial.db");

        {
            let mut store = Store::open(&path).unwrap();
            store
                .update(|tx| tx.create_bucket("MyBucket")?.put(b"k", b"v"))
                .unwrap();
        }

        let mut store = Store::open(&path).unwrap();
        let names = store.view(|tx| tx.bucket_names()).unwrap();
        assert_eq!(names, vec!["MyBucket".to_string()]);
    }
}
