//! SQLite storage backend
//!
//! One row per entry. Content lives in a TEXT column as base64, directories
//! are explicit rows flagged with `is_directory`, and `parent_path` is indexed
//! so listing a directory is a single indexed lookup.

// Mutex.lock().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use super::backend::FsBackend;
use super::limits::StoreLimits;
use super::path::{ROOT, file_name, parent_path};
use super::posix::PosixFs;
use super::traits::Metadata;
use crate::error::Result;

/// Persistent store: the POSIX contract over a SQLite table.
pub type PersistentStore = PosixFs<SqliteBackend>;

impl PersistentStore {
    /// Open (or create) a store in a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(PosixFs::with_backend(SqliteBackend::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(PosixFs::with_backend(SqliteBackend::open_in_memory()?))
    }

    /// Use an existing connection with custom limits.
    pub fn from_connection(conn: Connection, limits: StoreLimits) -> Result<Self> {
        Ok(PosixFs::with_backend(SqliteBackend::from_connection(
            conn, limits,
        )?))
    }
}

/// SQLite-backed storage.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    limits: StoreLimits,
}

impl SqliteBackend {
    /// Open (or create) a backend in a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, StoreLimits::default())
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, StoreLimits::default())
    }

    /// Wrap a connection. Schema and root row are created if absent.
    pub fn from_connection(conn: Connection, limits: StoreLimits) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            limits,
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            parent_path TEXT,
            content TEXT,
            is_directory INTEGER NOT NULL DEFAULT 0,
            mtime INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_files_parent ON files(parent_path);
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO files (path, parent_path, content, is_directory, mtime)
         VALUES (?1, NULL, NULL, 1, ?2)",
        params![ROOT, now_millis()],
    )?;
    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_system_time(millis: i64) -> SystemTime {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(SystemTime::from)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Decoded size estimate from a base64 length; padding is not accounted for.
fn approx_decoded_len(encoded: i64) -> u64 {
    (encoded.max(0) as u64) * 3 / 4
}

#[async_trait]
impl FsBackend for SqliteBackend {
    async fn lookup(&self, path: &str) -> Result<Option<Metadata>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT is_directory, length(content), mtime FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(is_directory, encoded_len, mtime)| {
            let modified = to_system_time(mtime);
            if is_directory {
                Metadata::directory(modified)
            } else {
                Metadata::file(approx_decoded_len(encoded_len.unwrap_or(0)), modified)
            }
        }))
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let encoded = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT content FROM files WHERE path = ?1 AND is_directory = 0",
                params![path],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
        };

        match encoded {
            Some(text) => Ok(Some(STANDARD.decode(text.unwrap_or_default())?)),
            None => Ok(None),
        }
    }

    async fn write(&self, path: &str, content: &[u8], missing_dirs: &[&str]) -> Result<()> {
        let encoded = STANDARD.encode(content);
        let mtime = now_millis();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for dir in missing_dirs {
            tx.execute(
                "INSERT OR IGNORE INTO files (path, parent_path, content, is_directory, mtime)
                 VALUES (?1, ?2, NULL, 1, ?3)",
                params![dir, parent_path(dir), mtime],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO files (path, parent_path, content, is_directory, mtime)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![path, parent_path(path), encoded, mtime],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO files (path, parent_path, content, is_directory, mtime)
             VALUES (?1, ?2, NULL, 1, ?3)",
            params![path, parent_path(path), now_millis()],
        )?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT path FROM files WHERE parent_path = ?1")?;
        let rows = stmt.query_map(params![path], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for child in rows {
            names.push(file_name(&child?).to_string());
        }
        Ok(names)
    }

    async fn has_children(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE parent_path = ?1)",
            params![path],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }

    fn encoded_len(&self, content: &[u8]) -> u64 {
        content.len().div_ceil(3) as u64 * 4
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;

    #[tokio::test]
    async fn test_binary_round_trip() {
        let fs = PersistentStore::open_in_memory().unwrap();
        let bytes: Vec<u8> = (0..=255u8).collect();

        fs.write_file("bin/all-bytes", &bytes).await.unwrap();
        assert_eq!(fs.read_file("bin/all-bytes").await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_content_is_stored_as_base64_text() {
        let fs = PersistentStore::open_in_memory().unwrap();
        fs.write_file("f", b"hi").await.unwrap();

        let conn = fs.backend().conn.lock().unwrap();
        let stored: String = conn
            .query_row("SELECT content FROM files WHERE path = 'f'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, "aGk=");
    }

    #[tokio::test]
    async fn test_parent_path_column_is_maintained() {
        let fs = PersistentStore::open_in_memory().unwrap();
        fs.write_file("a/b/c.txt", b"x").await.unwrap();

        let conn = fs.backend().conn.lock().unwrap();
        let parent: Option<String> = conn
            .query_row(
                "SELECT parent_path FROM files WHERE path = 'a/b/c.txt'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(parent.as_deref(), Some("a/b"));

        let dirs: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM files WHERE is_directory = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        // root, a, a/b
        assert_eq!(dirs, 3);
    }

    #[tokio::test]
    async fn test_stat_size_is_approximate() {
        let fs = PersistentStore::open_in_memory().unwrap();
        fs.write_file("f", b"hello").await.unwrap();

        // "aGVsbG8=" is 8 chars -> 6
        assert_eq!(fs.stat("f").await.unwrap().size, 6);
    }

    #[tokio::test]
    async fn test_reopen_keeps_root_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("session.db");

        {
            let fs = PersistentStore::open(&db).unwrap();
            fs.write_file("src/lib.rs", b"pub fn x() {}").await.unwrap();
        }

        let fs = PersistentStore::open(&db).unwrap();
        assert!(fs.stat("/").await.unwrap().is_dir());
        assert_eq!(
            fs.read_file("/src/lib.rs").await.unwrap(),
            b"pub fn x() {}"
        );
    }

    #[test]
    fn test_encoded_len_matches_base64() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for n in 0..10usize {
            let content = vec![7u8; n];
            assert_eq!(
                backend.encoded_len(&content),
                STANDARD.encode(&content).len() as u64
            );
        }
    }
}
