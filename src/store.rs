//! Store - Scoped access to the relational data file
//!
//! The store owns every persisted row. Each request gets its connection
//! through [`Store::execute`], which runs the request's statements in one
//! transaction, commits on success and releases the connection on every exit
//! path.
//!
//! # Backends
//!
//! - **File**: a fresh connection is opened for every request and closed
//!   afterwards, so nothing is held between requests.
//! - **Memory**: one long-lived connection behind a mutex. Used by tests and
//!   `--in-memory`; rows live as long as the `Store`.
//!
//! # Usage
//!
//! ```no_run
//! use acadb::store::Store;
//!
//! let store = Store::open("data.db", false).unwrap();
//! let count: i64 = store
//!     .execute(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM Students", [], |r| r.get(0))?))
//!     .unwrap();
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction};
use tracing::info;

use crate::error::Result;
use crate::schema;

const BUSY_TIMEOUT_MS: u64 = 100;

enum Backend {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

pub struct Store {
    backend: Backend,
    foreign_keys: bool,
}

impl Store {
    /// Open (creating if needed) the data file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>, foreign_keys: bool) -> Result<Self> {
        let store = Self {
            backend: Backend::File(path.as_ref().to_path_buf()),
            foreign_keys,
        };
        {
            let conn = store.connect_file(path.as_ref())?;
            schema::initialize(&conn)?;
        }
        info!(path = %path.as_ref().display(), "store initialized");
        Ok(store)
    }

    /// Store backed by a single in-memory connection.
    pub fn in_memory(foreign_keys: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        if foreign_keys {
            conn.pragma_update(None, "foreign_keys", true)?;
        }
        schema::initialize(&conn)?;
        Ok(Self {
            backend: Backend::Memory(Mutex::new(conn)),
            foreign_keys,
        })
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    pub fn foreign_keys(&self) -> bool {
        self.foreign_keys
    }

    /// Run `f` as one auto-committing unit.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the transaction back when
    /// it is dropped. A file-backed connection is closed before this returns.
    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        match &self.backend {
            Backend::File(path) => {
                let mut conn = self.connect_file(path)?;
                run_in_transaction(&mut conn, f)
            }
            Backend::Memory(conn) => {
                let mut conn = lock(conn);
                run_in_transaction(&mut conn, f)
            }
        }
    }

    fn connect_file(&self, path: &Path) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        if self.foreign_keys {
            conn.pragma_update(None, "foreign_keys", true)?;
        }
        Ok(conn)
    }
}

fn run_in_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

// A panic while holding the lock leaves the connection itself usable; the
// open transaction was rolled back when it unwound.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use crate::error::QueryError;
    use tempfile::tempdir;

    fn count_students(store: &Store) -> i64 {
        store
            .execute(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM Students", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");

        let store = Store::open(&path, false).unwrap();

        assert!(path.exists());
        assert!(!store.is_ephemeral());
        assert_eq!(count_students(&store), 0);
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");

        {
            let store = Store::open(&path, false).unwrap();
            store
                .execute(|tx| {
                    tx.execute(
                        "INSERT INTO Students VALUES (1, 'Alice', '2023-09-01', 10, 500)",
                        [],
                    )?;
                    Ok(())
                })
                .unwrap();
        }

        let store = Store::open(&path, false).unwrap();
        assert_eq!(count_students(&store), 1);
    }

    #[test]
    fn test_error_rolls_back() {
        let store = Store::in_memory(false).unwrap();

        let result: Result<()> = store.execute(|tx| {
            tx.execute(
                "INSERT INTO Students VALUES (1, 'Alice', '2023-09-01', 10, 500)",
                [],
            )?;
            Err(QueryError::InvalidPayload("abort".into()))
        });

        assert!(result.is_err());
        assert_eq!(count_students(&store), 0);
    }

    #[test]
    fn test_store_usable_after_failed_request() {
        let store = Store::in_memory(false).unwrap();

        let bad: Result<usize> = store.execute(|tx| Ok(tx.execute("NOT SQL", [])?));
        assert!(matches!(bad, Err(QueryError::Store(_))));

        assert_eq!(count_students(&store), 0);
    }

    #[test]
    fn test_foreign_keys_enforced_when_enabled() {
        let store = Store::in_memory(true).unwrap();
        assert!(store.foreign_keys());

        let result: Result<usize> = store.execute(|tx| {
            Ok(tx.execute(
                "INSERT INTO Students VALUES (1, 'Alice', '2023-09-01', 10, 500)",
                [],
            )?)
        });

        assert!(matches!(result, Err(QueryError::Store(_))));
    }

    #[test]
    fn test_foreign_keys_off_by_default() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("data.db"), false).unwrap();

        let inserted = store
            .execute(|tx| {
                Ok(tx.execute(
                    "INSERT INTO Students VALUES (1, 'Alice', '2023-09-01', 10, 500)",
                    [],
                )?)
            })
            .unwrap();

        assert_eq!(inserted, 1);
    }
}
