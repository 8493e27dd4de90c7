//! Pooled `DuckDB` connections sharing one database instance.
//!
//! The database file is opened once; every further connection is a clone of
//! that root handle, so readers and the batch writer in one process see the
//! same catalog without competing for the file lock.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;

/// Which side of the pool a connection is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Canned queries. Never used for writes.
    ReadOnly,
    /// Loader, detector and registry writes.
    ReadWrite,
}

#[derive(Default)]
struct Idle {
    read_only: Vec<Connection>,
    read_write: Vec<Connection>,
}

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    root: Mutex<Connection>,
    idle: Mutex<Idle>,
}

/// Hands out connections to a single `DuckDB` database file.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened as a `DuckDB` database.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(db_path.as_path())?;
        configure(&root)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Idle::default()),
            }),
        })
    }

    /// Checks out a connection, reusing an idle one when available.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned from the root.
    pub fn acquire(&self, mode: AccessMode) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = {
            let mut idle = lock(&self.inner.idle);
            match mode {
                AccessMode::ReadOnly => idle.read_only.pop(),
                AccessMode::ReadWrite => idle.read_write.pop(),
            }
        };

        let connection = match reused {
            Some(connection) => connection,
            None => {
                let connection = lock(&self.inner.root).try_clone()?;
                configure(&connection)?;
                connection
            }
        };

        Ok(PooledConnection {
            mode,
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A checked-out connection; returns to the idle list on drop.
pub struct PooledConnection {
    mode: AccessMode,
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl PooledConnection {
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            // Only taken inside Drop.
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = lock(&self.pool.idle);
        let bucket = match self.mode {
            AccessMode::ReadOnly => &mut idle.read_only,
            AccessMode::ReadWrite => &mut idle.read_write,
        };
        if bucket.len() < self.pool.max_idle {
            bucket.push(connection);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn configure(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn released_connections_are_reused_per_mode() {
        let temp = tempdir().expect("tempdir");
        let pool = ConnectionPool::open(temp.path().join("pool.duckdb"), 1).expect("open pool");

        {
            let writer = pool.acquire(AccessMode::ReadWrite).expect("writer");
            writer
                .execute_batch("CREATE TABLE scratch (id INTEGER); INSERT INTO scratch VALUES (7);")
                .expect("write");
        }

        let reader = pool.acquire(AccessMode::ReadOnly).expect("reader");
        assert_eq!(reader.mode(), AccessMode::ReadOnly);
        let value: i32 = reader
            .query_row("SELECT id FROM scratch", [], |row| row.get(0))
            .expect("read back");
        assert_eq!(value, 7);
    }
}
