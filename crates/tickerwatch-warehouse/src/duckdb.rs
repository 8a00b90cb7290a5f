//! `DuckDB` connection pooling.
//!
//! All pooled connections are clones of a single root connection so that every
//! handle shares one database instance; opening the same file twice from one
//! process is rejected by `DuckDB`.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

struct PoolState {
    root: Option<Connection>,
    idle: Vec<Connection>,
}

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    state: Mutex<PoolState>,
}

/// Lazily-opened pool of `DuckDB` connections for one database file.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool for `path`. The file is opened on the first [`ConnectionPool::acquire`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: path.into(),
                max_idle: max_idle.max(1),
                state: Mutex::new(PoolState {
                    root: None,
                    idle: Vec::new(),
                }),
            }),
        }
    }

    /// Acquire a connection, reusing an idle one when available.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or the root
    /// connection cannot be cloned.
    ///
    /// # Panics
    /// Panics if the pool mutex is poisoned.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let mut state = self
            .inner
            .state
            .lock()
            .expect("duckdb connection pool mutex poisoned");

        let connection = match state.idle.pop() {
            Some(connection) => connection,
            None => {
                if state.root.is_none() {
                    state.root = Some(open_connection(self.inner.db_path.as_path())?);
                }
                match state.root.as_ref() {
                    Some(root) => root.try_clone()?,
                    None => open_connection(self.inner.db_path.as_path())?,
                }
            }
        };
        drop(state);

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut state = self
            .pool
            .state
            .lock()
            .expect("duckdb connection pool mutex poisoned");
        if state.idle.len() < self.pool.max_idle {
            state.idle.push(connection);
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(connection)
}
