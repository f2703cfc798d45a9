//! SQLite driver. Each connection lives on its own worker thread; async callers talk to it
//! over a channel and receive answers through oneshot senders.

mod query;
mod readonly;
mod schema;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

use crate::{
    core::{
        driver::{DbConnection, Driver},
        types::{ColumnDescriptor, Credentials, Dialect, QueryResult},
    },
    error::{AppError, AppResult},
};

const IN_MEMORY: &str = ":memory:";

/// Opens SQLite databases named by `database_name` (a file path, or `:memory:`).
///
/// SQLite has no authentication; host, username and password are still required by
/// validation but are not used to open the file. Missing files are never created.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    busy_timeout_ms: u64,
}

impl SqliteDriver {
    pub fn new(busy_timeout_ms: u64) -> Self {
        Self { busy_timeout_ms }
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(2_000)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn open(&self, creds: &Credentials) -> AppResult<Arc<dyn DbConnection>> {
        let db_path = resolve_path(creds.database_name.trim())?;
        let worker = WorkerHandle::spawn(db_path, self.busy_timeout_ms).await?;
        Ok(Arc::new(worker))
    }
}

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: std::sync::mpsc::Sender<DbTask>,
    pub db_path: PathBuf,
}

impl WorkerHandle {
    async fn spawn(db_path: PathBuf, busy_timeout_ms: u64) -> AppResult<Self> {
        let (tx, rx) = std::sync::mpsc::channel::<DbTask>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path_for_thread = db_path.clone();
        thread::Builder::new()
            .name("sqlite-worker".into())
            .spawn(move || db_worker_main(path_for_thread, busy_timeout_ms, rx, ready_tx))?;
        ready_rx
            .await
            .map_err(|_| AppError::Internal("db worker exited during open".into()))??;
        Ok(Self { tx, db_path })
    }

    async fn call<T>(
        &self,
        task: impl FnOnce(oneshot::Sender<AppResult<T>>) -> DbTask,
    ) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(task(tx))
            .map_err(|_| AppError::Internal("db worker unavailable".into()))?;
        rx.await
            .map_err(|_| AppError::Internal("db worker dropped response".into()))?
    }
}

#[async_trait]
impl DbConnection for WorkerHandle {
    async fn ping(&self) -> AppResult<()> {
        self.call(|respond_to| DbTask::Ping { respond_to }).await
    }

    async fn tables(&self) -> AppResult<Vec<String>> {
        self.call(|respond_to| DbTask::Tables { respond_to }).await
    }

    async fn columns(&self, table: &str) -> AppResult<Option<Vec<ColumnDescriptor>>> {
        let table = table.to_string();
        self.call(|respond_to| DbTask::Columns { table, respond_to })
            .await
    }

    async fn fetch_rows(&self, table: &str, limit: u64, offset: u64) -> AppResult<QueryResult> {
        let table = table.to_string();
        self.call(|respond_to| DbTask::Rows {
            table,
            limit,
            offset,
            respond_to,
        })
        .await
    }

    async fn count_rows(&self, table: &str) -> AppResult<u64> {
        let table = table.to_string();
        self.call(|respond_to| DbTask::Count { table, respond_to })
            .await
    }

    async fn query(&self, sql: &str) -> AppResult<QueryResult> {
        let sql = sql.to_string();
        self.call(|respond_to| DbTask::Query {
            sql,
            read_only: false,
            respond_to,
        })
        .await
    }

    async fn query_read_only(&self, sql: &str) -> AppResult<QueryResult> {
        let sql = sql.to_string();
        self.call(|respond_to| DbTask::Query {
            sql,
            read_only: true,
            respond_to,
        })
        .await
    }
}

enum DbTask {
    Ping {
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Tables {
        respond_to: oneshot::Sender<AppResult<Vec<String>>>,
    },
    Columns {
        table: String,
        respond_to: oneshot::Sender<AppResult<Option<Vec<ColumnDescriptor>>>>,
    },
    Rows {
        table: String,
        limit: u64,
        offset: u64,
        respond_to: oneshot::Sender<AppResult<QueryResult>>,
    },
    Count {
        table: String,
        respond_to: oneshot::Sender<AppResult<u64>>,
    },
    Query {
        sql: String,
        read_only: bool,
        respond_to: oneshot::Sender<AppResult<QueryResult>>,
    },
}

fn db_worker_main(
    db_path: PathBuf,
    busy_timeout_ms: u64,
    rx: std::sync::mpsc::Receiver<DbTask>,
    ready: oneshot::Sender<AppResult<()>>,
) {
    let conn = match open_conn(&db_path, busy_timeout_ms) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error=%e, path=%db_path.display(), "failed to open sqlite database");
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // Ends once every handle (and therefore every sender) has been dropped.
    while let Ok(task) = rx.recv() {
        match task {
            DbTask::Ping { respond_to } => {
                let _ = respond_to.send(schema::ping(&conn));
            }
            DbTask::Tables { respond_to } => {
                let _ = respond_to.send(schema::list_tables(&conn));
            }
            DbTask::Columns { table, respond_to } => {
                let _ = respond_to.send(schema::list_columns(&conn, &table));
            }
            DbTask::Rows {
                table,
                limit,
                offset,
                respond_to,
            } => {
                let _ = respond_to.send(query::fetch_rows(&conn, &table, limit, offset));
            }
            DbTask::Count { table, respond_to } => {
                let _ = respond_to.send(schema::count_rows(&conn, &table));
            }
            DbTask::Query {
                sql,
                read_only,
                respond_to,
            } => {
                let _ = respond_to.send(query::run_query(&conn, &sql, read_only));
            }
        }
    }
    tracing::debug!(path=%db_path.display(), "sqlite worker stopped");
}

fn open_conn(path: &Path, busy_timeout_ms: u64) -> AppResult<Connection> {
    let target = path.display().to_string();
    let conn = if path == Path::new(IN_MEMORY) {
        Connection::open_in_memory()
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(path, flags)
    }
    .map_err(|e| AppError::connection(target.clone(), e))?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(|e| AppError::connection(target, e))?;
    Ok(conn)
}

fn resolve_path(database: &str) -> AppResult<PathBuf> {
    let path = Path::new(database);
    if database == IN_MEMORY || path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(path))
    }
}
