use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    core::types::{ColumnDescriptor, Credentials, Dialect, QueryResult},
    error::{AppError, AppResult},
};

/// Opens connections for one dialect.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Opens a connection with the supplied credentials. Failures are connection errors.
    async fn open(&self, creds: &Credentials) -> AppResult<Arc<dyn DbConnection>>;
}

/// A live, reusable connection (or pool) to one database.
///
/// Table names passed in here are raw names; implementations check them against the
/// catalog and quote them before building statements.
#[async_trait]
pub trait DbConnection: Send + Sync + fmt::Debug {
    /// Cheap round-trip used before reusing a cached connection.
    async fn ping(&self) -> AppResult<()>;

    async fn tables(&self) -> AppResult<Vec<String>>;

    /// `None` when the table does not exist.
    async fn columns(&self, table: &str) -> AppResult<Option<Vec<ColumnDescriptor>>>;

    /// Rows in primary-key order, falling back to natural row order.
    async fn fetch_rows(&self, table: &str, limit: u64, offset: u64) -> AppResult<QueryResult>;

    async fn count_rows(&self, table: &str) -> AppResult<u64>;

    async fn query(&self, sql: &str) -> AppResult<QueryResult>;

    /// Like `query`, but refuses anything the engine does not consider read-only.
    async fn query_read_only(&self, sql: &str) -> AppResult<QueryResult>;
}

/// Drivers available to the registry, keyed by dialect.
#[derive(Clone, Default)]
pub struct DriverSet {
    drivers: HashMap<Dialect, Arc<dyn Driver>>,
}

impl DriverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, driver: impl Driver + 'static) -> Self {
        self.drivers.insert(driver.dialect(), Arc::new(driver));
        self
    }

    pub fn get(&self, dialect: Dialect) -> AppResult<Arc<dyn Driver>> {
        self.drivers.get(&dialect).cloned().ok_or_else(|| {
            AppError::connection(dialect.as_str(), "no driver registered for this dialect")
        })
    }
}

impl fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}

/// Double-quotes an identifier, doubling embedded quotes. Valid for SQLite and PostgreSQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
