use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    core::{
        context::{ContextRouter, SessionId},
        executor::{QueryExecutor, SqlAccess},
        introspect::SchemaIntrospector,
        registry::{ConnectionHandle, ConnectionRegistry},
        types::{
            ColumnDescriptor, Connected, Credentials, PageRequest, PageResult, QueryResult,
            TableDescriptor,
        },
        validate::validate,
    },
    error::{AppError, AppResult, ErrorKind, ExposedError, Verbosity},
};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub verbosity: Verbosity,
    pub sql_access: SqlAccess,
    pub max_page_size: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Verbose,
            sql_access: SqlAccess::Unrestricted,
            max_page_size: 1000,
        }
    }
}

/// Entry point for transports: connect, introspect and query on behalf of a session.
///
/// Every operation other than `connect` requires that the session connected first.
/// Errors leave here already shaped by the configured [`Verbosity`].
#[derive(Debug)]
pub struct AccessOrchestrator {
    registry: Arc<ConnectionRegistry>,
    router: ContextRouter,
    introspector: SchemaIntrospector,
    executor: QueryExecutor,
    verbosity: Verbosity,
}

impl AccessOrchestrator {
    pub fn new(registry: Arc<ConnectionRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            router: ContextRouter::new(),
            introspector: SchemaIntrospector::new(config.max_page_size),
            executor: QueryExecutor::new(config.sql_access),
            verbosity: config.verbosity,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &ContextRouter {
        &self.router
    }

    pub async fn connect(
        &self,
        session: &SessionId,
        creds: &Credentials,
    ) -> Result<Connected, ExposedError> {
        self.try_connect(session, creds)
            .await
            .map_err(|e| self.expose(session, "Error connecting to the database", e))
    }

    async fn try_connect(&self, session: &SessionId, creds: &Credentials) -> AppResult<Connected> {
        if !validate(creds) {
            return Err(AppError::InvalidCredentials);
        }
        let handle = self.registry.create_and_test_handle(creds).await?;
        let fingerprint = handle.fingerprint().clone();
        let database_name = handle.database_name().to_string();
        self.router.set_current(session, handle);
        info!(%session, %fingerprint, "connected");
        Ok(Connected {
            message: format!("Connected successfully to database: {database_name}"),
            database_name,
            fingerprint,
        })
    }

    pub async fn list_tables(&self, session: &SessionId) -> Result<Vec<TableDescriptor>, ExposedError> {
        let res = match self.active(session) {
            Ok(handle) => self.introspector.list_tables(&handle).await,
            Err(e) => Err(e),
        };
        res.map_err(|e| self.expose(session, "Error listing tables", e))
    }

    pub async fn list_columns(
        &self,
        session: &SessionId,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, ExposedError> {
        let res = match self.active(session) {
            Ok(handle) => self.introspector.list_columns(&handle, table).await,
            Err(e) => Err(e),
        };
        res.map_err(|e| {
            self.expose(session, &format!("Error listing columns for table {table}"), e)
        })
    }

    pub async fn get_page(
        &self,
        session: &SessionId,
        req: &PageRequest,
    ) -> Result<PageResult, ExposedError> {
        let res = match self.active(session) {
            Ok(handle) => self.introspector.get_page(&handle, req).await,
            Err(e) => Err(e),
        };
        res.map_err(|e| {
            self.expose(
                session,
                &format!("Error obtaining data from table {}", req.table),
                e,
            )
        })
    }

    /// Runs caller-supplied SQL as-is, subject only to the configured [`SqlAccess`].
    pub async fn execute_query(
        &self,
        session: &SessionId,
        sql: &str,
    ) -> Result<QueryResult, ExposedError> {
        let res = match self.active(session) {
            Ok(handle) => self.executor.execute(&handle, sql).await,
            Err(e) => Err(e),
        };
        res.map_err(|e| self.expose(session, "Error executing query", e))
    }

    /// Forgets the session's active connection. The connection stays cached.
    pub fn release(&self, session: &SessionId) -> bool {
        self.router.release(session).is_some()
    }

    fn active(&self, session: &SessionId) -> AppResult<ConnectionHandle> {
        self.router
            .current(session)
            .ok_or(AppError::NoActiveConnection)
    }

    fn expose(&self, session: &SessionId, context: &str, err: AppError) -> ExposedError {
        match err.kind() {
            ErrorKind::Connection | ErrorKind::Query | ErrorKind::Internal => {
                error!(%session, code = err.code(), error = %err, "{context}")
            }
            _ => warn!(%session, code = err.code(), error = %err, "{context}"),
        }
        self.verbosity.expose(context, &err)
    }
}
