use tracing::debug;

use crate::{
    core::{
        limits::page_window,
        registry::ConnectionHandle,
        types::{ColumnDescriptor, PageRequest, PageResult, TableDescriptor},
    },
    error::{AppError, AppResult},
};

/// Catalog and paging reads against an active connection.
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    max_page_size: u64,
}

impl SchemaIntrospector {
    pub fn new(max_page_size: u64) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
        }
    }

    pub async fn list_tables(&self, handle: &ConnectionHandle) -> AppResult<Vec<TableDescriptor>> {
        let names = handle.connection().tables().await?;
        Ok(names.into_iter().map(|name| TableDescriptor { name }).collect())
    }

    pub async fn list_columns(
        &self,
        handle: &ConnectionHandle,
        table: &str,
    ) -> AppResult<Vec<ColumnDescriptor>> {
        handle
            .connection()
            .columns(table)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("table {table}")))
    }

    /// Rows past the end yield an empty page with the real total, never an error.
    pub async fn get_page(
        &self,
        handle: &ConnectionHandle,
        req: &PageRequest,
    ) -> AppResult<PageResult> {
        let window = page_window(req.page, req.size, self.max_page_size)?;
        let columns = self.list_columns(handle, &req.table).await?;
        let conn = handle.connection();
        let rows = conn
            .fetch_rows(&req.table, window.limit, window.offset)
            .await?;
        let total_rows = conn.count_rows(&req.table).await?;
        debug!(
            table = %req.table,
            page = req.page,
            rows = rows.len(),
            total_rows,
            "page fetched"
        );
        Ok(PageResult {
            table_name: req.table.clone(),
            rows,
            columns,
            total_rows,
            current_page: req.page,
            page_size: window.limit,
        })
    }
}
