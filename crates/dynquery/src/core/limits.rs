use crate::error::{AppError, AppResult};

/// Row window for one page of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u64,
    pub offset: u64,
}

/// Resolves `page`/`size` into a window. `size` is clamped to `max_page_size`;
/// offsets past `i64::MAX` saturate, which drivers treat as "past the end".
pub fn page_window(page: u64, size: u64, max_page_size: u64) -> AppResult<PageWindow> {
    if size == 0 {
        return Err(AppError::InvalidRequest("page size must be greater than zero".into()));
    }
    let limit = size.min(max_page_size.max(1));
    let offset = page.saturating_mul(limit).min(i64::MAX as u64);
    Ok(PageWindow { limit, offset })
}
