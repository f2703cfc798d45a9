use rusqlite::Statement;

use crate::error::{AppError, AppResult};

pub fn ensure_readonly(stmt: &Statement<'_>) -> AppResult<()> {
    if stmt.readonly() {
        Ok(())
    } else {
        Err(AppError::NotReadonly)
    }
}
