use std::{fmt, str::FromStr};

use tracing::{info, warn};

use crate::{
    core::{registry::ConnectionHandle, types::QueryResult},
    error::{AppError, AppResult},
};

/// What callers may do with free-form SQL.
///
/// `Unrestricted` runs statements exactly as given, with every privilege of the connected
/// credentials. Nothing is parsed, parameterized or filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlAccess {
    #[default]
    Unrestricted,
    /// Only statements the engine itself reports as read-only.
    ReadOnly,
    Disabled,
}

impl FromStr for SqlAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrestricted" | "full" => Ok(SqlAccess::Unrestricted),
            "read-only" | "readonly" => Ok(SqlAccess::ReadOnly),
            "disabled" | "off" => Ok(SqlAccess::Disabled),
            other => Err(format!(
                "invalid sql access '{other}'; expected unrestricted, read-only or disabled"
            )),
        }
    }
}

impl fmt::Display for SqlAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SqlAccess::Unrestricted => "unrestricted",
            SqlAccess::ReadOnly => "read-only",
            SqlAccess::Disabled => "disabled",
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    access: SqlAccess,
}

impl QueryExecutor {
    pub fn new(access: SqlAccess) -> Self {
        if access == SqlAccess::Unrestricted {
            warn!("free-form sql runs with the full privileges of the connected credentials");
        }
        Self { access }
    }

    pub fn access(&self) -> SqlAccess {
        self.access
    }

    pub async fn execute(&self, handle: &ConnectionHandle, sql: &str) -> AppResult<QueryResult> {
        let conn = handle.connection();
        let rows = match self.access {
            SqlAccess::Disabled => return Err(AppError::SqlDisabled),
            SqlAccess::ReadOnly => conn.query_read_only(sql).await?,
            SqlAccess::Unrestricted => conn.query(sql).await?,
        };
        info!(fingerprint=%handle.fingerprint(), rows = rows.len(), "query executed");
        Ok(rows)
    }
}
