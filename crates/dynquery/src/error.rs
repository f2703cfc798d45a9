use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credentials provided")]
    InvalidCredentials,

    #[error("failed to connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("no active connection; call connect first")]
    NoActiveConnection,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("sql error: {0}")]
    SqlError(String),

    #[error("free-form sql execution is disabled")]
    SqlDisabled,

    #[error("query is not read-only")]
    NotReadonly,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::SqlError(e.to_string())
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Display on tokio_postgres::Error hides the server message; the source carries it.
        match e.as_db_error() {
            Some(db) => AppError::SqlError(format!("{}: {}", db.code().code(), db.message())),
            None => AppError::SqlError(e.to_string()),
        }
    }
}

impl AppError {
    pub fn connection(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        AppError::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidRequest(_) | AppError::InvalidCredentials => ErrorKind::Validation,
            AppError::Connection { .. } => ErrorKind::Connection,
            AppError::NoActiveConnection => ErrorKind::Precondition,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::SqlError(_) => ErrorKind::Query,
            AppError::SqlDisabled | AppError::NotReadonly => ErrorKind::CapabilityDisabled,
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Caller-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    Connection,
    Precondition,
    NotFound,
    Query,
    CapabilityDisabled,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Precondition => "PRECONDITION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Query => "QUERY_ERROR",
            ErrorKind::CapabilityDisabled => "CAPABILITY_DISABLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    fn opaque_message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "invalid request",
            ErrorKind::Connection => "failed to connect to database",
            ErrorKind::Precondition => "no active connection; call connect first",
            ErrorKind::NotFound => "requested object was not found",
            ErrorKind::Query => "query failed",
            ErrorKind::CapabilityDisabled => "operation is not permitted",
            ErrorKind::Internal => "internal error",
        }
    }
}

/// How much of an underlying error is surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Operation context plus the underlying error text.
    #[default]
    Verbose,
    /// A fixed sentence per error kind.
    Opaque,
}

impl Verbosity {
    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.trim();
        if profile.eq_ignore_ascii_case("prod") || profile.eq_ignore_ascii_case("production") {
            Verbosity::Opaque
        } else {
            Verbosity::Verbose
        }
    }

    pub fn expose(self, context: &str, err: &AppError) -> ExposedError {
        let kind = err.kind();
        let message = match self {
            Verbosity::Verbose => format!("{context}: {err}"),
            Verbosity::Opaque => kind.opaque_message().to_string(),
        };
        ExposedError { kind, message }
    }
}

/// An error after the verbosity policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ExposedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExposedError {
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_includes_underlying_text() {
        let err = AppError::SqlError("near \"SELEC\": syntax error".into());
        let exposed = Verbosity::Verbose.expose("Error executing query", &err);
        assert_eq!(exposed.kind, ErrorKind::Query);
        assert!(exposed.message.starts_with("Error executing query: "));
        assert!(exposed.message.contains("syntax error"));
    }

    #[test]
    fn opaque_hides_underlying_text() {
        let err = AppError::connection("a@db1/sales", "password authentication failed");
        let exposed = Verbosity::Opaque.expose("Error connecting to the database", &err);
        assert_eq!(exposed.kind, ErrorKind::Connection);
        assert!(!exposed.message.contains("password"));
        assert_eq!(exposed.code(), "CONNECTION_ERROR");
    }

    #[test]
    fn profile_selects_verbosity() {
        assert_eq!(Verbosity::for_profile("prod"), Verbosity::Opaque);
        assert_eq!(Verbosity::for_profile(" Production "), Verbosity::Opaque);
        assert_eq!(Verbosity::for_profile("dev"), Verbosity::Verbose);
        assert_eq!(Verbosity::for_profile(""), Verbosity::Verbose);
    }
}
