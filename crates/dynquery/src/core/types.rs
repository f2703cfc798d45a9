use std::fmt;

use serde::{Deserialize, Serialize};

/// Driver hint carried by a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection request supplied by a caller at runtime.
///
/// Missing fields deserialize as empty strings so that structural validation,
/// not the transport, decides whether the request is complete.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub dialect: Dialect,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        database_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            database_name: database_name.into(),
            username: username.into(),
            password: password.into(),
            dialect: Dialect::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Identity of a logical connection target: host, database and user, never the password.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(creds: &Credentials) -> Self {
        Fingerprint(format!(
            "{}@{}/{}",
            creds.username.trim(),
            creds.host.trim().to_ascii_lowercase(),
            creds.database_name.trim()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as reported by the catalog; may be empty for untyped SQLite columns.
    pub data_type: String,
    pub nullable: bool,
    /// 1-based.
    pub position: u32,
}

/// Column name to value, in result column order.
pub type DbRow = serde_json::Map<String, serde_json::Value>;

pub type QueryResult = Vec<DbRow>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub table: String,
    #[serde(default)]
    pub page: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub table_name: String,
    pub rows: Vec<DbRow>,
    pub columns: Vec<ColumnDescriptor>,
    pub total_rows: u64,
    pub current_page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Connected {
    pub database_name: String,
    pub fingerprint: Fingerprint,
    pub message: String,
}
