use std::time::Duration;

use clap::Parser;

use crate::{
    core::{
        driver::DriverSet, executor::SqlAccess, orchestrator::OrchestratorConfig,
        postgres::PostgresDriver, sqlite::SqliteDriver,
    },
    error::Verbosity,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "dynquery")]
pub struct Args {
    /// Logging level (stderr). Also supports RUST_LOG. Defaults to warn in prod, info otherwise.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Deployment profile; "prod" or "production" hides underlying error text from callers.
    #[arg(long, env = "DYNQUERY_PROFILE", default_value = "dev")]
    pub profile: String,

    /// Free-form SQL policy: unrestricted, read-only or disabled.
    /// Unrestricted grants callers every privilege of the credentials they connect with.
    #[arg(long, default_value_t = SqlAccess::Unrestricted)]
    pub sql_access: SqlAccess,

    /// Upper bound on rows per page.
    #[arg(long, default_value_t = 1000)]
    pub max_page_size: u64,

    /// SQLite busy timeout.
    #[arg(long, default_value_t = 2_000)]
    pub busy_timeout_ms: u64,

    /// Connections per PostgreSQL pool.
    #[arg(long, default_value_t = 4)]
    pub pg_pool_size: usize,

    /// PostgreSQL connect and pool wait timeout.
    #[arg(long, default_value_t = 5_000)]
    pub connect_timeout_ms: u64,
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::for_profile(&self.profile)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            verbosity: self.verbosity(),
            sql_access: self.sql_access,
            max_page_size: self.max_page_size,
        }
    }

    pub fn drivers(&self) -> DriverSet {
        DriverSet::new()
            .with(
                PostgresDriver::new(self.pg_pool_size)
                    .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms)),
            )
            .with(SqliteDriver::new(self.busy_timeout_ms))
    }
}
