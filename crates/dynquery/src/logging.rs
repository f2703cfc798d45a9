use tracing_subscriber::EnvFilter;

use crate::error::Verbosity;

pub fn init(log_level: Option<&str>, verbosity: Verbosity) {
    // Prefer RUST_LOG, then explicit --log-level, then the profile default.
    let fallback = log_level.unwrap_or(match verbosity {
        Verbosity::Opaque => "warn",
        Verbosity::Verbose => "info",
    });
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
