use clap::Parser;

use dynquery::{adapters, cli::Args, error::AppResult, logging};

fn main() -> AppResult<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref(), args.verbosity());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| dynquery::error::AppError::Internal(e.to_string()))?;
    rt.block_on(adapters::bridge::run(args))
}
