use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use train_mirror::cli::{default_log_level, run, Cli};
use train_mirror::load_config::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // A broken config file is reported by `run`; here it only feeds verbosity.
    let file_verbose = cli
        .config
        .as_deref()
        .and_then(|path| load_config(path).ok())
        .and_then(|config| config.verbose)
        .unwrap_or(false);

    // RUST_LOG wins over -v and the config file.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(cli.verbose, file_verbose)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
