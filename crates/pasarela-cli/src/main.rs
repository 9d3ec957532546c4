mod cli;
mod commands;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let mut config = match pasarela_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pasarela: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = args.url.clone() {
        config.relay.url = Some(url);
    }

    // RUST_LOG wins, then --log-level, then the config file.
    let log_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.as_directive().to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::try_new(&log_directive).unwrap_or_else(|_| EnvFilter::new("info"))
            }),
        )
        .init();

    tracing::debug!("pasarela v{} starting", env!("CARGO_PKG_VERSION"));

    match commands::run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("pasarela: {e}");
            ExitCode::FAILURE
        }
    }
}
