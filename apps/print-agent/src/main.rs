//! wsprint agent entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Prints images pushed over a local WebSocket.
#[derive(Parser, Debug)]
#[command(name = "wsprint-agent", version, about)]
struct Cli {
    /// Configuration file (defaults to the per-user config path).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface to bind, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file (0 = auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Answer every well-formed message, including rejected ones.
    #[arg(long)]
    verbose_replies: bool,

    /// Log print jobs instead of sending them to a printer.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting wsprint agent"
    );

    // Load configuration.
    let mut config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.verbose_replies {
        config.reply_policy = wsprint_server::ReplyPolicy::Verbose;
    }
    if cli.dry_run {
        config.printer = config::PrinterBackend::Log;
    }
    tracing::info!(
        host = %config.host,
        port = config.port,
        printer = ?config.printer,
        replies = ?config.reply_policy,
        "configuration loaded"
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}
