//! # Parley Server
//!
//! Multi-client IRC-style chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on port 6667 with connection password "hunter2"
//! parley 6667 hunter2
//!
//! # Run with a custom config
//! parley 6667 hunter2 --config /path/to/parley.toml
//!
//! # Override the bind address
//! PARLEY_HOST=127.0.0.1 parley 6667 hunter2
//! ```

use anyhow::Result;
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use parley_server::{config, handlers, metrics};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Multi-client IRC-style chat server")]
struct Cli {
    /// Port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    port: u16,

    /// Connection password clients must send with PASS.
    #[arg(value_parser = NonEmptyStringValueParser::new())]
    password: String,

    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = config::Config::load(cli.config.as_deref())?;
    config.port = cli.port;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            flag.store(true, Ordering::Relaxed);
        }
    });

    // Start the server
    handlers::run_server(config, cli.password, shutdown).await?;

    Ok(())
}
