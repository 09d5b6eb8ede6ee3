//! walvault-daemon - WAL archiving daemon
//!
//! This binary serves archive-command and restore-command requests from the
//! database over a Unix-domain socket.

mod protocol;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use walvault_common::Config;

use service::Daemon;

#[derive(Parser, Debug)]
#[command(name = "walvault-daemon")]
#[command(about = "walvault WAL archiving daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/walvault/walvault.toml")]
    config: PathBuf,

    /// Listen socket path, overriding the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&args.log_level)?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("read config file {:?}", args.config))?;
    let mut config = Config::from_toml(&text)
        .with_context(|| format!("parse config file {:?}", args.config))?;
    if let Some(socket) = args.socket {
        config.daemon_socket_path = socket;
    }

    Daemon::new(config).run().await
}
