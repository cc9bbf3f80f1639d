use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use cdnd::bootstrap::Server;
use cdnd::config::Config;
use cdnd::telemetry::init_tracing;

/// Multi-CDN routing daemon
#[derive(Parser, Debug)]
#[command(name = "cdnd", author, version, about)]
struct Args {
    /// Configuration file (YAML, JSON or TOML)
    #[arg(short, long, value_name = "FILE", env = "CDND_CONFIG")]
    config: PathBuf,

    /// Check the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_tracing(&config.telemetry)?;

    let enabled = config.enabled_providers().count();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        site = %config.site.host,
        providers = config.providers.len(),
        enabled,
        "configuration accepted"
    );

    if args.validate {
        return Ok(());
    }

    Server::new(config, args.config).run().await
}
