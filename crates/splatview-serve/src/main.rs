//! Splatview server - Main entry point
//!
//! Serves the viewer bundle, its config, the catalogs and the scene file
//! from one directory, over HTTPS when configured.

mod check;
mod config;
mod server;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "splatview")]
#[command(about = "Static server for the splat scene viewer")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "splatview.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory to serve
    #[arg(short, long)]
    site: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Check the site's catalogs and scene, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = args.log_level.parse::<Level>().unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Splatview v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(site) = args.site {
        config.server.site = site;
    }

    info!(site = %config.server.site.display(), "Configuration loaded");

    let report = check::check_site(&config.server.site);
    report.log();

    if args.check {
        if !report.is_clean() {
            anyhow::bail!("Site check found problems");
        }
        println!("Site {} is ready to serve", config.server.site.display());
        return Ok(());
    }

    server::run(
        &config.server.site,
        &config.server.bind,
        config.server.tls.as_ref(),
    )
    .await
}
