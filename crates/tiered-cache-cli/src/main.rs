//! tcache - command-line access to tiered-cache namespaces
//!
//! Reads and writes entries in a named cache manager's namespace under the
//! configured cache root (`CACHE_DIR`, or `--dir`).

mod args;
mod commands;
mod error;

use crate::args::Cli;
use crate::commands::Output;
use crate::error::Result;
use clap::Parser;
use tiered_cache::{CacheConfig, CacheRegistry};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("tiered_cache=warn".parse()?)
        .add_directive("tcache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env();
    if let Some(dir) = cli.dir {
        config.root_dir = dir;
    }
    debug!("Cache root: {:?}", config.root_dir);

    let registry = CacheRegistry::new(config);
    let cache = registry.instance(&cli.name)?;

    match commands::run(cli.command, &cache).await? {
        Output::Bytes(bytes) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
        Output::Text(text) => println!("{}", text),
        Output::Nothing => {}
    }

    Ok(())
}
