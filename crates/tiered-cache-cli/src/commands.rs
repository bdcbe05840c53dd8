use crate::args::Command;
use crate::error::{CliError, Result};
use chrono::{Duration, Utc};
use tiered_cache::{CacheManager, StoreOptions};
use tokio::io::AsyncReadExt;
use tracing::info;

/// What a command produced for stdout
#[derive(Debug, PartialEq, Eq)]
pub enum Output {
    Bytes(Vec<u8>),
    Text(String),
    Nothing,
}

pub async fn run(command: Command, cache: &CacheManager) -> Result<Output> {
    match command {
        Command::Put {
            key,
            data,
            file,
            expires_in,
            attribute,
        } => {
            let mut options = StoreOptions::default();
            if let Some(secs) = expires_in {
                let expires_at = Duration::try_seconds(secs)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .ok_or_else(|| CliError::Config(format!("expiry out of range: {}", secs)))?;
                options = options.expires_at(expires_at);
            }
            if let Some(attribute) = attribute {
                options = options.identifying_attribute(attribute);
            }

            match (data, file) {
                (_, Some(path)) => cache.import_file(&key, &path, options).await?,
                (Some(data), None) => cache.store(&key, Some(data.as_bytes()), options).await?,
                (None, None) => {
                    let mut payload = Vec::new();
                    tokio::io::stdin().read_to_end(&mut payload).await?;
                    cache.store(&key, Some(&payload), options).await?;
                }
            }
            info!(namespace = %cache.name(), key = %key, "Stored");
            Ok(Output::Nothing)
        }
        Command::Get { key, output } => {
            let payload = cache
                .fetch(&key)
                .await?
                .ok_or_else(|| CliError::Miss(key.clone()))?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &payload).await?;
                    Ok(Output::Nothing)
                }
                None => Ok(Output::Bytes(payload)),
            }
        }
        Command::Current { key, attribute } => {
            let current = cache.is_current(&key, attribute.as_deref()).await?;
            Ok(Output::Text(current.to_string()))
        }
        Command::Delete { key } => {
            cache.delete(&key).await?;
            Ok(Output::Nothing)
        }
        Command::Location { key } => {
            let path = cache
                .location(&key)
                .await?
                .ok_or_else(|| CliError::Miss(key.clone()))?;
            Ok(Output::Text(path.display().to_string()))
        }
        Command::Clear { memory_only } => {
            if memory_only {
                cache.clear_memory();
            } else {
                cache.clear_all().await?;
            }
            Ok(Output::Nothing)
        }
        Command::Sweep => {
            let removed = cache.sweep().await?;
            Ok(Output::Text(format!("removed {} file(s)", removed)))
        }
        Command::Stats => {
            let stats = cache.stats().await;
            Ok(Output::Text(serde_json::to_string_pretty(&stats)?))
        }
    }
}
