use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tiered_cache::DEFAULT_MANAGER_NAME;

/// Inspect and modify tiered-cache namespaces
#[derive(Debug, Parser)]
#[command(name = "tcache", version)]
pub struct Cli {
    /// Cache manager (namespace) name
    #[arg(long, short, global = true, default_value = DEFAULT_MANAGER_NAME)]
    pub name: String,

    /// Cache root directory (overrides CACHE_DIR)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a payload from --data, --file, or stdin
    Put {
        key: String,
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Seconds until the entry stops being current
        #[arg(long)]
        expires_in: Option<i64>,
        /// Identifying attribute (version or etag) to record
        #[arg(long)]
        attribute: Option<String>,
    },
    /// Print a payload to stdout or write it to --output
    Get {
        key: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print whether an entry is current
    Current {
        key: String,
        /// Expected identifying attribute
        #[arg(long)]
        attribute: Option<String>,
    },
    /// Remove an entry
    Delete { key: String },
    /// Print the path of an entry's payload file
    Location { key: String },
    /// Remove every entry in the namespace
    Clear {
        #[arg(long)]
        memory_only: bool,
    },
    /// Remove files left by interrupted writes
    Sweep,
    /// Print cache statistics as JSON
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_default_namespace() {
        let cli = Cli::try_parse_from(["tcache", "get", "avatar"]).unwrap();
        assert_eq!(cli.name, "default");
        assert!(cli.dir.is_none());
        assert!(matches!(cli.command, Command::Get { ref key, output: None } if key == "avatar"));
    }

    #[test]
    fn test_put_options() {
        let cli = Cli::try_parse_from([
            "tcache",
            "put",
            "doc",
            "--data",
            "hello",
            "--expires-in",
            "60",
            "--attribute",
            "v1",
            "--name",
            "docs",
        ])
        .unwrap();

        assert_eq!(cli.name, "docs");
        match cli.command {
            Command::Put {
                key,
                data,
                file,
                expires_in,
                attribute,
            } => {
                assert_eq!(key, "doc");
                assert_eq!(data.as_deref(), Some("hello"));
                assert!(file.is_none());
                assert_eq!(expires_in, Some(60));
                assert_eq!(attribute.as_deref(), Some("v1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_put_data_and_file_conflict() {
        let result =
            Cli::try_parse_from(["tcache", "put", "k", "--data", "x", "--file", "/tmp/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_clear_memory_only() {
        let cli = Cli::try_parse_from(["tcache", "clear", "--memory-only"]).unwrap();
        assert!(matches!(cli.command, Command::Clear { memory_only: true }));
    }
}
