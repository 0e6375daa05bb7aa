//! CLI argument definitions for the `docent` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use docent_core::config::DocentConfig;

/// Docent - index documents and ask questions answered from them.
#[derive(Parser, Debug)]
#[command(name = "docent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the chunk database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Chunk, embed and store a text file under a document id.
    Index { document_id: String, file: PathBuf },
    /// Replace a document's chunks with those of a text file.
    Reindex { document_id: String, file: PathBuf },
    /// Delete every chunk of a document.
    Delete { document_id: String },
    /// List the stored chunks of a document.
    Chunks { document_id: String },
    /// Ask a question and print the JSON response.
    Query {
        text: String,
        /// Maximum number of chunks to retrieve.
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<i64>,
        /// Minimum cosine similarity of retrieved chunks.
        #[arg(short = 't', long = "threshold")]
        threshold: Option<f64>,
    },
    /// Show configured backends and the stored chunk count.
    Status,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOCENT_CONFIG env var > ~/.docent/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOCENT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value > "info".
    pub fn resolve_log_level(&self, config_file: &Path) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        DocentConfig::load(config_file)
            .map(|c| c.general.log_level)
            .unwrap_or_else(|_| "info".to_string())
    }

    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut DocentConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".docent").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_with_options() {
        let args =
            CliArgs::try_parse_from(["docent", "query", "where is the valve?", "-k", "3", "--threshold", "0.5"])
                .unwrap();
        assert_eq!(
            args.command,
            Command::Query {
                text: "where is the valve?".to_string(),
                top_k: Some(3),
                threshold: Some(0.5),
            }
        );
    }

    #[test]
    fn test_parse_index() {
        let args = CliArgs::try_parse_from(["docent", "index", "manual", "manual.txt"]).unwrap();
        assert_eq!(
            args.command,
            Command::Index {
                document_id: "manual".to_string(),
                file: PathBuf::from("manual.txt"),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["docent", "status", "--config", "/tmp/docent.toml"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/docent.toml"));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(CliArgs::try_parse_from(["docent"]).is_err());
    }

    #[test]
    fn test_log_level_priority() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "[general]\nlog_level = \"warn\"\n").unwrap();

        let plain = CliArgs::try_parse_from(["docent", "status"]).unwrap();
        assert_eq!(plain.resolve_log_level(&config_file), "warn");
        assert_eq!(plain.resolve_log_level(&dir.path().join("missing.toml")), "info");

        let flagged = CliArgs::try_parse_from(["docent", "-l", "trace", "status"]).unwrap();
        assert_eq!(flagged.resolve_log_level(&config_file), "trace");
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let args =
            CliArgs::try_parse_from(["docent", "-d", "/srv/docent", "-l", "debug", "status"]).unwrap();
        let mut config = DocentConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, "/srv/docent");
        assert_eq!(config.general.log_level, "debug");
    }
}
