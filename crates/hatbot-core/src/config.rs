//! Environment configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_APP_TITLE: &str = "Talk with your documentation";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_DB_TYPE: &str = "SQLITE";

/// Paths to all HatBot data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Document index directory (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// Exported proposal documents (`data/proposal-docs/`).
    pub exports: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            exports: root.join("proposal-docs"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.vectordb)?;
        std::fs::create_dir_all(&self.exports)?;
        Ok(())
    }
}

/// Top-level HatBot configuration, read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatbotConfig {
    /// HTTP server port.
    pub port: u16,
    /// Title shown by the UI.
    pub app_title: String,
    /// YAML provider configuration file.
    pub config_file: PathBuf,
    /// Document store backing the retriever (`SQLITE` or `MEMORY`).
    pub db_type: String,
    /// End-to-end deadline for one streamed request. `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Run at most one LLM invocation at a time across the whole process.
    pub serialize_work: bool,
    /// Data directory paths.
    pub data_paths: DataPaths,
}

impl HatbotConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let app_title =
            std::env::var("APP_TITLE").unwrap_or_else(|_| DEFAULT_APP_TITLE.to_string());

        let config_file = std::env::var("CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let db_type = std::env::var("DB_TYPE")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_TYPE.to_string());

        let request_timeout = std::env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|t| t.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let serialize_work = std::env::var("SERIALIZE_WORK")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            app_title,
            config_file,
            db_type,
            request_timeout,
            serialize_work,
            data_paths,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
