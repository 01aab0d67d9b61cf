use clap::Parser;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::warn;

use crate::error::PicbedError;

#[derive(Debug, Clone, Parser)]
pub struct StartArgs {
    #[arg(short, long, default_value = "config.json")]
    pub config_path: String,

    #[arg(short, long, default_value = "0.0.0.0")]
    pub address: String,

    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    #[arg(short, long, default_value = "INFO")]
    pub log_level: tracing::Level,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory served as static assets.
    pub public_dir: PathBuf,

    /// Root directory holding one subdirectory per collection.
    pub upload_dir: PathBuf,

    /// Persisted collection ordering.
    pub order_file: PathBuf,

    /// Persisted forwarding rules.
    pub rules_file: PathBuf,

    /// Capacity of each in-memory request log.
    pub max_logs: usize,

    /// Upload request body cap in bytes.
    pub max_file_size: usize,

    /// MIME types accepted during upload.
    pub allowed_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            upload_dir: PathBuf::from("public/uploads"),
            order_file: PathBuf::from("public/uploads/.collections-order.json"),
            rules_file: PathBuf::from("forward-rules.json"),
            max_logs: 1000,
            max_file_size: 10 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
                "image/svg+xml".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn read(path: &str) -> Result<Self, PicbedError> {
        let config = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&config)?)
    }

    /// Missing or unreadable config files fall back to the defaults so the
    /// server always boots.
    pub fn load(path: &str) -> Self {
        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read config at {path}: {e}, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"max_logs": 5}"#).unwrap();
        assert_eq!(config.max_logs, 5);
        assert_eq!(config.upload_dir, PathBuf::from("public/uploads"));
        assert_eq!(config.allowed_types.len(), 5);
    }

    #[test]
    fn missing_file_defaults() {
        let config = Config::load("definitely/not/here.json");
        assert_eq!(config.max_logs, 1000);
    }
}
