use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chat::DEFAULT_DATE_FORMAT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name; a random one is picked when unset.
    pub nickname: Option<String>,
    pub collection: String,
    /// Where the message store is persisted. Defaults under the data dir.
    pub store_path: Option<PathBuf>,
    /// Keep messages only for this run.
    pub ephemeral: bool,
    pub date_format: String,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub tick_rate_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nickname: None,
            collection: "messages".to_string(),
            store_path: None,
            ephemeral: false,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            log_file: None,
            log_level: "info".to_string(),
            tick_rate_ms: 250,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("livechat").join("config.toml"))
    }

    /// Read `path`, or the default location when `None`. A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            data_dir().join(format!("{}.json", self.collection))
        })
    }

    pub fn resolved_log_file(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("livechat")
                .join("livechat.log")
        })
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("livechat")
}
