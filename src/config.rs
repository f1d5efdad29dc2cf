use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "TAGSIFT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root that image `location` values are relative to
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub hashing: HashingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    #[serde(default = "default_page_stride")]
    pub page_stride: u64,

    /// Seconds the total image count is reused before re-counting
    #[serde(default = "default_count_cache_secs")]
    pub count_cache_secs: u64,
}

fn default_page_stride() -> u64 {
    30
}

fn default_count_cache_secs() -> u64 {
    3600
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_stride: default_page_stride(),
            count_cache_secs: default_count_cache_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HashingConfig {
    /// Worker threads for perceptual hashing (0 = one per core)
    #[serde(default)]
    pub threads: usize,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagsift")
        .join("tagsift.db")
}

fn default_image_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagsift")
        .join("images")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            image_dir: default_image_dir(),
            search: SearchConfig::default(),
            hashing: HashingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagsift")
            .join("config.toml")
    }
}
