use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Runtime settings for the import pipeline. Every field has a default, so an
/// empty TOML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InflowConfig {
    /// Uploads larger than this are rejected before parsing.
    pub max_upload_bytes: usize,
    /// Where staged previews and raw uploads are kept.
    pub staging_dir: PathBuf,
    /// Staged entries older than this are removed by the retention sweep.
    pub retention_hours: u64,
    pub sweep_interval_secs: u64,
    pub database_path: PathBuf,
}

impl Default for InflowConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            staging_dir: tmp.join("inflow-uploads"),
            retention_hours: 24,
            sweep_interval_secs: 3600,
            database_path: tmp.join("inflow.db"),
        }
    }
}

impl InflowConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: InflowConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Rebase the default staging and database paths under `data_dir`.
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.staging_dir = data_dir.join("uploads");
        self.database_path = data_dir.join("inflow.db");
        self
    }

    pub fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be positive".into()));
        }
        if self.retention_hours.checked_mul(3600).is_none() {
            return Err(ConfigError::Invalid("retention_hours is too large".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
