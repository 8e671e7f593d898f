//! Runtime configuration

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::core::MetadataFlags;
use crate::{Error, Result};

/// Environment variables `VISTLE_INSITU__<KEY>` override file settings.
pub const ENV_PREFIX: &str = "VISTLE_INSITU";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log_level: String,
    /// In-process ranks started by the demo driver.
    pub ranks: usize,
    /// Blocks of the demo mesh, dealt round-robin over the ranks.
    pub blocks: usize,
    pub decomp_file: Option<PathBuf>,
    pub metadata: MetadataFlags,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ranks: 4,
            blocks: 8,
            decomp_file: None,
            metadata: MetadataFlags::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults, then the TOML file at `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let loaded: RuntimeConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        if self.ranks == 0 {
            return Err(Error::Config(ConfigError::Message("ranks must be at least 1".to_string())));
        }
        self.level().map(|_| ())
    }

    pub fn level(&self) -> Result<tracing::Level> {
        self.log_level.parse().map_err(|_| {
            Error::Config(ConfigError::Message(format!("unknown log level `{}`", self.log_level)))
        })
    }
}
