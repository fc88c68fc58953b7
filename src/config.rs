//! Run configuration.
//!
//! Read from `vkdispatch.toml` in the working directory when present.
//! Every key is optional:
//!
//! ```toml
//! # SPIR-V binary with a `main` compute entry point (default: kernel.spv)
//! shader_path = "kernel.spv"
//!
//! # Work-group count X and the kernel's local_size_x (default: 8)
//! local_size = 8
//!
//! # Storage buffer contents before dispatch: "index", "zero" or "none"
//! fill = "index"
//!
//! # off | error | warn | info | debug | trace (default: info)
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use vkdispatch_vulkan::{DispatchParams, InitialContents};

pub const DEFAULT_CONFIG_FILE: &str = "vkdispatch.toml";

/// Host initialization of the storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    /// `values[i] = i`
    #[default]
    Index,
    Zero,
    /// Whatever the allocation held.
    #[serde(rename = "none")]
    Uninitialized,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub shader_path: PathBuf,
    pub local_size: u32,
    pub fill: Fill,
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            shader_path: PathBuf::from("kernel.spv"),
            local_size: 8,
            fill: Fill::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(path, &contents)
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_size == 0 {
            return Err(ConfigError::Invalid("local_size must be at least 1".to_string()));
        }
        self.dispatch_params()
            .buffer_size()
            .map_err(|e| ConfigError::Invalid(format!("local_size {}: {}", self.local_size, e)))?;
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log_level {:?}", self.log_level)))
    }

    pub fn dispatch_params(&self) -> DispatchParams {
        let initial = match self.fill {
            Fill::Index => InitialContents::Index,
            Fill::Zero => InitialContents::Zeroed,
            Fill::Uninitialized => InitialContents::Uninitialized,
        };
        DispatchParams::new(self.local_size).with_initial(initial)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
