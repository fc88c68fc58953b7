use std::path::PathBuf;

use vkdispatch_vulkan::VulkanError;

use crate::config::ConfigError;

pub const BACKEND_SYSTEM_ERROR: &str = "backend system error";
pub const RUNTIME_ERROR: &str = "runtime error";
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Top-level error of a vkdispatch run.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error("cannot open shader binary {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid shader binary {path}: {source}")]
    InvalidShaderBinary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl AppError {
    /// Category printed before the message when a run fails.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Vulkan(e) if e.is_backend() => BACKEND_SYSTEM_ERROR,
            _ => RUNTIME_ERROR,
        }
    }
}
