//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::backend::DEFAULT_LIBRARY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// File name of the topology cache
const CACHE_FILE: &str = "topo-cache.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Platform backend settings
    pub backend: BackendConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
}

impl GeneralConfig {
    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

/// Which platform backend serves signals and controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Platform service library (libgeopmd)
    #[default]
    Geopmd,
    /// NVIDIA GPUs through NVML
    Nvml,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Geopmd => write!(f, "geopmd"),
            BackendKind::Nvml => write!(f, "nvml"),
        }
    }
}

/// Platform backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend to open
    pub kind: BackendKind,
    /// Shared library loaded by the geopmd backend
    pub library: String,
    /// Topology cache file used by the nvml backend
    pub topology_cache: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            library: DEFAULT_LIBRARY.to_string(),
            topology_cache: None,
        }
    }
}

impl BackendConfig {
    /// Configured cache path, or the per-user cache directory
    pub fn cache_path(&self) -> PathBuf {
        if let Some(path) = &self.topology_cache {
            return path.clone();
        }
        match dirs::cache_dir() {
            Some(dir) => dir.join("platio").join(CACHE_FILE),
            None => std::env::temp_dir().join(format!("platio-{}", CACHE_FILE)),
        }
    }
}
