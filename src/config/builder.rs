//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{BackendKind, Config, ConfigFile};
use crate::error::ConfigError;

use std::path::PathBuf;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file, or from the default locations
    ///
    /// An explicitly named file must exist.
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI backend selection
    pub fn with_backend(mut self, kind: Option<BackendKind>) -> Self {
        if let Some(k) = kind {
            self.config.backend.kind = k;
        }
        self
    }

    /// Override with CLI library path
    pub fn with_library(mut self, library: Option<String>) -> Self {
        if let Some(l) = library {
            self.config.backend.library = l;
        }
        self
    }

    /// Override with CLI topology cache path
    pub fn with_topology_cache(mut self, path: Option<PathBuf>) -> Self {
        if let Some(p) = path {
            self.config.backend.topology_cache = Some(p);
        }
        self
    }

    /// Check the merged configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.config.backend.library.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "backend.library".to_string(),
                message: "library path must not be empty".to_string(),
            });
        }
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(!config.general.verbose);
        assert_eq!(config.backend.kind, BackendKind::Geopmd);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_verbose(Some(true))
            .with_backend(Some(BackendKind::Nvml))
            .with_library(Some("/opt/lib/libgeopmd.so".to_string()))
            .with_topology_cache(Some(PathBuf::from("/tmp/topo.json")))
            .build()
            .unwrap();

        assert!(config.general.verbose);
        assert_eq!(config.backend.kind, BackendKind::Nvml);
        assert_eq!(config.backend.library, "/opt/lib/libgeopmd.so");
        assert_eq!(config.backend.topology_cache, Some(PathBuf::from("/tmp/topo.json")));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nkind = \"nvml\"\nlibrary = \"libother.so\"").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = ConfigBuilder::new()
            .with_file(Some(&path))
            .unwrap()
            .with_backend(Some(BackendKind::Geopmd))
            .with_library(None)
            .build()
            .unwrap();

        assert_eq!(config.backend.kind, BackendKind::Geopmd);
        assert_eq!(config.backend.library, "libother.so");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigBuilder::new().with_file(Some("/nonexistent/platio.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_empty_library_is_rejected() {
        let result = ConfigBuilder::new().with_library(Some(" ".to_string())).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
