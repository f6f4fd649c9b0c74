//! Configuration file resolution and loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`~/.config/alfri/<module>.toml`)
//! 4. System config file (`/etc/alfri/<module>.toml`, Linux only)
//!
//! When nothing is found the caller runs on compiled defaults. A missing or
//! malformed file never stops startup; it is logged and skipped.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a resolved config file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfig,
    SystemConfig,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::CommandLine => "command line",
            ConfigSource::Environment => "environment",
            ConfigSource::UserConfig => "user config",
            ConfigSource::SystemConfig => "system config",
        }
    }
}

/// Resolves the TOML config file for one service module
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    module_name: String,
    env_var_name: String,
}

impl ConfigFileResolver {
    /// Create a resolver for `module_name`, e.g. "alfri-ml"
    ///
    /// The environment variable is derived from the module name:
    /// "alfri-ml" → `ALFRI_ML_CONFIG`.
    pub fn new(module_name: &str) -> Self {
        let env_var_name = format!(
            "{}_CONFIG",
            module_name.to_uppercase().replace('-', "_")
        );
        Self {
            module_name: module_name.to_string(),
            env_var_name,
        }
    }

    pub fn env_var_name(&self) -> &str {
        &self.env_var_name
    }

    /// Resolve the config file path, honoring the priority order
    ///
    /// Explicit sources (CLI, environment) are returned even if the file does
    /// not exist so that the loader can report it; implicit locations are only
    /// returned when present on disk.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        if let Some(path) = cli_arg {
            return Some((path.to_path_buf(), ConfigSource::CommandLine));
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        if let Some(path) = self.user_config_path() {
            if path.exists() {
                return Some((path, ConfigSource::UserConfig));
            }
        }

        let system = self.system_config_path();
        if cfg!(target_os = "linux") && system.exists() {
            return Some((system, ConfigSource::SystemConfig));
        }

        None
    }

    fn file_name(&self) -> String {
        format!("{}.toml", self.module_name)
    }

    /// `~/.config/alfri/<module>.toml` (platform config dir)
    pub fn user_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("alfri").join(self.file_name()))
    }

    /// `/etc/alfri/<module>.toml`
    pub fn system_config_path(&self) -> PathBuf {
        PathBuf::from("/etc/alfri").join(self.file_name())
    }
}

/// Parse a TOML config file
pub fn read_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load a config file with graceful degradation
///
/// Returns `T::default()` when no file was resolved, or when the file cannot
/// be read or parsed (with a warning).
pub fn load_toml_or_default<T>(resolved: Option<(PathBuf, ConfigSource)>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some((path, source)) = resolved else {
        info!("No config file found, using compiled defaults");
        return T::default();
    };

    match read_toml_config(&path) {
        Ok(config) => {
            info!(
                "Loaded config from {} ({})",
                path.display(),
                source.as_str()
            );
            config
        }
        Err(e) => {
            warn!("{}; using compiled defaults", e);
            T::default()
        }
    }
}

/// Parse a JSON document held in an environment variable
///
/// Unset or empty variables yield `Ok(None)`; invalid JSON is a configuration
/// error.
pub fn parse_json_env<T: DeserializeOwned>(var_name: &str) -> Result<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) if !value.trim().is_empty() => serde_json::from_str(&value)
            .map(Some)
            .map_err(|e| {
                Error::Config(format!(
                    "Environment variable {} contains invalid JSON: {}",
                    var_name, e
                ))
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name_derivation() {
        let resolver = ConfigFileResolver::new("alfri-ml");
        assert_eq!(resolver.env_var_name(), "ALFRI_ML_CONFIG");
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolver = ConfigFileResolver::new("alfri-test-cli");
        let (path, source) = resolver
            .resolve(Some(Path::new("/tmp/explicit.toml")))
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.toml"));
        assert_eq!(source, ConfigSource::CommandLine);
    }

    #[test]
    fn test_system_config_path() {
        let resolver = ConfigFileResolver::new("alfri-ml");
        assert_eq!(
            resolver.system_config_path(),
            PathBuf::from("/etc/alfri/alfri-ml.toml")
        );
    }
}
