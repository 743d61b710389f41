//! Loader configuration for plugin-loader
//!
//! Configuration is layered: built-in defaults, then an optional JSON file
//! (`~/.config/plugin-loader/config.json` unless a path is given), then
//! `PLUGIN_LOADER_*` environment variables. Command-line flags are applied
//! on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PluginError, Result};

/// Comma-separated identifier list, e.g. `broker/rabbitmq,registry/etcd`.
pub const ENV_PLUGINS: &str = "PLUGIN_LOADER_PLUGINS";
pub const ENV_OUTPUT_DIR: &str = "PLUGIN_LOADER_OUTPUT_DIR";
pub const ENV_SOURCE_ROOT: &str = "PLUGIN_LOADER_SOURCE_ROOT";
pub const ENV_CARGO: &str = "PLUGIN_LOADER_CARGO";

/// Settings for resolving and building plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Identifiers to load at startup, in order.
    pub plugins: Vec<String>,

    /// Directory compiled modules are written to and reused from.
    pub output_dir: PathBuf,

    /// Root of the plugin source tree logical references resolve under.
    pub source_root: PathBuf,

    /// Path of this crate, depended on by generated shim crates.
    pub host_crate: PathBuf,

    /// Scratch directory for shim crates. Defaults to `<output_dir>/.build`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,

    /// Cargo binary used to build plugins.
    pub cargo: String,

    /// Build plugins with `--release`.
    pub release: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            output_dir: PathBuf::from("plugin"),
            source_root: PathBuf::from("plugins-src"),
            host_crate: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            build_dir: None,
            cargo: "cargo".to_string(),
            release: true,
        }
    }
}

impl LoaderConfig {
    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("plugin-loader").join("config.json"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. The default location is optional and
    /// falls back to built-in defaults when absent. Environment overrides
    /// are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PluginError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: LoaderConfig = serde_json::from_str(&content)?;
        debug!(path = %path.display(), plugins = config.plugins.len(), "Loaded config file");
        Ok(config)
    }

    /// Apply `PLUGIN_LOADER_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(plugins) = lookup(ENV_PLUGINS) {
            self.plugins = split_plugin_list(&plugins);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(root) = lookup(ENV_SOURCE_ROOT).filter(|v| !v.trim().is_empty()) {
            self.source_root = PathBuf::from(root);
        }
        if let Some(cargo) = lookup(ENV_CARGO).filter(|v| !v.trim().is_empty()) {
            self.cargo = cargo;
        }
    }

    /// Effective shim build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.build_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".build"))
    }
}

/// Split a comma-separated identifier list.
///
/// Entries are kept as written, including blanks; the loader trims and
/// skips empty identifiers itself.
pub fn split_plugin_list(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }
    list.split(',').map(str::to_string).collect()
}
