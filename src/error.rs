//! Error types for plugin-loader
//!
//! This module defines all error types produced by the plugin pipeline.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! The four pipeline variants (`InvalidIdentifier`, `BuildFailed`,
//! `LoadFailed`, `InitFailed`) are terminal for a startup run: the
//! orchestrator never retries them.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for plugin-loader operations.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The identifier cannot be resolved to any build or load target.
    #[error("Unknown plugin {0}: expected <category>/<name> or a path to a loadable module")]
    InvalidIdentifier(String),

    /// Compiling a logical reference into a loadable module failed.
    #[error("Failed to build plugin {name} ({identifier}) into {}: {cause}", .output.display())]
    BuildFailed {
        identifier: String,
        name: String,
        output: PathBuf,
        cause: String,
    },

    /// Opening the module or resolving its entry point failed.
    #[error("Failed to load plugin {identifier} from {}: {cause}", .module_path.display())]
    LoadFailed {
        identifier: String,
        module_path: PathBuf,
        cause: String,
    },

    /// Invoking the entry point, running `init`, or registering failed.
    #[error("Failed to initialise plugin {name} ({identifier}) from {}: {cause}", .module_path.display())]
    InitFailed {
        identifier: String,
        name: String,
        module_path: PathBuf,
        cause: String,
    },

    /// Configuration-related errors (unreadable file, bad override, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    /// The identifier a pipeline error is attributed to, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            PluginError::InvalidIdentifier(identifier)
            | PluginError::BuildFailed { identifier, .. }
            | PluginError::LoadFailed { identifier, .. }
            | PluginError::InitFailed { identifier, .. } => Some(identifier.as_str()),
            _ => None,
        }
    }
}

/// A specialized `Result` type for plugin-loader operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Render an `anyhow` cause with its full context chain on one line.
pub(crate) fn render_cause(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_display() {
        let err = PluginError::InvalidIdentifier("badname".to_string());
        assert!(err.to_string().contains("Unknown plugin badname"));
    }

    #[test]
    fn test_build_failed_carries_context() {
        let err = PluginError::BuildFailed {
            identifier: "registry/bogus".to_string(),
            name: "bogus".to_string(),
            output: PathBuf::from("plugin/registry/bogus.so"),
            cause: "cargo exited with status 101".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to build plugin bogus"));
        assert!(msg.contains("registry/bogus"));
        assert!(msg.contains("plugin/registry/bogus.so"));
        assert!(msg.contains("status 101"));
    }

    #[test]
    fn test_load_failed_names_module_path() {
        let err = PluginError::LoadFailed {
            identifier: "/tmp/custom.so".to_string(),
            module_path: PathBuf::from("/tmp/custom.so"),
            cause: "no such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load plugin /tmp/custom.so from /tmp/custom.so: no such file"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PluginError = io_err.into();
        assert!(matches!(err, PluginError::Io(_)));
        assert!(err.identifier().is_none());
    }

    #[test]
    fn test_identifier_accessor() {
        let err = PluginError::InitFailed {
            identifier: "micro/basic_auth".to_string(),
            name: "basic_auth".to_string(),
            module_path: PathBuf::from("plugin/micro/basic_auth.so"),
            cause: "duplicate".to_string(),
        };
        assert_eq!(err.identifier(), Some("micro/basic_auth"));
    }

    #[test]
    fn test_render_cause_includes_chain() {
        let err = anyhow::anyhow!("root cause").context("outer");
        assert_eq!(render_cause(&err), "outer: root cause");
    }
}
