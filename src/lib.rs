//! plugin-loader - resolve, build, load and initialise host plugins

pub mod config;
pub mod error;
pub mod plugins;

pub use config::LoaderConfig;
pub use error::{PluginError, Result};
