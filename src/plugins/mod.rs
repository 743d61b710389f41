//! Plugin pipeline for plugin-loader
//!
//! This module turns plugin identifiers supplied at startup into
//! initialised extensions of the host. Each identifier is either a direct
//! path to a compiled module or a logical `<category>/<name>` reference
//! that is compiled on demand.
//!
//! # Architecture
//!
//! - **identifier**: splits and classifies raw identifiers
//! - **synthesizer**: maps logical references to output paths, building on demand
//! - **cache**: decides whether an existing artifact can be reused
//! - **builder**: the build contract and the cargo-driven implementation
//! - **loader**: opens modules and resolves entry points
//! - **initializer**: invokes entry points and registers instances
//! - **registry**: the host-owned table of initialised plugins
//! - **orchestrator**: runs the whole pipeline over an identifier list
//!
//! # Identifier forms
//!
//! ```text
//! broker/rabbitmq          -> plugin/broker/rabbitmq.so, symbol NewBroker
//! registry/etcd            -> plugin/registry/etcd.so,   symbol NewRegistry
//! micro/basic_auth         -> plugin/micro/basic_auth.so, symbol NewPlugin
//! /path/to/plugin.so       -> loaded as-is,              symbol NewPlugin
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use plugin_loader::plugins::{CargoBuilder, DylibLoader, PluginLoader, PluginRegistry};
//! use plugin_loader::LoaderConfig;
//!
//! let config = LoaderConfig::default();
//! let builder = CargoBuilder::new("cargo", &config.host_crate, config.build_dir(), true);
//! let loader = PluginLoader::new(&config, builder, DylibLoader::new());
//!
//! let mut registry = PluginRegistry::new();
//! loader.load_all(&["broker/rabbitmq", "micro/basic_auth"], &mut registry).unwrap();
//! println!("Loaded {} plugins", registry.len());
//! ```

pub mod builder;
pub mod cache;
pub mod identifier;
pub mod initializer;
pub mod loader;
pub mod orchestrator;
pub mod registry;
pub mod synthesizer;
pub mod types;

pub use builder::{Builder, CargoBuilder};
pub use identifier::{IdentifierKind, ParsedIdentifier};
pub use loader::{DylibLoader, ModuleLoader};
pub use orchestrator::{LoadReport, LoadedPlugin, PluginLoader, Stage};
pub use registry::{PluginRegistry, PluginSummary, RegisteredPlugin, RegistrationError};
pub use synthesizer::{BuildOutcome, ModulePlan, ModuleSynthesizer, ResolvedModule};
pub use types::{
    EntryPoint, Plugin, PluginCategory, PluginEntryFn, PluginSpec, DEFAULT_ENTRY_SYMBOL,
    MODULE_EXTENSION, PLUGIN_ABI_VERSION,
};
