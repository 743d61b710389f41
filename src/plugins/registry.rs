//! Plugin registry for plugin-loader
//!
//! This module provides the `PluginRegistry` struct holding every
//! initialised plugin instance for the life of the host. The registry is
//! an ordinary value the host owns and passes into the loader, so tests
//! can assert exact contents without touching process-wide state.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::types::{Plugin, PluginCategory};

/// Reasons the registry refuses an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("a plugin named '{name}' is already registered (from {existing})")]
    DuplicateName { name: String, existing: String },

    #[error("plugin reported an empty name")]
    EmptyName,
}

/// An initialised plugin together with where it came from.
pub struct RegisteredPlugin {
    identifier: String,
    module_path: PathBuf,
    category: Option<PluginCategory>,
    registered_at: DateTime<Utc>,
    instance: Box<dyn Plugin>,
}

impl RegisteredPlugin {
    /// Wrap an instance produced from `identifier`.
    ///
    /// `category` is `None` for direct module paths.
    pub fn new(
        identifier: impl Into<String>,
        module_path: impl Into<PathBuf>,
        category: Option<PluginCategory>,
        instance: Box<dyn Plugin>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            module_path: module_path.into(),
            category,
            registered_at: Utc::now(),
            instance,
        }
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn category(&self) -> Option<&PluginCategory> {
        self.category.as_ref()
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn instance(&self) -> &dyn Plugin {
        self.instance.as_ref()
    }

    /// Serializable view for listings.
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name().to_string(),
            description: self.instance.description().to_string(),
            identifier: self.identifier.clone(),
            module_path: self.module_path.clone(),
            category: self.category.as_ref().map(|c| c.as_str().to_string()),
            registered_at: self.registered_at,
        }
    }
}

impl fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name())
            .field("identifier", &self.identifier)
            .field("module_path", &self.module_path)
            .field("category", &self.category)
            .finish()
    }
}

/// Flat description of a registered plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub description: String,
    pub identifier: String,
    pub module_path: PathBuf,
    pub category: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Initialised plugins keyed by name, in registration order.
///
/// There is no removal: once registered, a plugin stays for the rest of the
/// process. The registry does no locking of its own; `register` takes
/// `&mut self`, so sharing one across threads needs an outer lock.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    by_name: HashMap<String, usize>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an initialised plugin.
    ///
    /// # Errors
    /// `RegistrationError::DuplicateName` if a plugin with the same name is
    /// already present; the registry is unchanged in that case.
    pub fn register(&mut self, plugin: RegisteredPlugin) -> Result<(), RegistrationError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if let Some(&index) = self.by_name.get(&name) {
            return Err(RegistrationError::DuplicateName {
                name,
                existing: self.plugins[index].identifier.clone(),
            });
        }

        info!(
            plugin = %name,
            identifier = %plugin.identifier,
            module = %plugin.module_path.display(),
            "Registered plugin"
        );

        self.by_name.insert(name, self.plugins.len());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Get a plugin by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.by_name.get(name).map(|&index| &self.plugins[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Plugins in the order they were registered.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter()
    }

    /// Plugins of one category, in registration order.
    pub fn by_category<'a>(
        &'a self,
        category: &'a PluginCategory,
    ) -> impl Iterator<Item = &'a RegisteredPlugin> + 'a {
        self.plugins
            .iter()
            .filter(move |p| p.category.as_ref() == Some(category))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(RegisteredPlugin::name).collect()
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.plugins.iter().map(RegisteredPlugin::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
