//! Startup orchestration over an ordered identifier list.
//!
//! Each identifier moves through
//! `Pending -> Resolving -> Building -> Loading -> Initializing -> Done`
//! (`Building` only when a logical reference is actually built). The
//! first failure is terminal for the whole run: later identifiers are not
//! attempted and plugins registered so far stay registered.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::error::{render_cause, PluginError, Result};

use super::builder::Builder;
use super::identifier::ParsedIdentifier;
use super::initializer;
use super::loader::ModuleLoader;
use super::registry::PluginRegistry;
use super::synthesizer::{BuildOutcome, ModulePlan, ModuleSynthesizer};

/// Pipeline stage of a single identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Resolving,
    Building,
    Loading,
    Initializing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Resolving => "resolving",
            Stage::Building => "building",
            Stage::Loading => "loading",
            Stage::Initializing => "initializing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One successfully loaded identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub identifier: String,
    pub name: String,
    pub module_path: PathBuf,
    pub outcome: BuildOutcome,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Loaded identifiers in input order.
    pub loaded: Vec<LoadedPlugin>,
    /// Identifiers that were empty after trimming.
    pub skipped: usize,
}

impl LoadReport {
    pub fn built_count(&self) -> usize {
        self.loaded
            .iter()
            .filter(|p| p.outcome == BuildOutcome::Built)
            .count()
    }
}

/// Drives identifiers through parse, synthesis, load and initialisation.
#[derive(Debug)]
pub struct PluginLoader<B, L> {
    synthesizer: ModuleSynthesizer<B>,
    loader: L,
}

impl<B: Builder, L: ModuleLoader> PluginLoader<B, L> {
    pub fn new(config: &LoaderConfig, builder: B, loader: L) -> Self {
        Self::with_synthesizer(
            ModuleSynthesizer::new(&config.output_dir, &config.source_root, builder),
            loader,
        )
    }

    pub fn with_synthesizer(synthesizer: ModuleSynthesizer<B>, loader: L) -> Self {
        Self {
            synthesizer,
            loader,
        }
    }

    pub fn synthesizer(&self) -> &ModuleSynthesizer<B> {
        &self.synthesizer
    }

    /// Load every identifier in order, stopping at the first failure.
    ///
    /// # Errors
    /// The first `InvalidIdentifier`, `BuildFailed`, `LoadFailed` or
    /// `InitFailed` encountered. Plugins registered before it remain in
    /// `registry`.
    pub fn load_all<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        registry: &mut PluginRegistry,
    ) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for raw in identifiers {
            match self.load_one(raw.as_ref(), registry)? {
                Some(loaded) => {
                    info!(plugin = %loaded.name, "Loaded plugin {}", loaded.identifier);
                    report.loaded.push(loaded);
                }
                None => report.skipped += 1,
            }
        }

        Ok(report)
    }

    /// Load a single identifier.
    ///
    /// Returns `Ok(None)` when the identifier is empty after trimming.
    pub fn load_one(&self, raw: &str, registry: &mut PluginRegistry) -> Result<Option<LoadedPlugin>> {
        let raw = raw.trim();
        if raw.is_empty() {
            debug!(stage = %Stage::Done, "Skipping empty plugin identifier");
            return Ok(None);
        }

        let mut stage = Stage::Pending;
        let result = self.run_stages(raw, registry, &mut stage);
        if let Err(ref e) = result {
            debug!(
                plugin = raw,
                from = %stage,
                stage = %Stage::Failed,
                error = %e,
                "Plugin pipeline failed"
            );
        }
        result.map(Some)
    }

    fn run_stages(
        &self,
        raw: &str,
        registry: &mut PluginRegistry,
        stage: &mut Stage,
    ) -> Result<LoadedPlugin> {
        advance(stage, Stage::Resolving, raw);
        let parsed = ParsedIdentifier::parse(raw)?;

        let module = self
            .synthesizer
            .resolve_with(&parsed, || advance(stage, Stage::Building, raw))?;

        advance(stage, Stage::Loading, raw);
        let entry = self
            .loader
            .load(&module.module_path, &module.entry_symbol)
            .map_err(|e| PluginError::LoadFailed {
                identifier: module.identifier.clone(),
                module_path: module.module_path.clone(),
                cause: render_cause(&e),
            })?;

        advance(stage, Stage::Initializing, raw);
        let name = initializer::initialize(&module, &entry, registry)?;

        advance(stage, Stage::Done, raw);
        Ok(LoadedPlugin {
            identifier: module.identifier,
            name,
            module_path: module.module_path,
            outcome: module.outcome,
        })
    }

    /// Resolve an identifier without building, loading or registering.
    ///
    /// Returns `Ok(None)` when the identifier is empty after trimming.
    pub fn plan(&self, raw: &str) -> Result<Option<ModulePlan>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let parsed = ParsedIdentifier::parse(raw)?;
        self.synthesizer.plan(&parsed).map(Some)
    }
}

fn advance(stage: &mut Stage, next: Stage, raw: &str) {
    debug!(plugin = raw, from = %stage, stage = %next, "Plugin stage");
    *stage = next;
}
