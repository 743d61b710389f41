//! Module synthesis: identifier to module path, building when needed.
//!
//! Direct module paths pass straight through. Logical references map to
//! `<output_dir>/<identifier>.<ext>`; the build step only runs when the
//! [`cache`](super::cache) says the artifact there cannot be reused.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{render_cause, PluginError, Result};

use super::builder::Builder;
use super::cache::{self, CacheState};
use super::identifier::ParsedIdentifier;
use super::types::{PluginCategory, PluginSpec, DEFAULT_ENTRY_SYMBOL, MODULE_EXTENSION};

/// How the module for an identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The identifier already named a module.
    Direct,
    /// A cached artifact was reused.
    Reused,
    /// The builder produced the artifact in this run.
    Built,
}

/// Everything the loader and initializer need for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub identifier: String,
    pub module_path: PathBuf,
    pub entry_symbol: String,
    /// Plugin name used in errors until the instance reports its own.
    pub name: String,
    /// `None` for direct module paths.
    pub category: Option<PluginCategory>,
    pub outcome: BuildOutcome,
}

/// Resolution without side effects, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePlan {
    pub identifier: String,
    pub module_path: PathBuf,
    pub entry_symbol: String,
    /// `None` for direct module paths.
    pub spec: Option<PluginSpec>,
    /// `None` for direct module paths.
    pub cache: Option<CacheState>,
}

/// Turns parsed identifiers into module paths, building on demand.
#[derive(Debug)]
pub struct ModuleSynthesizer<B> {
    output_dir: PathBuf,
    source_root: PathBuf,
    builder: B,
}

impl<B: Builder> ModuleSynthesizer<B> {
    pub fn new(output_dir: impl Into<PathBuf>, source_root: impl Into<PathBuf>, builder: B) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_root: source_root.into(),
            builder,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Output path for a logical reference, built from the raw identifier.
    ///
    /// Only plain path components of `raw` are kept, so the result always
    /// lies under the output directory.
    pub fn output_path(&self, raw: &str) -> PathBuf {
        let mut path = self.output_dir.clone();
        for component in Path::new(raw).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        let mut file = path.into_os_string();
        file.push(".");
        file.push(MODULE_EXTENSION);
        PathBuf::from(file)
    }

    /// Describe what [`resolve`](Self::resolve) would do, without building.
    pub fn plan(&self, parsed: &ParsedIdentifier) -> Result<ModulePlan> {
        if parsed.is_direct_module() {
            return Ok(ModulePlan {
                identifier: parsed.raw().to_string(),
                module_path: PathBuf::from(parsed.raw()),
                entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
                spec: None,
                cache: None,
            });
        }

        let spec = PluginSpec::from_segments(parsed.segments(), &self.source_root);
        let module_path = self.output_path(parsed.raw());
        let state = cache::inspect(&module_path, &spec.source_path)?;

        Ok(ModulePlan {
            identifier: parsed.raw().to_string(),
            entry_symbol: spec.entry_symbol.clone(),
            module_path,
            spec: Some(spec),
            cache: Some(state),
        })
    }

    /// Resolve an identifier to a loadable module, building it if needed.
    ///
    /// # Errors
    /// `PluginError::BuildFailed` if the cache cannot be inspected or the
    /// builder fails.
    pub fn resolve(&self, parsed: &ParsedIdentifier) -> Result<ResolvedModule> {
        self.resolve_with(parsed, || {})
    }

    /// Like [`resolve`](Self::resolve), calling `on_build` just before the
    /// builder runs. It is not called for direct paths or reused artifacts.
    pub fn resolve_with(
        &self,
        parsed: &ParsedIdentifier,
        on_build: impl FnOnce(),
    ) -> Result<ResolvedModule> {
        if parsed.is_direct_module() {
            let module_path = PathBuf::from(parsed.raw());
            let name = module_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| parsed.raw().to_string());
            debug!(identifier = parsed.raw(), "Direct module path, skipping build");
            return Ok(ResolvedModule {
                identifier: parsed.raw().to_string(),
                module_path,
                entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
                name,
                category: None,
                outcome: BuildOutcome::Direct,
            });
        }

        let spec = PluginSpec::from_segments(parsed.segments(), &self.source_root);
        let module_path = self.output_path(parsed.raw());
        let build_failed = |cause: String| PluginError::BuildFailed {
            identifier: parsed.raw().to_string(),
            name: spec.name.clone(),
            output: module_path.clone(),
            cause,
        };

        let state = cache::inspect(&module_path, &spec.source_path)
            .map_err(|e| build_failed(format!("cannot inspect artifact: {}", e)))?;

        let outcome = if state.needs_build() {
            debug!(
                identifier = parsed.raw(),
                state = ?state,
                symbol = %spec.entry_symbol,
                "Building plugin module"
            );
            on_build();
            self.builder
                .build(&module_path, &spec)
                .map_err(|e| build_failed(render_cause(&e)))?;
            if let Err(e) = cache::record(&module_path) {
                warn!(
                    module = %module_path.display(),
                    error = %e,
                    "Could not record artifact digest"
                );
            }
            info!(identifier = parsed.raw(), module = %module_path.display(), "Built plugin");
            BuildOutcome::Built
        } else {
            debug!(
                identifier = parsed.raw(),
                module = %module_path.display(),
                "Reusing existing plugin module"
            );
            BuildOutcome::Reused
        };

        Ok(ResolvedModule {
            identifier: parsed.raw().to_string(),
            module_path,
            entry_symbol: spec.entry_symbol,
            name: spec.name,
            category: Some(spec.category),
            outcome,
        })
    }
}
