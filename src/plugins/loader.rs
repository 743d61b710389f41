//! Dynamic module loading.
//!
//! This is the only place that maps foreign code into the process. A
//! module is opened once and never closed: there is no unload path, and
//! plugin instances keep pointers into the module's code for the rest of
//! the process lifetime.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use libloading::Library;
use tracing::debug;

use super::types::{EntryPoint, PluginEntryFn, ABI_VERSION_SYMBOL, PLUGIN_ABI_VERSION};

/// Opens a module and resolves its entry point.
///
/// A failed load is terminal for the identifier; callers never retry.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleLoader {
    fn load(&self, module_path: &Path, symbol: &str) -> anyhow::Result<EntryPoint>;
}

/// [`ModuleLoader`] backed by `dlopen`/`LoadLibrary` through `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, module_path: &Path, symbol: &str) -> anyhow::Result<EntryPoint> {
        let meta = fs::metadata(module_path).context("module file not accessible")?;
        if !meta.is_file() {
            bail!("module path is not a file");
        }

        // SAFETY: running a module's initialisers is inherent to loading a
        // plugin; identifiers come from the operator, not from untrusted input.
        let library = unsafe { Library::new(module_path) }.context("failed to open module")?;

        // SAFETY: `export_plugin!` declares this symbol as `static u32`.
        let abi_version = unsafe {
            let version = library
                .get::<*const u32>(ABI_VERSION_SYMBOL.as_bytes())
                .with_context(|| format!("module does not export {}", ABI_VERSION_SYMBOL))?;
            **version
        };
        if abi_version != PLUGIN_ABI_VERSION {
            bail!(
                "module ABI version {} is incompatible with host ABI version {}",
                abi_version,
                PLUGIN_ABI_VERSION
            );
        }

        // SAFETY: `export_plugin!` declares the entry symbol with the
        // `PluginEntryFn` signature and the ABI version check above passed.
        let constructor: PluginEntryFn = unsafe {
            *library
                .get::<PluginEntryFn>(symbol.as_bytes())
                .with_context(|| format!("entry symbol {} not found", symbol))?
        };

        debug!(module = %module_path.display(), symbol, "Resolved plugin entry point");

        // Keep the module mapped for the rest of the process.
        std::mem::forget(library);

        Ok(EntryPoint::new(symbol, constructor))
    }
}
