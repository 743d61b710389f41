//! Plugin initialisation: entry point to registered instance.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::error::{render_cause, PluginError, Result};

use super::registry::{PluginRegistry, RegisteredPlugin};
use super::synthesizer::ResolvedModule;
use super::types::EntryPoint;

/// Invoke `entry`, run the instance's `init` hook and register it.
///
/// Returns the registered plugin's name. Panics raised by the module are
/// caught and reported as `InitFailed`.
///
/// # Errors
/// `PluginError::InitFailed` if the constructor or `init` panics, `init`
/// returns an error, or the registry rejects the instance.
pub fn initialize(
    module: &ResolvedModule,
    entry: &EntryPoint,
    registry: &mut PluginRegistry,
) -> Result<String> {
    let init_failed = |name: &str, cause: String| PluginError::InitFailed {
        identifier: module.identifier.clone(),
        name: name.to_string(),
        module_path: module.module_path.clone(),
        cause,
    };

    let mut instance = panic::catch_unwind(AssertUnwindSafe(|| entry.invoke())).map_err(|payload| {
        init_failed(
            &module.name,
            format!("{} panicked: {}", entry.symbol(), panic_message(payload.as_ref())),
        )
    })?;

    let name = instance.name().to_string();
    debug!(plugin = %name, identifier = %module.identifier, "Running plugin init hook");

    match panic::catch_unwind(AssertUnwindSafe(|| instance.init())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(init_failed(&name, render_cause(&e))),
        Err(payload) => {
            return Err(init_failed(
                &name,
                format!("init panicked: {}", panic_message(payload.as_ref())),
            ))
        }
    }

    registry
        .register(RegisteredPlugin::new(
            module.identifier.clone(),
            module.module_path.clone(),
            module.category.clone(),
            instance,
        ))
        .map_err(|e| init_failed(&name, e.to_string()))?;

    Ok(name)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
