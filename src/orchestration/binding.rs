//! Resolving a submission's backend selection to a bound plugin.

use super::types::{FailureKind, RegistrationFailure};
use crate::models::BackendSelection;
use crate::registry::{
    BoundPlugin, DynRegistrationPlugin, PluginRegistry, RegisteredPlugin, ValidationMode,
};

/// Look the backend up and check it is administratively enabled.
pub(crate) fn resolve_enabled<'r>(
    registry: &'r PluginRegistry,
    selection: &BackendSelection,
) -> Result<&'r RegisteredPlugin, RegistrationFailure> {
    let plugin = registry.resolve(&selection.backend).map_err(|e| {
        RegistrationFailure::from_error(FailureKind::PluginNotFound, &e)
    })?;
    if !plugin.is_enabled() {
        return Err(RegistrationFailure::new(
            FailureKind::PluginDisabled,
            format!("Registration plugin '{}' is disabled", selection.backend),
        ));
    }
    Ok(plugin)
}

/// Options go through the plugin's schema only; business rules are for
/// operator edits.
pub(crate) fn bind_relaxed<'r>(
    plugin: &'r RegisteredPlugin,
    selection: &BackendSelection,
) -> Result<Box<dyn BoundPlugin + 'r>, RegistrationFailure> {
    plugin
        .plugin()
        .bind(&selection.options, ValidationMode::Relaxed)
        .map_err(|e| RegistrationFailure::from_error(FailureKind::InvalidOptions, &e))
}
