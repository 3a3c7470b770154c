//! # Plugin Registry
//!
//! Process-wide directory of registration backends.
//!
//! ## Overview
//!
//! Plugins are registered once, at startup, through [`PluginRegistryBuilder`].
//! Contract violations (empty, oversized or duplicate identifiers) fail the
//! build, never a registration attempt. The built registry is immutable apart
//! from the administrative enable/disable toggle.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use registration_core::registry::PluginRegistry;
//!
//! let registry = PluginRegistry::builder()
//!     .register(EmailPlugin::new(mailer))?
//!     .register(ZgwPlugin::new(client))?
//!     .build();
//!
//! registry.disable_plugin("email")?;
//! ```

use super::contract::{PluginError, RegistrationPlugin, ValidationMode};
use super::dispatch::DynRegistrationPlugin;
use crate::constants::plugins::MAX_IDENTIFIER_LENGTH;
use crate::logging::log_plugin_operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Plugin identifier must not be empty")]
    EmptyIdentifier,

    #[error("Plugin identifier '{identifier}' exceeds {max} characters")]
    IdentifierTooLong { identifier: String, max: usize },

    #[error("Plugin identifier '{0}' is already registered")]
    DuplicateIdentifier(String),

    #[error("Plugin '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidOptions(String),
}

/// Plugin metadata for operator tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub identifier: String,
    pub verbose_name: String,
    pub enabled: bool,
}

/// Outcome of a plugin's configuration check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHealth {
    pub identifier: String,
    pub enabled: bool,
    /// `None` when the check passed
    pub error: Option<String>,
}

impl PluginHealth {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Statistics about registered plugins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginStats {
    pub total_plugins: usize,
    pub enabled_plugins: usize,
    pub disabled_plugins: usize,
}

/// A registered plugin and its administrative toggle.
pub struct RegisteredPlugin {
    plugin: Arc<dyn DynRegistrationPlugin>,
    enabled: AtomicBool,
}

impl RegisteredPlugin {
    pub fn plugin(&self) -> &dyn DynRegistrationPlugin {
        self.plugin.as_ref()
    }

    pub fn identifier(&self) -> &'static str {
        self.plugin.identifier()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            identifier: self.plugin.identifier().to_string(),
            verbose_name: self.plugin.verbose_name().to_string(),
            enabled: self.is_enabled(),
        }
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("identifier", &self.identifier())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Startup-time builder; every violation of the plugin contract is returned
/// from [`register`](Self::register).
#[derive(Debug, Default)]
pub struct PluginRegistryBuilder {
    plugins: HashMap<String, RegisteredPlugin>,
    order: Vec<String>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: RegistrationPlugin>(self, plugin: P) -> Result<Self, RegistryError> {
        self.register_with_state(plugin, true)
    }

    /// Register a plugin that starts administratively disabled.
    pub fn register_disabled<P: RegistrationPlugin>(self, plugin: P) -> Result<Self, RegistryError> {
        self.register_with_state(plugin, false)
    }

    fn register_with_state<P: RegistrationPlugin>(
        mut self,
        plugin: P,
        enabled: bool,
    ) -> Result<Self, RegistryError> {
        let identifier = RegistrationPlugin::identifier(&plugin);
        validate_identifier(identifier)?;
        if self.plugins.contains_key(identifier) {
            return Err(RegistryError::DuplicateIdentifier(identifier.to_string()));
        }

        self.plugins.insert(
            identifier.to_string(),
            RegisteredPlugin {
                plugin: Arc::new(plugin),
                enabled: AtomicBool::new(enabled),
            },
        );
        self.order.push(identifier.to_string());
        info!(plugin = identifier, enabled, "Registered registration plugin");
        Ok(self)
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
            order: self.order,
        }
    }
}

fn validate_identifier(identifier: &str) -> Result<(), RegistryError> {
    if identifier.trim().is_empty() {
        return Err(RegistryError::EmptyIdentifier);
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(RegistryError::IdentifierTooLong {
            identifier: identifier.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }
    Ok(())
}

/// Registry for registration backends
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, RegisteredPlugin>,
    /// Registration order, for stable listings
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::new()
    }

    /// An empty registry (every submission without a backend).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &str) -> Option<&RegisteredPlugin> {
        self.plugins.get(identifier)
    }

    pub fn resolve(&self, identifier: &str) -> Result<&RegisteredPlugin, RegistryError> {
        self.get(identifier)
            .ok_or_else(|| RegistryError::NotFound(identifier.to_string()))
    }

    pub fn is_plugin_enabled(&self, identifier: &str) -> bool {
        self.get(identifier)
            .map(RegisteredPlugin::is_enabled)
            .unwrap_or(false)
    }

    pub fn enable_plugin(&self, identifier: &str) -> Result<(), RegistryError> {
        self.resolve(identifier)?
            .enabled
            .store(true, Ordering::Release);
        log_plugin_operation(identifier, "enable", "enabled", None);
        Ok(())
    }

    pub fn disable_plugin(&self, identifier: &str) -> Result<(), RegistryError> {
        self.resolve(identifier)?
            .enabled
            .store(false, Ordering::Release);
        log_plugin_operation(identifier, "disable", "disabled", None);
        Ok(())
    }

    pub fn list_plugins(&self) -> Vec<PluginMetadata> {
        self.iter().map(RegisteredPlugin::metadata).collect()
    }

    pub fn get_stats(&self) -> PluginStats {
        let mut stats = PluginStats::default();
        for plugin in self.plugins.values() {
            stats.total_plugins += 1;
            if plugin.is_enabled() {
                stats.enabled_plugins += 1;
            } else {
                stats.disabled_plugins += 1;
            }
        }
        stats
    }

    /// Validate options the way an operator edit is validated: schema plus
    /// business rules.
    pub fn validate_options(&self, identifier: &str, raw: &Value) -> Result<(), RegistryError> {
        self.resolve(identifier)?
            .plugin
            .bind(raw, ValidationMode::Strict)
            .map(|_| ())
            .map_err(|e| RegistryError::InvalidOptions(e.to_string()))
    }

    /// Run every plugin's configuration check.
    pub async fn check_all(&self) -> Vec<PluginHealth> {
        let checks = self.iter().map(|registered| async move {
            let result: Result<(), PluginError> = registered.plugin.check_config().await;
            PluginHealth {
                identifier: registered.identifier().to_string(),
                enabled: registered.is_enabled(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        futures::future::join_all(checks).await
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.order.iter().filter_map(|id| self.plugins.get(id))
    }
}
