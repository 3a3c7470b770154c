//! # Registration Plugins
//!
//! The plugin contract every registration backend implements and the
//! registry that resolves a submission's backend selection to a plugin.
//!
//! ## Architecture
//!
//! ```text
//! Registry
//! ├── contract         (RegistrationPlugin trait, options schema, PluginError)
//! ├── dispatch         (object-safe view, binding options to a plugin)
//! └── plugin_registry  (startup registration, enable/disable, health checks)
//! ```

pub mod contract;
pub mod dispatch;
pub mod plugin_registry;

pub use contract::{
    deserialize_options, NoSubmissionReference, OptionsError, PluginError, PluginOptions,
    PreRegistrationResult, RegistrationPlugin, ValidationMode,
};
pub use dispatch::{BoundPlugin, DynRegistrationPlugin};
pub use plugin_registry::{
    PluginHealth, PluginMetadata, PluginRegistry, PluginRegistryBuilder, PluginStats,
    RegisteredPlugin, RegistryError,
};
