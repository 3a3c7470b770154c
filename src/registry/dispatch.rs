//! Type-erased plugin dispatch.
//!
//! [`RegistrationPlugin`] has an associated options type, so it cannot be used
//! as a trait object directly. [`DynRegistrationPlugin`] is the object-safe
//! view the registry stores; binding it to a raw options blob runs the options
//! schema and yields a [`BoundPlugin`] carrying the typed options.

use super::contract::{
    deserialize_options, NoSubmissionReference, OptionsError, PluginError, PreRegistrationResult,
    RegistrationPlugin, ValidationMode,
};
use crate::ledger::{JsonMap, Ledger, SubmissionContext};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait DynRegistrationPlugin: Send + Sync {
    fn identifier(&self) -> &'static str;

    fn verbose_name(&self) -> &str;

    /// Validate `raw` and bind the typed options to this plugin.
    fn bind<'a>(
        &'a self,
        raw: &Value,
        mode: ValidationMode,
    ) -> Result<Box<dyn BoundPlugin + 'a>, OptionsError>;

    async fn check_config(&self) -> Result<(), PluginError>;

    fn get_reference_from_result(&self, result: &Ledger) -> Result<String, NoSubmissionReference>;
}

/// A plugin together with validated options.
#[async_trait]
pub trait BoundPlugin: Send + Sync {
    async fn verify_initial_data_ownership(&self, ctx: &SubmissionContext)
        -> Result<(), PluginError>;

    async fn pre_register_submission(
        &self,
        ctx: &mut SubmissionContext,
    ) -> Result<PreRegistrationResult, PluginError>;

    /// Runs the plugin and its result schema; `None` becomes an empty mapping.
    async fn register_submission(&self, ctx: &mut SubmissionContext)
        -> Result<JsonMap, PluginError>;

    async fn update_payment_status(&self, ctx: &mut SubmissionContext) -> Result<(), PluginError>;
}

struct Bound<'a, P: RegistrationPlugin> {
    plugin: &'a P,
    options: P::Options,
}

#[async_trait]
impl<'a, P: RegistrationPlugin> BoundPlugin for Bound<'a, P> {
    async fn verify_initial_data_ownership(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<(), PluginError> {
        self.plugin
            .verify_initial_data_ownership(ctx, &self.options)
            .await
    }

    async fn pre_register_submission(
        &self,
        ctx: &mut SubmissionContext,
    ) -> Result<PreRegistrationResult, PluginError> {
        self.plugin.pre_register_submission(ctx, &self.options).await
    }

    async fn register_submission(
        &self,
        ctx: &mut SubmissionContext,
    ) -> Result<JsonMap, PluginError> {
        let raw = self
            .plugin
            .register_submission(ctx, &self.options)
            .await?
            .unwrap_or_default();
        self.plugin.serialize_result(raw)
    }

    async fn update_payment_status(&self, ctx: &mut SubmissionContext) -> Result<(), PluginError> {
        self.plugin.update_payment_status(ctx, &self.options).await
    }
}

#[async_trait]
impl<P: RegistrationPlugin> DynRegistrationPlugin for P {
    fn identifier(&self) -> &'static str {
        RegistrationPlugin::identifier(self)
    }

    fn verbose_name(&self) -> &str {
        RegistrationPlugin::verbose_name(self)
    }

    fn bind<'a>(
        &'a self,
        raw: &Value,
        mode: ValidationMode,
    ) -> Result<Box<dyn BoundPlugin + 'a>, OptionsError> {
        let options =
            deserialize_options::<P::Options>(RegistrationPlugin::identifier(self), raw, mode)?;
        Ok(Box::new(Bound {
            plugin: self,
            options,
        }))
    }

    async fn check_config(&self) -> Result<(), PluginError> {
        RegistrationPlugin::check_config(self).await
    }

    fn get_reference_from_result(&self, result: &Ledger) -> Result<String, NoSubmissionReference> {
        RegistrationPlugin::get_reference_from_result(self, result)
    }
}
