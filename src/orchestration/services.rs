//! Everything a phase needs, bundled so the task runner can hand one value to
//! each phase function.

use super::collaborators::{
    DefaultReferenceGenerator, NoopReportGenerator, PaymentRecords, ReferenceGenerator,
    ReportGenerator, SubmissionPaymentRecords,
};
use crate::config::RegistrationConfig;
use crate::registry::PluginRegistry;
use crate::store::SubmissionStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct RegistrationServices {
    pub store: Arc<dyn SubmissionStore>,
    pub registry: Arc<PluginRegistry>,
    pub references: Arc<dyn ReferenceGenerator>,
    pub payments: Arc<dyn PaymentRecords>,
    pub reports: Arc<dyn ReportGenerator>,
    pub config: Arc<RegistrationConfig>,
}

impl RegistrationServices {
    /// Default collaborators: store-checked reference generation, payment
    /// state on the submission row, no report rendering.
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        registry: Arc<PluginRegistry>,
        config: RegistrationConfig,
    ) -> Self {
        let references = Arc::new(DefaultReferenceGenerator::new(
            store.clone(),
            config.reference.clone(),
        ));
        Self {
            store,
            registry,
            references,
            payments: Arc::new(SubmissionPaymentRecords),
            reports: Arc::new(NoopReportGenerator),
            config: Arc::new(config),
        }
    }

    pub fn with_reference_generator(mut self, references: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = references;
        self
    }

    pub fn with_payment_records(mut self, payments: Arc<dyn PaymentRecords>) -> Self {
        self.payments = payments;
        self
    }

    pub fn with_report_generator(mut self, reports: Arc<dyn ReportGenerator>) -> Self {
        self.reports = reports;
        self
    }
}

impl std::fmt::Debug for RegistrationServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationServices")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
