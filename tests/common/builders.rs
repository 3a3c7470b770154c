use super::mock_plugin::{
    CountingReferenceGenerator, PluginSpy, RecordingReportGenerator, ScriptedPlugin, SCRIPTED,
};
use registration_core::config::RegistrationConfig;
use registration_core::models::Submission;
use registration_core::orchestration::{RegistrationServices, RegistrationTaskRunner};
use registration_core::registry::PluginRegistry;
use registration_core::store::InMemorySubmissionStore;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory store, the scripted plugin and counting collaborators, wired
/// into one set of services.
pub struct TestHarness {
    pub store: Arc<InMemorySubmissionStore>,
    pub spy: Arc<PluginSpy>,
    pub references: Arc<CountingReferenceGenerator>,
    pub reports: Arc<RecordingReportGenerator>,
    pub services: RegistrationServices,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(RegistrationConfig::default())
    }

    pub fn with_config(config: RegistrationConfig) -> Self {
        let store = Arc::new(InMemorySubmissionStore::new());
        let spy = PluginSpy::new();
        let references = Arc::new(CountingReferenceGenerator::default());
        let reports = Arc::new(RecordingReportGenerator::default());

        let registry = PluginRegistry::builder()
            .register(ScriptedPlugin::new(Arc::clone(&spy)))
            .expect("scripted plugin registers")
            .build();

        let services = RegistrationServices::new(store.clone(), Arc::new(registry), config)
            .with_reference_generator(references.clone())
            .with_report_generator(reports.clone());

        Self {
            store,
            spy,
            references,
            reports,
            services,
        }
    }

    pub fn runner(&self) -> RegistrationTaskRunner {
        RegistrationTaskRunner::new(self.services.clone())
    }

    /// Insert a completed submission using the scripted backend.
    pub fn completed_submission(&self) -> Uuid {
        self.insert(SubmissionBuilder::new().build())
    }

    pub fn insert(&self, submission: Submission) -> Uuid {
        let id = submission.uuid;
        self.store.insert(submission);
        id
    }

    pub fn load(&self, submission_id: Uuid) -> Submission {
        self.store
            .get(submission_id)
            .expect("submission exists in the test store")
    }

    /// Apply `change` to the stored row, as the surrounding application would.
    pub fn update(&self, submission_id: Uuid, change: impl FnOnce(&mut Submission)) {
        let mut submission = self.load(submission_id);
        change(&mut submission);
        self.store.insert(submission);
    }

    pub fn reference_calls(&self) -> usize {
        PluginSpy::count(&self.references.calls)
    }

    pub fn report_calls(&self) -> usize {
        PluginSpy::count(&self.reports.calls)
    }
}

/// Builder for test submissions; defaults to a completed submission on the
/// scripted backend with empty options.
pub struct SubmissionBuilder {
    submission: Submission,
}

impl SubmissionBuilder {
    pub fn new() -> Self {
        Self {
            submission: Submission::completed(Uuid::new_v4()).with_backend(SCRIPTED, json!({})),
        }
    }

    pub fn without_backend(mut self) -> Self {
        self.submission.registration_backend = None;
        self
    }

    pub fn with_backend(mut self, backend: &str, options: Value) -> Self {
        self.submission = self.submission.with_backend(backend, options);
        self
    }

    pub fn not_completed(mut self) -> Self {
        self.submission.completed_on = None;
        self
    }

    pub fn pre_registered(mut self, reference: &str) -> Self {
        self.submission.pre_registration_completed = true;
        self.submission.public_registration_reference = reference.to_string();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.submission.registration_attempts = attempts;
        self
    }

    pub fn with_initial_data_reference(mut self, reference: &str) -> Self {
        self.submission.initial_data_reference = Some(reference.to_string());
        self
    }

    pub fn awaiting_cosign(mut self) -> Self {
        self.submission.cosign.required = true;
        self
    }

    pub fn with_payment(mut self, paid: bool) -> Self {
        self.submission.payment.required = true;
        self.submission.payment.paid = paid;
        self
    }

    pub fn build(self) -> Submission {
        self.submission
    }
}
