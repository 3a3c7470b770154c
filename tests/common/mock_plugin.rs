use async_trait::async_trait;
use parking_lot::Mutex;
use registration_core::constants::ledger_keys;
use registration_core::ledger::{JsonMap, Ledger, SubmissionContext};
use registration_core::models::Submission;
use registration_core::orchestration::{ReferenceError, ReferenceGenerator, ReportGenerator};
use registration_core::registry::{
    NoSubmissionReference, PluginError, PluginOptions, PreRegistrationResult, RegistrationPlugin,
};
use registration_core::state_machine::RegistrationStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const SCRIPTED: &str = "scripted";

/// Call counters and failure switches shared between a test and its plugin.
#[derive(Debug, Default)]
pub struct PluginSpy {
    pub pre_register_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub ownership_calls: AtomicUsize,
    pub payment_calls: AtomicUsize,
    pub effect_a_calls: AtomicUsize,
    pub effect_b_calls: AtomicUsize,

    pub fail_pre_register: AtomicBool,
    pub deny_ownership: AtomicBool,
    pub fail_payment: AtomicBool,
    pub misconfigured: AtomicBool,
    /// Remaining failures of step B
    pub step_b_failures: AtomicUsize,

    /// Reference handed out by pre-registration
    pub reference: Mutex<Option<String>>,
    /// `intermediate.temporary_internal_reference` as seen by the last
    /// pre-registration call
    pub seen_temporary_reference: Mutex<Option<Value>>,
    /// Status of the submission as seen by the last registration call
    pub seen_status: Mutex<Option<RegistrationStatus>>,
}

impl PluginSpy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn fail_step_b(&self, times: usize) {
        self.step_b_failures.store(times, Ordering::SeqCst);
    }

    pub fn always_fail_step_b(&self) {
        self.fail_step_b(usize::MAX);
    }

    pub fn set_reference(&self, reference: Option<&str>) {
        *self.reference.lock() = reference.map(str::to_string);
    }

    fn take_step_b_failure(&self) -> bool {
        self.step_b_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                match remaining {
                    0 => None,
                    usize::MAX => Some(usize::MAX),
                    n => Some(n - 1),
                }
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedOptions {
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub confidentiality: Option<String>,
}

impl PluginOptions for ScriptedOptions {
    fn validate_business_rules(&self) -> Result<(), String> {
        if self.confidentiality.is_some() && self.case_type.is_none() {
            return Err("confidentiality requires a case type".to_string());
        }
        Ok(())
    }
}

/// Two guarded side effects (`intermediate.a`, `intermediate.b`) followed by
/// a case result carrying a caseworker reference.
pub struct ScriptedPlugin {
    spy: Arc<PluginSpy>,
}

impl ScriptedPlugin {
    pub fn new(spy: Arc<PluginSpy>) -> Self {
        Self { spy }
    }
}

#[async_trait]
impl RegistrationPlugin for ScriptedPlugin {
    type Options = ScriptedOptions;

    fn identifier(&self) -> &'static str {
        SCRIPTED
    }

    fn verbose_name(&self) -> &str {
        "Scripted test backend"
    }

    async fn pre_register_submission(
        &self,
        ctx: &mut SubmissionContext,
        _options: &ScriptedOptions,
    ) -> Result<PreRegistrationResult, PluginError> {
        self.spy.pre_register_calls.fetch_add(1, Ordering::SeqCst);
        *self.spy.seen_temporary_reference.lock() = ctx
            .ledger()
            .get(ledger_keys::TEMPORARY_INTERNAL_REFERENCE)
            .cloned();

        if self.spy.fail_pre_register.load(Ordering::SeqCst) {
            return Err(PluginError::registration_failed("case reservation rejected"));
        }

        Ok(PreRegistrationResult {
            reference: self.spy.reference.lock().clone(),
            data: None,
        })
    }

    async fn register_submission(
        &self,
        ctx: &mut SubmissionContext,
        _options: &ScriptedOptions,
    ) -> Result<Option<JsonMap>, PluginError> {
        self.spy.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.spy.seen_status.lock() = Some(ctx.submission().registration_status);

        let spy = Arc::clone(&self.spy);
        let _a: Value = ctx
            .execute_unless_exists("intermediate.a", || async move {
                spy.effect_a_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, PluginError>(json!({"url": "https://backend.example/a/1"}))
            })
            .await?;

        let spy = Arc::clone(&self.spy);
        let _b: Value = ctx
            .execute_unless_exists("intermediate.b", || async move {
                spy.effect_b_calls.fetch_add(1, Ordering::SeqCst);
                if spy.take_step_b_failure() {
                    return Err(PluginError::registration_failed("step B: 503 from backend"));
                }
                Ok(json!({"url": "https://backend.example/b/1"}))
            })
            .await?;

        let mut result = JsonMap::new();
        result.insert(
            "zaak".to_string(),
            json!({"url": "https://backend.example/zaak/1", "identificatie": "ZAAK-0001"}),
        );
        Ok(Some(result))
    }

    async fn update_payment_status(
        &self,
        _ctx: &mut SubmissionContext,
        _options: &ScriptedOptions,
    ) -> Result<(), PluginError> {
        self.spy.payment_calls.fetch_add(1, Ordering::SeqCst);
        if self.spy.fail_payment.load(Ordering::SeqCst) {
            return Err(PluginError::Unexpected(anyhow::anyhow!(
                "payment endpoint unreachable"
            )));
        }
        Ok(())
    }

    async fn check_config(&self) -> Result<(), PluginError> {
        if self.spy.misconfigured.load(Ordering::SeqCst) {
            return Err(PluginError::Configuration("backend root URL is not set".into()));
        }
        Ok(())
    }

    fn get_reference_from_result(&self, result: &Ledger) -> Result<String, NoSubmissionReference> {
        result
            .get("zaak.identificatie")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(NoSubmissionReference)
    }

    async fn verify_initial_data_ownership(
        &self,
        _ctx: &SubmissionContext,
        _options: &ScriptedOptions,
    ) -> Result<(), PluginError> {
        self.spy.ownership_calls.fetch_add(1, Ordering::SeqCst);
        if self.spy.deny_ownership.load(Ordering::SeqCst) {
            return Err(PluginError::PermissionDenied(
                "object is not owned by the submitter".into(),
            ));
        }
        Ok(())
    }

    fn serialize_result(&self, mut raw: JsonMap) -> Result<JsonMap, PluginError> {
        raw.insert("backend".to_string(), Value::String(SCRIPTED.to_string()));
        Ok(raw)
    }
}

/// Hands out `FALLBACK-1`, `FALLBACK-2`, ... and counts calls.
#[derive(Debug, Default)]
pub struct CountingReferenceGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ReferenceGenerator for CountingReferenceGenerator {
    async fn generate(&self, _submission: &Submission) -> Result<String, ReferenceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("FALLBACK-{n}"))
    }
}

#[derive(Debug, Default)]
pub struct RecordingReportGenerator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl ReportGenerator for RecordingReportGenerator {
    async fn generate_report(&self, submission: &Submission) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("PDF renderer crashed for {}", submission.uuid);
        }
        Ok(())
    }
}
