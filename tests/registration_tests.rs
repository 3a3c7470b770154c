mod common;

use common::*;
use registration_core::config::RegistrationConfig;
use registration_core::orchestration::{
    pre_register, register, FailureKind, PhaseError, PhaseOutcome, SkipReason, Trigger,
};
use registration_core::state_machine::RegistrationStatus;
use serde_json::json;

fn failure_kind(err: PhaseError) -> FailureKind {
    match err {
        PhaseError::Failed(failure) => failure.kind,
        other => panic!("expected a recorded failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_backend_succeeds_with_empty_result() {
    let h = TestHarness::new();
    let id = h.insert(SubmissionBuilder::new().without_backend().build());

    pre_register(&h.services, id, Trigger::OnCompletion).await.unwrap();
    let outcome = register(&h.services, id, Trigger::OnCompletion).await.unwrap();

    assert_eq!(outcome, PhaseOutcome::Completed);
    let submission = h.load(id);
    assert_eq!(submission.registration_status, RegistrationStatus::Success);
    assert_eq!(submission.registration_attempts, 1);
    assert!(submission.registration_result.is_empty());
    assert!(submission.registration_result.intermediate().is_none());
}

#[tokio::test]
async fn test_partial_failure_is_not_duplicated_on_retry() {
    let h = TestHarness::new();
    h.spy.fail_step_b(1);
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());

    // Attempt 1: A succeeds, B fails
    let err = register(&h.services, id, Trigger::OnCompletion)
        .await
        .unwrap_err();
    assert_eq!(failure_kind(err), FailureKind::Declared);

    let submission = h.load(id);
    assert_eq!(submission.registration_status, RegistrationStatus::Failed);
    assert!(submission.registration_result.get("intermediate.a").is_some());
    assert!(submission.registration_result.get("intermediate.b").is_none());
    assert!(submission.registration_result.traceback().is_some());
    assert!(submission.needs_on_completion_retry);

    // Attempt 2: only B runs again
    let outcome = register(&h.services, id, Trigger::OnRetry).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::Completed);
    assert_eq!(PluginSpy::count(&h.spy.effect_a_calls), 1);
    assert_eq!(PluginSpy::count(&h.spy.effect_b_calls), 2);

    let submission = h.load(id);
    assert_eq!(submission.registration_status, RegistrationStatus::Success);
    assert_eq!(submission.registration_attempts, 2);
    assert!(submission.registration_result.traceback().is_none());
    assert!(submission.registration_result.get("intermediate.b").is_some());
    assert!(!submission.needs_on_completion_retry);
}

#[tokio::test]
async fn test_success_stores_serialized_result() {
    let h = TestHarness::new();
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());

    register(&h.services, id, Trigger::OnCompletion).await.unwrap();

    let result = h.load(id).registration_result;
    assert_eq!(result.get("zaak.identificatie"), Some(&json!("ZAAK-0001")));
    assert_eq!(result.get("backend"), Some(&json!(SCRIPTED)));
}

#[tokio::test]
async fn test_attempt_limit_stops_retrying() {
    let config = RegistrationConfig {
        registration_attempt_limit: 2,
        ..RegistrationConfig::default()
    };
    let h = TestHarness::with_config(config);
    h.spy.always_fail_step_b();
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());

    for _ in 0..2 {
        assert!(register(&h.services, id, Trigger::OnRetry).await.is_err());
    }
    let outcome = register(&h.services, id, Trigger::OnRetry).await.unwrap();

    assert_eq!(
        outcome,
        PhaseOutcome::Skipped(SkipReason::AttemptLimitReached {
            attempts: 2,
            limit: 2
        })
    );
    assert_eq!(PluginSpy::count(&h.spy.register_calls), 2);
    let submission = h.load(id);
    assert_eq!(submission.registration_status, RegistrationStatus::Failed);
    assert_eq!(submission.registration_attempts, 2);
}

#[tokio::test]
async fn test_success_is_never_downgraded() {
    let h = TestHarness::new();
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());
    register(&h.services, id, Trigger::OnCompletion).await.unwrap();
    let registered = h.load(id);

    h.spy.always_fail_step_b();
    let outcome = register(&h.services, id, Trigger::OnRetry).await.unwrap();

    assert_eq!(outcome, PhaseOutcome::Skipped(SkipReason::AlreadyRegistered));
    assert_eq!(h.load(id), registered);
    assert_eq!(PluginSpy::count(&h.spy.register_calls), 1);
}

#[tokio::test]
async fn test_attempt_is_marked_in_progress_before_plugin_runs() {
    let h = TestHarness::new();
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());

    register(&h.services, id, Trigger::OnCompletion).await.unwrap();

    assert_eq!(
        *h.spy.seen_status.lock(),
        Some(RegistrationStatus::InProgress)
    );
    assert!(h.load(id).last_register_date.is_some());
}

#[tokio::test]
async fn test_gating_guards_skip_registration() {
    let config = RegistrationConfig {
        wait_for_payment_to_register: true,
        ..RegistrationConfig::default()
    };
    let h = TestHarness::with_config(config);
    let not_pre_registered = h.completed_submission();
    let cosign = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-1")
            .awaiting_cosign()
            .build(),
    );
    let unpaid = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-2")
            .with_payment(false)
            .build(),
    );

    let cases = [
        (not_pre_registered, SkipReason::PreRegistrationIncomplete),
        (cosign, SkipReason::AwaitingCosign),
        (unpaid, SkipReason::AwaitingPayment),
    ];
    for (id, reason) in cases {
        let before = h.load(id);
        let outcome = register(&h.services, id, Trigger::OnCompletion).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Skipped(reason));
        assert_eq!(h.load(id), before);
    }
    assert_eq!(PluginSpy::count(&h.spy.register_calls), 0);
}

#[tokio::test]
async fn test_unpaid_submission_registers_without_payment_policy() {
    let h = TestHarness::new();
    let id = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-1")
            .with_payment(false)
            .build(),
    );

    let outcome = register(&h.services, id, Trigger::OnCompletion).await.unwrap();

    assert_eq!(outcome, PhaseOutcome::Completed);
    assert!(!h.load(id).payment.registered);
}

#[tokio::test]
async fn test_payment_trigger_marks_payments_registered() {
    let config = RegistrationConfig {
        wait_for_payment_to_register: true,
        ..RegistrationConfig::default()
    };
    let h = TestHarness::with_config(config);
    let on_payment = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-1")
            .with_payment(true)
            .build(),
    );
    let on_completion = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-2")
            .with_payment(true)
            .build(),
    );

    register(&h.services, on_payment, Trigger::OnPaymentComplete)
        .await
        .unwrap();
    register(&h.services, on_completion, Trigger::OnCompletion)
        .await
        .unwrap();

    assert!(h.load(on_payment).payment.registered);
    assert!(!h.load(on_completion).payment.registered);
}

#[tokio::test]
async fn test_disabled_plugin_fails_attempt() {
    let h = TestHarness::new();
    h.services.registry.disable_plugin(SCRIPTED).unwrap();
    let id = h.insert(SubmissionBuilder::new().pre_registered("ZAAK-1").build());

    let err = register(&h.services, id, Trigger::OnRetry).await.unwrap_err();

    assert_eq!(failure_kind(err), FailureKind::PluginDisabled);
    let submission = h.load(id);
    assert_eq!(submission.registration_status, RegistrationStatus::Failed);
    assert_eq!(submission.registration_attempts, 1);
    assert!(submission
        .registration_result
        .traceback()
        .unwrap()
        .contains("is disabled"));
    assert_eq!(PluginSpy::count(&h.spy.register_calls), 0);
}

#[tokio::test]
async fn test_invalid_options_fail_attempt() {
    let h = TestHarness::new();
    let id = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-1")
            .with_backend(SCRIPTED, json!({"zaaktype": "https://catalogi.example/1"}))
            .build(),
    );

    let err = register(&h.services, id, Trigger::OnCompletion)
        .await
        .unwrap_err();

    assert_eq!(failure_kind(err), FailureKind::InvalidOptions);
    assert_eq!(h.load(id).registration_status, RegistrationStatus::Failed);
}

#[tokio::test]
async fn test_unknown_backend_fails_attempt() {
    let h = TestHarness::new();
    let id = h.insert(
        SubmissionBuilder::new()
            .pre_registered("ZAAK-1")
            .with_backend("microsoft-graph", json!({}))
            .build(),
    );

    let err = register(&h.services, id, Trigger::OnCompletion)
        .await
        .unwrap_err();

    assert_eq!(failure_kind(err), FailureKind::PluginNotFound);
}
