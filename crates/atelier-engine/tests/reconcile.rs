//! Reconciliation integration tests: derived package status, single-fire
//! notifications, and the sweep ticks.

mod common;

use common::{image_request, Harness};

use chrono::{Duration, Utc};

use atelier_core::{JobRecord, Package, PackageStatus, TerminalOutcome};
use atelier_engine::{sweeps, CallbackPayload, CallbackStatus, SubmitRequest, SweepConfig};
use atelier_store::Store;

#[tokio::test]
async fn empty_package_stays_active_within_grace() {
    let harness = Harness::new();
    let now = Utc::now();
    let package = Package::new(harness.funded_user(0), 20, now);
    harness.store.put_package(&package).unwrap();

    let changed = harness.reconciler.reconcile(&package.id, now).await.unwrap();
    assert!(changed.is_none());
    assert!(harness.notifier.events().is_empty());
}

#[tokio::test]
async fn empty_package_fails_after_grace() {
    // Scenario: total_expected=20, zero jobs, reconciled 6 minutes in.
    let harness = Harness::new();
    let now = Utc::now();
    let package = Package::new(harness.funded_user(0), 20, now);
    harness.store.put_package(&package).unwrap();

    let updated = harness
        .reconciler
        .reconcile(&package.id, now + Duration::minutes(6))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PackageStatus::Failed);
    assert_eq!(harness.notifier.events().len(), 1);
}

#[tokio::test]
async fn partial_success_completes_with_counts() {
    // Scenario: 20 jobs, 18 completed, 2 failed.
    let harness = Harness::new();
    let now = Utc::now();
    let user_id = harness.funded_user(0);
    let package = Package::new(user_id, 20, now);
    harness.store.put_package(&package).unwrap();

    for i in 0..20 {
        let job = JobRecord::new(user_id, 0, Some(package.id), now);
        harness.store.create_job(&job).unwrap();
        let outcome = if i < 18 {
            TerminalOutcome::Completed {
                result_refs: vec![format!("s3://out/{i}.png")],
            }
        } else {
            TerminalOutcome::Failed {
                error: "render crashed".into(),
            }
        };
        harness
            .store
            .apply_job_terminal(&job.id, &outcome, now)
            .unwrap();
    }

    let updated = harness
        .reconciler
        .reconcile(&package.id, now + Duration::minutes(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PackageStatus::Completed);
    assert_eq!(updated.generated_count, 18);
    assert_eq!(updated.failed_count, 2);
    assert!(updated.completed_at.is_some());
}

#[tokio::test]
async fn repeat_reconciliation_is_silent() {
    let harness = Harness::new();
    let now = Utc::now();
    let user_id = harness.funded_user(0);
    let package = Package::new(user_id, 1, now);
    harness.store.put_package(&package).unwrap();

    let job = JobRecord::new(user_id, 0, Some(package.id), now);
    harness.store.create_job(&job).unwrap();
    harness
        .store
        .apply_job_terminal(
            &job.id,
            &TerminalOutcome::Completed {
                result_refs: vec![],
            },
            now,
        )
        .unwrap();

    let later = now + Duration::minutes(1);
    assert!(harness
        .reconciler
        .reconcile(&package.id, later)
        .await
        .unwrap()
        .is_some());
    // Timer-triggered and transition-triggered passes land on the same
    // derivation: no second write, no second notification.
    assert!(harness
        .reconciler
        .reconcile(&package.id, later)
        .await
        .unwrap()
        .is_none());
    assert_eq!(harness.notifier.events().len(), 1);
}

#[tokio::test]
async fn in_flight_jobs_put_package_in_generating() {
    let harness = Harness::new();
    let user_id = harness.funded_user(100);
    let now = Utc::now();
    let package = Package::new(user_id, 2, now);
    harness.store.put_package(&package).unwrap();

    harness
        .lifecycle
        .submit(SubmitRequest {
            user_id,
            unit_cost: 10,
            package_id: Some(package.id),
            request: image_request(),
        })
        .await
        .unwrap();

    let updated = harness
        .reconciler
        .reconcile(&package.id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PackageStatus::Generating);
}

#[tokio::test]
async fn terminal_transition_reconciles_parent_package() {
    let harness = Harness::new();
    let user_id = harness.funded_user(100);
    let now = Utc::now();
    let package = Package::new(user_id, 1, now);
    harness.store.put_package(&package).unwrap();

    let job = harness
        .lifecycle
        .submit(SubmitRequest {
            user_id,
            unit_cost: 10,
            package_id: Some(package.id),
            request: image_request(),
        })
        .await
        .unwrap();

    harness
        .lifecycle
        .handle_callback(CallbackPayload {
            external_job_id: job.external_job_id.clone().unwrap(),
            status: CallbackStatus::Succeeded,
            result_refs: vec!["s3://out/1.png".into()],
            error: None,
        })
        .await
        .unwrap();

    // No explicit reconcile call: the terminal transition drove it.
    let stored = harness.store.get_package(&package.id).unwrap().unwrap();
    assert_eq!(stored.status, PackageStatus::Completed);
    assert_eq!(stored.generated_count, 1);
}

#[tokio::test]
async fn poll_tick_resolves_quiet_jobs() {
    let harness = Harness::new();
    let user_id = harness.funded_user(100);
    let job = harness
        .lifecycle
        .submit(SubmitRequest {
            user_id,
            unit_cost: 10,
            package_id: None,
            request: image_request(),
        })
        .await
        .unwrap();
    let external_id = job.external_job_id.clone().unwrap();

    harness.provider.set_poll_outcome(
        &external_id,
        TerminalOutcome::Completed {
            result_refs: vec!["s3://out/1.png".into()],
        },
    );

    // Zero poll delay so the freshly created job is already "quiet".
    let config = SweepConfig {
        poll_after: std::time::Duration::ZERO,
        ..SweepConfig::default()
    };
    let dyn_store: std::sync::Arc<dyn Store> = harness.store.clone();
    let dyn_provider: std::sync::Arc<dyn atelier_engine::ComputeProvider> =
        harness.provider.clone();
    let resolved = sweeps::poll_tick(&dyn_store, &dyn_provider, &harness.lifecycle, &config)
        .await
        .unwrap();
    assert_eq!(resolved, 1);

    let stored = harness.store.get_job(&job.id).unwrap().unwrap();
    assert!(stored.is_terminal());

    // A second tick has nothing left to do.
    let resolved = sweeps::poll_tick(&dyn_store, &dyn_provider, &harness.lifecycle, &config)
        .await
        .unwrap();
    assert_eq!(resolved, 0);
}

#[tokio::test]
async fn timeout_tick_fails_and_refunds_stuck_jobs() {
    let harness = Harness::new();
    let user_id = harness.funded_user(100);
    harness
        .lifecycle
        .submit(SubmitRequest {
            user_id,
            unit_cost: 10,
            package_id: None,
            request: image_request(),
        })
        .await
        .unwrap();
    assert_eq!(harness.available(&user_id), 90);

    // Zero timeout: everything non-terminal is immediately stuck.
    let config = SweepConfig {
        job_timeout: std::time::Duration::ZERO,
        ..SweepConfig::default()
    };
    let dyn_store: std::sync::Arc<dyn Store> = harness.store.clone();
    let timed_out = sweeps::timeout_tick(&dyn_store, &harness.lifecycle, &config)
        .await
        .unwrap();
    assert_eq!(timed_out, 1);
    assert_eq!(harness.available(&user_id), 100);

    // Re-running the sweep finds nothing: the transition already landed.
    let timed_out = sweeps::timeout_tick(&dyn_store, &harness.lifecycle, &config)
        .await
        .unwrap();
    assert_eq!(timed_out, 0);
}
