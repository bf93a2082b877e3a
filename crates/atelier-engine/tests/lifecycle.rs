//! Job lifecycle integration tests: submission, refunds, and the
//! terminal-transition race.

mod common;

use common::{image_request, Harness};

use atelier_core::{
    JobStatus, TerminalOutcome, TerminalSource, TransactionFilter, TransactionKind,
};
use atelier_engine::{CallbackPayload, CallbackStatus, EngineError, SubmitRequest};
use atelier_store::{Store, StoreError};

fn submit_request(harness: &Harness, unit_cost: i64) -> SubmitRequest {
    SubmitRequest {
        user_id: harness.funded_user(100),
        unit_cost,
        package_id: None,
        request: image_request(),
    }
}

#[tokio::test]
async fn submit_deducts_and_dispatches() {
    let harness = Harness::new();
    let req = submit_request(&harness, 10);
    let user_id = req.user_id;

    let job = harness.lifecycle.submit(req).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.external_job_id.is_some());
    assert_eq!(harness.available(&user_id), 90);

    let spent = harness
        .store
        .list_transactions(
            &user_id,
            &TransactionFilter {
                kind: Some(TransactionKind::Spent),
                ..TransactionFilter::default()
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].amount, -10);
    assert_eq!(
        spent[0].reference_id.as_deref(),
        Some(job.id.to_string().as_str())
    );
}

#[tokio::test]
async fn submit_fails_fast_when_unaffordable() {
    let harness = Harness::new();
    let mut req = submit_request(&harness, 10);
    req.unit_cost = 500;
    let user_id = req.user_id;

    let err = harness.lifecycle.submit(req).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::InsufficientCredits {
            available: 100,
            required: 500
        })
    ));
    // Nothing was recorded and nothing was charged.
    assert_eq!(harness.available(&user_id), 100);
    assert!(harness
        .store
        .list_unresolved_jobs(chrono::Utc::now())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn submission_failure_marks_failed_and_refunds() {
    let harness = Harness::new();
    harness.provider.reject_submissions();
    let req = submit_request(&harness, 10);
    let user_id = req.user_id;

    let err = harness.lifecycle.submit(req).await.unwrap_err();
    let EngineError::Submission { job_id, .. } = err else {
        panic!("provider rejection must surface as a submission error");
    };

    let job = harness.store.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("submission"));

    // The deduction and its reversal both sit in the ledger.
    assert_eq!(harness.available(&user_id), 100);
    let refunds = harness
        .store
        .list_transactions(
            &user_id,
            &TransactionFilter {
                kind: Some(TransactionKind::Refunded),
                ..TransactionFilter::default()
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 10);
}

#[tokio::test]
async fn duplicate_callback_yields_one_refund() {
    let harness = Harness::new();
    let req = submit_request(&harness, 10);
    let user_id = req.user_id;
    let job = harness.lifecycle.submit(req).await.unwrap();

    let payload = CallbackPayload {
        external_job_id: job.external_job_id.clone().unwrap(),
        status: CallbackStatus::Failed,
        result_refs: vec![],
        error: Some("render crashed".into()),
    };

    let first = harness
        .lifecycle
        .handle_callback(payload.clone())
        .await
        .unwrap();
    assert!(first.is_some());

    // Same payload delivered again: logged no-op.
    let second = harness.lifecycle.handle_callback(payload).await.unwrap();
    assert!(second.is_none());

    assert_eq!(harness.available(&user_id), 100);
    let refunds = harness
        .store
        .list_transactions(
            &user_id,
            &TransactionFilter {
                kind: Some(TransactionKind::Refunded),
                ..TransactionFilter::default()
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(refunds.len(), 1);
}

#[tokio::test]
async fn callback_and_poll_race_applies_once() {
    let harness = Harness::new();
    let req = submit_request(&harness, 10);
    let user_id = req.user_id;
    let job = harness.lifecycle.submit(req).await.unwrap();
    let external_id = job.external_job_id.clone().unwrap();

    let outcome = TerminalOutcome::Failed {
        error: "render crashed".into(),
    };
    let callback = harness.lifecycle.handle_callback(CallbackPayload {
        external_job_id: external_id,
        status: CallbackStatus::Failed,
        result_refs: vec![],
        error: Some("render crashed".into()),
    });
    let poll = harness
        .lifecycle
        .apply_terminal(&job.id, &outcome, TerminalSource::Poll);

    let (callback_result, poll_result) = tokio::join!(callback, poll);
    let applied = [
        callback_result.unwrap().is_some(),
        poll_result.unwrap().is_some(),
    ];
    assert_eq!(applied.iter().filter(|won| **won).count(), 1);

    // Exactly one refund regardless of which path won.
    assert_eq!(harness.available(&user_id), 100);
    let refunds = harness
        .store
        .list_transactions(
            &user_id,
            &TransactionFilter {
                kind: Some(TransactionKind::Refunded),
                ..TransactionFilter::default()
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(refunds.len(), 1);
}

#[tokio::test]
async fn completed_job_stores_results_without_refund() {
    let harness = Harness::new();
    let req = submit_request(&harness, 10);
    let user_id = req.user_id;
    let job = harness.lifecycle.submit(req).await.unwrap();

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

    let stored = harness.store.get_job(&job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result_refs, vec!["s3://out/1.png".to_string()]);
    assert!(stored.completed_at.is_some());

    // Success keeps the charge.
    assert_eq!(harness.available(&user_id), 90);
}

#[tokio::test]
async fn unknown_external_job_is_an_error() {
    let harness = Harness::new();
    let err = harness
        .lifecycle
        .handle_callback(CallbackPayload {
            external_job_id: "never-seen".into(),
            status: CallbackStatus::Succeeded,
            result_refs: vec![],
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownExternalJob { .. }));
}

#[tokio::test]
async fn concurrent_submissions_respect_the_budget() {
    // Budget covers 3 of 4 submissions.
    let harness = Harness::new();
    let user_id = harness.funded_user(30);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let lifecycle = harness.lifecycle.clone();
        let req = SubmitRequest {
            user_id,
            unit_cost: 10,
            package_id: None,
            request: image_request(),
        };
        tasks.push(tokio::spawn(async move { lifecycle.submit(req).await }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::Store(StoreError::InsufficientCredits { .. })) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 3);
    assert_eq!(insufficient, 1);
    assert_eq!(harness.available(&user_id), 0);
}
