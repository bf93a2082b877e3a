//! End-to-end HTTP flows: accounts, grants, submission, callback, and
//! package status.

mod common;

use common::TestHarness;
use serde_json::json;

use atelier_core::UserId;

// ============================================================================
// Health & Accounts
// ============================================================================

#[tokio::test]
async fn health_check() {
    let harness = TestHarness::new().await;
    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_account_then_read_breakdown() {
    let harness = TestHarness::new().await;
    let user_id = UserId::generate();

    harness
        .server
        .post("/v1/accounts")
        .json(&json!({ "user_id": user_id.to_string() }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/accounts/{user_id}"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 0);
    assert_eq!(body["subscription_remaining"], 0);
}

#[tokio::test]
async fn duplicate_account_conflicts() {
    let harness = TestHarness::new().await;
    let user_id = UserId::generate();
    let payload = json!({ "user_id": user_id.to_string() });

    harness
        .server
        .post("/v1/accounts")
        .json(&payload)
        .await
        .assert_status_ok();
    let response = harness.server.post("/v1/accounts").json(&payload).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_account_is_404() {
    let harness = TestHarness::new().await;
    let response = harness
        .server
        .get(&format!("/v1/accounts/{}", UserId::generate()))
        .await;
    response.assert_status_not_found();
}

// ============================================================================
// Grants & Balance
// ============================================================================

#[tokio::test]
async fn bundle_grant_shows_in_balance() {
    let harness = TestHarness::new().await;
    let user_id = harness.funded_user(250).await;

    let response = harness
        .server
        .get(&format!("/v1/credits/{user_id}/balance"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 250);
    assert_eq!(body["bundle_total"], 250);
}

#[tokio::test]
async fn renewal_grant_sets_subscription_allotment() {
    let harness = TestHarness::new().await;
    let user_id = harness.funded_user(0).await;

    let expires = chrono::Utc::now() + chrono::Duration::days(30);
    harness
        .server
        .post("/v1/credits/grant")
        .json(&json!({
            "user_id": user_id.to_string(),
            "grant": "renewal",
            "credits_limit": 500,
            "cycle_expires_at": expires.to_rfc3339(),
        }))
        .await
        .assert_status_ok();

    let body: serde_json::Value = harness
        .server
        .get(&format!("/v1/credits/{user_id}/balance"))
        .await
        .json();
    assert_eq!(body["available"], 500);
    assert_eq!(body["subscription_remaining"], 500);
}

#[tokio::test]
async fn transactions_list_filters_by_kind() {
    let harness = TestHarness::new().await;
    let user_id = harness.funded_user(100).await;

    let response = harness
        .server
        .get(&format!(
            "/v1/credits/{user_id}/transactions?kind=earned&limit=10"
        ))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["kind"], "earned");
    assert_eq!(body["has_more"], false);
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn submit_job_deducts_and_returns_processing() {
    let harness = TestHarness::new().await;
    harness.accept_submissions("gen_1").await;
    let user_id = harness.funded_user(100).await;

    let response = harness
        .server
        .post("/v1/jobs")
        .json(&json!({
            "user_id": user_id.to_string(),
            "unit_cost": 10,
            "kind": "image",
            "prompt": "a lighthouse at dusk",
            "width": 1024,
            "height": 1024,
        }))
        .await;
    response.assert_status_ok();
    let job: serde_json::Value = response.json();
    assert_eq!(job["status"], "processing");
    assert_eq!(job["external_job_id"], "gen_1");

    let balance: serde_json::Value = harness
        .server
        .get(&format!("/v1/credits/{user_id}/balance"))
        .await
        .json();
    assert_eq!(balance["available"], 90);
}

#[tokio::test]
async fn submit_without_credits_is_402() {
    let harness = TestHarness::new().await;
    harness.accept_submissions("gen_1").await;
    let user_id = harness.funded_user(5).await;

    let response = harness
        .server
        .post("/v1/jobs")
        .json(&json!({
            "user_id": user_id.to_string(),
            "unit_cost": 10,
            "kind": "image",
            "prompt": "a lighthouse at dusk",
            "width": 1024,
            "height": 1024,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["available"], 5);
}

#[tokio::test]
async fn provider_rejection_refunds_the_charge() {
    let harness = TestHarness::new().await;
    harness.reject_submissions().await;
    let user_id = harness.funded_user(100).await;

    let response = harness
        .server
        .post("/v1/jobs")
        .json(&json!({
            "user_id": user_id.to_string(),
            "unit_cost": 10,
            "kind": "image",
            "prompt": "a lighthouse at dusk",
            "width": 1024,
            "height": 1024,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);

    let balance: serde_json::Value = harness
        .server
        .get(&format!("/v1/credits/{user_id}/balance"))
        .await
        .json();
    assert_eq!(balance["available"], 100);

    let history: serde_json::Value = harness
        .server
        .get(&format!("/v1/credits/{user_id}/transactions?kind=refunded"))
        .await
        .json();
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Callback → Package flow
// ============================================================================

#[tokio::test]
async fn full_batch_flow_completes_package() {
    let harness = TestHarness::new().await;
    harness.accept_submissions("gen_1").await;
    let user_id = harness.funded_user(100).await;

    // Create a single-job package.
    let package: serde_json::Value = harness
        .server
        .post("/v1/packages")
        .json(&json!({ "user_id": user_id.to_string(), "total_expected": 1 }))
        .await
        .json();
    let package_id = package["id"].as_str().unwrap().to_string();

    // Submit the job into it.
    let job: serde_json::Value = harness
        .server
        .post("/v1/jobs")
        .json(&json!({
            "user_id": user_id.to_string(),
            "unit_cost": 10,
            "package_id": package_id,
            "kind": "image",
            "prompt": "a lighthouse at dusk",
            "width": 1024,
            "height": 1024,
        }))
        .await
        .json();
    let job_id = job["id"].as_str().unwrap().to_string();

    // Provider pushes the completion callback.
    let callback = harness
        .server
        .post("/webhooks/provider")
        .json(&json!({
            "external_job_id": "gen_1",
            "status": "succeeded",
            "result_refs": ["s3://out/1.png"],
        }))
        .await;
    callback.assert_status_ok();
    let body: serde_json::Value = callback.json();
    assert_eq!(body["applied"], true);

    // The terminal transition stored results and reconciled the package.
    let stored_job: serde_json::Value = harness
        .server
        .get(&format!("/v1/jobs/{job_id}"))
        .await
        .json();
    assert_eq!(stored_job["status"], "completed");
    assert_eq!(stored_job["result_refs"][0], "s3://out/1.png");

    let stored_package: serde_json::Value = harness
        .server
        .get(&format!("/v1/packages/{package_id}"))
        .await
        .json();
    assert_eq!(stored_package["status"], "completed");
    assert_eq!(stored_package["generated_count"], 1);
    assert_eq!(stored_package["failed_count"], 0);
}

#[tokio::test]
async fn duplicate_callback_reports_not_applied() {
    let harness = TestHarness::new().await;
    harness.accept_submissions("gen_1").await;
    let user_id = harness.funded_user(100).await;

    harness
        .server
        .post("/v1/jobs")
        .json(&json!({
            "user_id": user_id.to_string(),
            "unit_cost": 10,
            "kind": "image",
            "prompt": "a lighthouse at dusk",
            "width": 1024,
            "height": 1024,
        }))
        .await
        .assert_status_ok();

    let payload = json!({
        "external_job_id": "gen_1",
        "status": "failed",
        "error": "render crashed",
    });
    let first: serde_json::Value = harness
        .server
        .post("/webhooks/provider")
        .json(&payload)
        .await
        .json();
    assert_eq!(first["applied"], true);

    let second: serde_json::Value = harness
        .server
        .post("/webhooks/provider")
        .json(&payload)
        .await
        .json();
    assert_eq!(second["applied"], false);

    // Exactly one refund despite two deliveries.
    let history: serde_json::Value = harness
        .server
        .get(&format!("/v1/credits/{user_id}/transactions?kind=refunded"))
        .await
        .json();
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn callback_for_unknown_job_is_404() {
    let harness = TestHarness::new().await;
    let response = harness
        .server
        .post("/webhooks/provider")
        .json(&json!({
            "external_job_id": "never-seen",
            "status": "succeeded",
        }))
        .await;
    response.assert_status_not_found();
}
