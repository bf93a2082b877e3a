//! Common test utilities for atelier-service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atelier_core::UserId;
use atelier_engine::{HttpComputeProvider, LogNotifier};
use atelier_service::{create_router, AppState, ServiceConfig};
use atelier_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Scripted compute provider the service talks to.
    pub provider: MockServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and provider stub.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let provider = MockServer::start().await;
        let http_provider = Arc::new(HttpComputeProvider::new(provider.uri(), "test-key"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            provider_base_url: provider.uri(),
            provider_api_key: "test-key".into(),
            ..ServiceConfig::default()
        };

        let state = AppState::new(store, http_provider, Arc::new(LogNotifier), config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            provider,
            _temp_dir: temp_dir,
        }
    }

    /// Stub the provider to accept job creation with a fixed external ID.
    pub async fn accept_submissions(&self, external_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/generations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": external_id })),
            )
            .mount(&self.provider)
            .await;
    }

    /// Stub the provider to reject job creation.
    pub async fn reject_submissions(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/generations"))
            .respond_with(ResponseTemplate::new(503).set_body_string("capacity exhausted"))
            .mount(&self.provider)
            .await;
    }

    /// Create an account and fund it with a bundle via the HTTP surface.
    pub async fn funded_user(&self, credits: i64) -> UserId {
        let user_id = UserId::generate();
        self.server
            .post("/v1/accounts")
            .json(&serde_json::json!({ "user_id": user_id.to_string() }))
            .await
            .assert_status_ok();

        if credits > 0 {
            let valid_until = chrono::Utc::now() + chrono::Duration::days(90);
            self.server
                .post("/v1/credits/grant")
                .json(&serde_json::json!({
                    "user_id": user_id.to_string(),
                    "grant": "bundle",
                    "amount": credits,
                    "valid_until": valid_until.to_rfc3339(),
                }))
                .await
                .assert_status_ok();
        }
        user_id
    }
}
