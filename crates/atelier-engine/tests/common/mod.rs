//! Shared harness for engine integration tests.

#![allow(dead_code)] // Utilities are shared across test files.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use atelier_core::{CreditAccount, CreditOp, TerminalOutcome, UserId};
use atelier_engine::{
    ComputeProvider, CreditManager, GenerationRequest, JobLifecycle, MediaKind, Notifier,
    PackageStatusChange, ProviderError, Reconciler,
};
use atelier_store::{RocksStore, Store};

/// Scripted provider double: hands out sequential external IDs, can be
/// told to reject submissions, and serves poll outcomes from a table.
#[derive(Default)]
pub struct MockProvider {
    fail_create: AtomicBool,
    counter: AtomicU64,
    poll_outcomes: Mutex<HashMap<String, TerminalOutcome>>,
}

impl MockProvider {
    pub fn reject_submissions(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn set_poll_outcome(&self, external_job_id: &str, outcome: TerminalOutcome) {
        self.poll_outcomes
            .lock()
            .unwrap()
            .insert(external_job_id.to_string(), outcome);
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    async fn create_job(
        &self,
        _job_id: atelier_core::JobId,
        _request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                message: "no capacity".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ext-{n}"))
    }

    async fn fetch_job(
        &self,
        external_job_id: &str,
    ) -> Result<Option<TerminalOutcome>, ProviderError> {
        Ok(self
            .poll_outcomes
            .lock()
            .unwrap()
            .get(external_job_id)
            .cloned())
    }
}

/// Notifier double that records every delivered change.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<PackageStatusChange>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<PackageStatusChange> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn package_status_changed(&self, change: &PackageStatusChange) {
        self.events.lock().unwrap().push(change.clone());
    }
}

/// Everything an engine test needs, wired over a throwaway database.
pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<RocksStore>,
    pub provider: Arc<MockProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub credits: CreditManager,
    pub reconciler: Reconciler,
    pub lifecycle: Arc<JobLifecycle>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(dir.path()).expect("Failed to open store"));
        let provider = Arc::new(MockProvider::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let dyn_store: Arc<dyn Store> = store.clone();
        let credits = CreditManager::new(dyn_store.clone());
        let reconciler = Reconciler::new(dyn_store.clone(), notifier.clone());
        let lifecycle = Arc::new(JobLifecycle::new(
            dyn_store,
            provider.clone(),
            credits.clone(),
            reconciler.clone(),
        ));

        Self {
            _dir: dir,
            store,
            provider,
            notifier,
            credits,
            reconciler,
            lifecycle,
        }
    }

    /// Create an account funded with a single long-lived bundle.
    pub fn funded_user(&self, credits: i64) -> UserId {
        let now = Utc::now();
        let user_id = UserId::generate();
        self.store
            .create_account(&CreditAccount::new(user_id, now))
            .unwrap();
        if credits > 0 {
            self.store
                .credit_account(
                    &user_id,
                    &CreditOp::GrantBundle {
                        amount: credits,
                        valid_until: now + Duration::days(90),
                        payment_ref: None,
                    },
                    now,
                )
                .unwrap();
        }
        user_id
    }

    pub fn available(&self, user_id: &UserId) -> i64 {
        self.credits.availability(user_id, Utc::now()).unwrap().total
    }
}

pub fn image_request() -> GenerationRequest {
    GenerationRequest {
        kind: MediaKind::Image,
        prompt: "a lighthouse at dusk".into(),
        width: 1024,
        height: 1024,
        duration_secs: None,
    }
}
