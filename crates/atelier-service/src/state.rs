//! Application state.

use std::sync::Arc;

use atelier_engine::{ComputeProvider, CreditManager, JobLifecycle, Notifier, Reconciler};
use atelier_store::{RocksStore, Store};

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Credit manager (single writer for accounts and the ledger).
    pub credits: CreditManager,

    /// Job lifecycle (submission + terminal transitions).
    pub lifecycle: Arc<JobLifecycle>,

    /// Package reconciler.
    pub reconciler: Reconciler,

    /// The compute provider client, shared with the sweeps.
    pub provider: Arc<dyn ComputeProvider>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Wire up the engine over a store, provider, and notifier.
    #[must_use]
    pub fn new(
        store: Arc<RocksStore>,
        provider: Arc<dyn ComputeProvider>,
        notifier: Arc<dyn Notifier>,
        config: ServiceConfig,
    ) -> Self {
        let dyn_store: Arc<dyn Store> = store.clone();
        let credits = CreditManager::new(dyn_store.clone());
        let reconciler = Reconciler::new(dyn_store.clone(), notifier);
        let lifecycle = Arc::new(JobLifecycle::new(
            dyn_store,
            provider.clone(),
            credits.clone(),
            reconciler.clone(),
        ));

        Self {
            store,
            credits,
            lifecycle,
            reconciler,
            provider,
            config,
        }
    }
}
