//! Service configuration.

use std::time::Duration;

use atelier_engine::SweepConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/atelier").
    pub data_dir: String,

    /// Compute provider API base URL.
    pub provider_base_url: String,

    /// Compute provider API key.
    pub provider_api_key: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Seconds a dispatched job may go quiet before the recovery poll
    /// queries the provider.
    pub poll_after_seconds: u64,

    /// Seconds before a non-terminal job is forced to failure.
    pub job_timeout_seconds: u64,

    /// Interval between recovery poll ticks, in seconds.
    pub poll_interval_seconds: u64,

    /// Interval between timeout ticks, in seconds.
    pub timeout_interval_seconds: u64,

    /// Interval between reconcile ticks, in seconds.
    pub reconcile_interval_seconds: u64,

    /// Interval between bundle expiry ticks, in seconds.
    pub expiry_interval_seconds: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/atelier".into()),
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9800".into()),
            provider_api_key: std::env::var("PROVIDER_API_KEY").unwrap_or_default(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", 1024 * 1024),
            request_timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", 30),
            poll_after_seconds: env_or("POLL_AFTER_SECONDS", 120),
            job_timeout_seconds: env_or("JOB_TIMEOUT_SECONDS", 30 * 60),
            poll_interval_seconds: env_or("POLL_INTERVAL_SECONDS", 60),
            timeout_interval_seconds: env_or("TIMEOUT_INTERVAL_SECONDS", 5 * 60),
            reconcile_interval_seconds: env_or("RECONCILE_INTERVAL_SECONDS", 60),
            expiry_interval_seconds: env_or("EXPIRY_INTERVAL_SECONDS", 60 * 60),
        }
    }

    /// The sweep tunables derived from this configuration.
    #[must_use]
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            poll_after: Duration::from_secs(self.poll_after_seconds),
            job_timeout: Duration::from_secs(self.job_timeout_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            timeout_interval: Duration::from_secs(self.timeout_interval_seconds),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_seconds),
            expiry_interval: Duration::from_secs(self.expiry_interval_seconds),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/atelier".into(),
            provider_base_url: "http://localhost:9800".into(),
            provider_api_key: String::new(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            poll_after_seconds: 120,
            job_timeout_seconds: 30 * 60,
            poll_interval_seconds: 60,
            timeout_interval_seconds: 5 * 60,
            reconcile_interval_seconds: 60,
            expiry_interval_seconds: 60 * 60,
        }
    }
}
