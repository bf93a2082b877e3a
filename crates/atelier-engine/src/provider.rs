//! Compute provider boundary.
//!
//! The provider runs generation jobs for us. Two inbound shapes carry the
//! same semantic payload: the push callback the provider delivers when a
//! job finishes, and the poll response the recovery sweep fetches when a
//! callback never arrived. Both funnel into [`TerminalOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use atelier_core::{JobId, TerminalOutcome};

/// Error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error.
    #[error("provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },
}

/// What kind of media a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image generation.
    Image,

    /// Video generation.
    Video,
}

/// Parameters for one generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Media kind to produce.
    pub kind: MediaKind,

    /// Text prompt.
    pub prompt: String,

    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Clip length for video jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
}

/// The external compute provider seam.
///
/// `HttpComputeProvider` is the production implementation; tests plug in
/// scripted fakes.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Ask the provider to start a job. Returns the provider-side job ID.
    async fn create_job(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError>;

    /// Query the provider for a job's state. Returns `None` while the job
    /// is still running.
    async fn fetch_job(&self, external_job_id: &str)
        -> Result<Option<TerminalOutcome>, ProviderError>;
}

/// Terminal status reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// The job produced artifacts.
    Succeeded,

    /// The job failed.
    Failed,
}

/// Push-callback body delivered by the provider when a job finishes.
///
/// The poll path normalizes its response into this same shape before
/// conversion, so both paths apply identical outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Provider-side job ID.
    pub external_job_id: String,

    /// Terminal status.
    pub status: CallbackStatus,

    /// Artifact references (success only).
    #[serde(default)]
    pub result_refs: Vec<String>,

    /// Failure detail (failure only).
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackPayload {
    /// Convert into the shared terminal outcome.
    #[must_use]
    pub fn into_outcome(self) -> TerminalOutcome {
        match self.status {
            CallbackStatus::Succeeded => TerminalOutcome::Completed {
                result_refs: self.result_refs,
            },
            CallbackStatus::Failed => TerminalOutcome::Failed {
                error: self
                    .error
                    .unwrap_or_else(|| "provider reported failure without detail".into()),
            },
        }
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    client_job_id: String,
    #[serde(flatten)]
    request: &'a GenerationRequest,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: ExternalJobStatus,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExternalJobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

/// HTTP client for the render farm API.
#[derive(Debug, Clone)]
pub struct HttpComputeProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpComputeProvider {
    /// Create a new provider client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unreadable error body".into());
        ProviderError::Api { status, message }
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn create_job(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/generations", self.base_url);
        let body = CreateJobRequest {
            client_job_id: job_id.to_string(),
            request,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let created: CreateJobResponse = response.json().await?;
        Ok(created.id)
    }

    async fn fetch_job(
        &self,
        external_job_id: &str,
    ) -> Result<Option<TerminalOutcome>, ProviderError> {
        let url = format!("{}/v1/generations/{}", self.base_url, external_job_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let status: JobStatusResponse = response.json().await?;
        let outcome = match status.status {
            ExternalJobStatus::Queued | ExternalJobStatus::Processing => None,
            ExternalJobStatus::Succeeded => Some(TerminalOutcome::Completed {
                result_refs: status.outputs,
            }),
            ExternalJobStatus::Failed => Some(TerminalOutcome::Failed {
                error: status
                    .error
                    .unwrap_or_else(|| "provider reported failure without detail".into()),
            }),
        };
        Ok(outcome)
    }
}
