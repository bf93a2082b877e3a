//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, jobs, packages, webhooks};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts
/// - `POST /v1/accounts` - Create an account
/// - `GET /v1/accounts/{user_id}` - Account with availability breakdown
///
/// ## Credits
/// - `GET /v1/credits/{user_id}/balance` - Current availability
/// - `GET /v1/credits/{user_id}/transactions` - Ledger history
/// - `POST /v1/credits/grant` - Renewal or bundle grant
///
/// ## Jobs & Packages
/// - `POST /v1/jobs` - Submit a generation job
/// - `GET /v1/jobs/{id}` - Job status
/// - `POST /v1/packages` - Create a batch shell
/// - `GET /v1/packages/{id}` - Derived package status
///
/// ## Webhooks
/// - `POST /webhooks/provider` - Provider push callback
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);
    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route("/v1/accounts/:user_id", get(accounts::get_account))
        // Credits
        .route("/v1/credits/:user_id/balance", get(credits::get_balance))
        .route(
            "/v1/credits/:user_id/transactions",
            get(credits::list_transactions),
        )
        .route("/v1/credits/grant", post(credits::grant_credits))
        // Jobs
        .route("/v1/jobs", post(jobs::submit_job))
        .route("/v1/jobs/:job_id", get(jobs::get_job))
        // Packages
        .route("/v1/packages", post(packages::create_package))
        .route("/v1/packages/:package_id", get(packages::get_package))
        // Webhooks
        .route("/webhooks/provider", post(webhooks::provider_callback))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
