//! Package handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use atelier_core::{Package, PackageId, PackageStatus, UserId};
use atelier_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Create package request.
#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    /// The owning user.
    pub user_id: String,
    /// Number of jobs the batch will contain.
    pub total_expected: u32,
}

/// Package response.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    /// Package ID.
    pub id: String,
    /// The owning user.
    pub user_id: String,
    /// Expected job count.
    pub total_expected: u32,
    /// Jobs completed successfully.
    pub generated_count: u32,
    /// Jobs failed.
    pub failed_count: u32,
    /// Aggregate status.
    pub status: PackageStatus,
    /// Creation instant.
    pub created_at: String,
    /// Terminal instant, if reached.
    pub completed_at: Option<String>,
}

impl From<&Package> for PackageResponse {
    fn from(package: &Package) -> Self {
        Self {
            id: package.id.to_string(),
            user_id: package.user_id.to_string(),
            total_expected: package.total_expected,
            generated_count: package.generated_count,
            failed_count: package.failed_count,
            status: package.status,
            created_at: package.created_at.to_rfc3339(),
            completed_at: package.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Create a package shell for a batch of jobs.
pub async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePackageRequest>,
) -> Result<Json<PackageResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    if body.total_expected == 0 {
        return Err(ApiError::BadRequest(
            "total_expected must be positive".into(),
        ));
    }

    let package = Package::new(user_id, body.total_expected, Utc::now());
    state.store.put_package(&package)?;

    tracing::info!(
        package_id = %package.id,
        user_id = %user_id,
        total_expected = %body.total_expected,
        "package created"
    );
    Ok(Json(PackageResponse::from(&package)))
}

/// Read a package row for progress display.
pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(package_id): Path<String>,
) -> Result<Json<PackageResponse>, ApiError> {
    let package_id: PackageId = package_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid package ID".into()))?;

    let package = state
        .store
        .get_package(&package_id)?
        .ok_or_else(|| ApiError::NotFound("Package not found".into()))?;

    Ok(Json(PackageResponse::from(&package)))
}
