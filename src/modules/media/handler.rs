use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::media::dto::{HealthResponse, JobProgressResponse};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}/progress",
    params(
        ("job_id" = Uuid, Path, description = "Transcoding job ID")
    ),
    responses(
        (status = 200, description = "Job progress", body = ApiResponse<JobProgressResponse>),
        (status = 404, description = "No progress recorded for this job"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Jobs"
)]
pub async fn get_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.progress.read(job_id).await {
        Ok(Some(progress)) => ApiSuccess::ok(
            JobProgressResponse { job_id, progress },
            "Progress retrieved successfully",
        )
        .into_response(),
        Ok(None) => ApiError::not_found("No progress recorded for this job").into_response(),
        Err(e) => {
            error!(job_id = %job_id, "Failed to read progress: {}", e);
            ApiError::internal("Failed to read progress").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = ApiResponse<HealthResponse>),
        (status = 503, description = "A backing service is unreachable")
    ),
    tag = "Ops"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Database health check failed: {}", e);
            false
        }
    };
    let redis = match state.progress.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Redis health check failed: {}", e);
            false
        }
    };

    if database && redis {
        ApiSuccess::ok(HealthResponse { database, redis }, "ok").into_response()
    } else {
        ApiError::unavailable(format!(
            "Unhealthy backing services (database: {}, redis: {})",
            database, redis
        ))
        .into_response()
    }
}
