use utoipa::OpenApi;
use crate::common::response::ApiResponse;
use crate::modules::media::dto::{HealthResponse, JobProgressResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::media::handler::get_job_progress,
        crate::modules::media::handler::health,
    ),
    components(
        schemas(
            JobProgressResponse,
            HealthResponse,
            ApiResponse<JobProgressResponse>,
            ApiResponse<HealthResponse>,
        )
    ),
    tags(
        (name = "Jobs", description = "Transcoding job monitoring"),
        (name = "Ops", description = "Service health")
    )
)]
pub struct ApiDoc;
