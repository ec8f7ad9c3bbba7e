use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobProgressResponse {
    pub job_id: Uuid,
    /// Advisory completion percentage, 0-100.
    pub progress: u8,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub database: bool,
    pub redis: bool,
}
