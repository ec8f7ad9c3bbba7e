use axum::Router;
use axum::routing::get;
use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{job_id}/progress", get(handler::get_job_progress))
}
