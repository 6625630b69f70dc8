use axum::routing::{get, post};
use axum::Router;
use crate::state::AppState;

pub mod cleanup;
pub mod dto;
pub mod events;
pub mod handler;
pub mod identity;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(handler::upload_video))
        .route("/download/{id}", get(handler::download_archive))
        .route("/jobs/{id}", get(handler::get_job))
}
