use axum::{
    Router,
    routing::{get, post},
};

pub mod system;
pub mod tasks;

/// Task endpoints. Mounted at the root and again under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/generate", post(tasks::generate))
        .route("/status/:task_id", get(tasks::status))
        .route("/result/:task_id", get(tasks::result))
        .route("/health", get(system::health))
}
