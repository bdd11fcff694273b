use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use pathforge_core::{GenerationParams, TaskId};
use pathforge_infra::jobs::{DispatchOutcome, ResultView};

use crate::app::dto::{GenerateResponse, PendingResponse, StatusResponse};
use crate::app::errors::{ApiError, json_error};
use crate::app::services::AppServices;

pub async fn generate(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return json_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let params = match GenerationParams::from_json(&body) {
        Ok(params) => params,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match services.dispatcher.dispatch(params).await {
        Ok(DispatchOutcome::Queued { task_id }) => {
            (StatusCode::ACCEPTED, Json(GenerateResponse::queued(task_id))).into_response()
        }
        Ok(DispatchOutcome::Finished { task_id, result }) => {
            (StatusCode::OK, Json(GenerateResponse::finished(task_id, result))).into_response()
        }
        Ok(DispatchOutcome::Failed { task_id, error }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(GenerateResponse::failed(task_id, error)),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> Response {
    match services.queries.status(&TaskId::from(task_id)).await {
        Ok(record) => Json(StatusResponse::from(record)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> Response {
    match services.queries.result(&TaskId::from(task_id)).await {
        Ok(ResultView::Ready(result)) => Json(result).into_response(),
        Ok(ResultView::Pending(status)) => {
            (StatusCode::ACCEPTED, Json(PendingResponse::new(status))).into_response()
        }
        Ok(ResultView::Failed(error)) => json_error(StatusCode::INTERNAL_SERVER_ERROR, error),
        Err(e) => ApiError::from(e).into_response(),
    }
}
