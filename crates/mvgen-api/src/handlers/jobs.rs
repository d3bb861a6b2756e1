//! Job status queries.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use mvgen_models::JobId;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /api/jobs/:job_id`. Unknown ids answer `404` with status `unknown`.
pub async fn get_job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let job_id = JobId::from_string(job_id);
    let view = state.orchestrator.status(&job_id).await?;

    let status = if view.is_unknown() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };

    Ok((status, Json(view)).into_response())
}
