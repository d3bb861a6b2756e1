//! Music video submission.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use mvgen_models::GenerationRequest;
use mvgen_queue::SubmittedPipeline;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Accepted submission. `job_id` is the id to poll.
#[derive(Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub pipeline: SubmittedPipeline,
    pub status: &'static str,
}

/// `POST /api/music-videos`: validate, fan out and return immediately.
pub async fn submit_music_video(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let pipeline = state.orchestrator.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            pipeline,
            status: "pending",
        }),
    ))
}
