//! Lyric candidate drafts.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use mvgen_gateway::LyricsParams;
use mvgen_models::{describe_validation_errors, RequestValidationError};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Song brief for a lyrics draft.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LyricsRequest {
    #[validate(length(min = 1, max = 200, message = "subject is required (at most 200 characters)"))]
    pub subject: String,
    #[validate(length(min = 1, message = "at least one genre is required"))]
    pub genres: Vec<String>,
    #[validate(length(min = 1, max = 100, message = "language is required (at most 100 characters)"))]
    pub language: String,
    #[validate(length(min = 1, max = 100, message = "vocal is required (at most 100 characters)"))]
    pub vocal: String,
}

#[derive(Debug, Serialize)]
pub struct LyricsResponse {
    pub lyrics: Vec<String>,
}

/// `POST /api/lyrics`: three lyric candidates, answered synchronously.
pub async fn generate_lyrics(
    State(state): State<AppState>,
    payload: Result<Json<LyricsRequest>, JsonRejection>,
) -> ApiResult<Json<LyricsResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    request.validate().map_err(|errors| RequestValidationError {
        fields: describe_validation_errors(&errors),
    })?;

    let params = LyricsParams {
        subject: request.subject,
        genres: request.genres,
        language: request.language,
        vocal: request.vocal,
    };

    match state.lyrics.compose(&params).await {
        Ok(lyrics) => {
            metrics::record_lyrics_request("ok");
            Ok(Json(LyricsResponse { lyrics }))
        }
        Err(e) => {
            metrics::record_lyrics_request("failed");
            Err(e.into())
        }
    }
}
