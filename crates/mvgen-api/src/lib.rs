//! Axum HTTP API server.
//!
//! This crate provides:
//! - Music video submission and job status endpoints
//! - Lyric candidate drafts
//! - Per-IP rate limiting, request ids and CORS
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{JobBackend, LyricsComposer, Orchestrator};
pub use state::AppState;
