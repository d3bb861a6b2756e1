//! Clients for the remote generation services.
//!
//! Each capability follows the same contract: `submit` hands the job to the
//! service and returns a token, `poll` asks once for its status. The caller owns
//! the polling loop and its timeout.

pub mod audio;
pub mod capability;
pub mod clip;
pub mod config;
pub mod error;
pub mod text;

pub use audio::{AudioParams, AudioSynthesisClient};
pub use capability::{Capability, JobToken, PollOutcome};
pub use clip::{ClipParams, ClipSynthesisClient};
pub use config::{GatewayConfig, ServiceConfig};
pub use error::{GatewayError, GatewayResult};
pub use text::{LyricsParams, TextSynthesisClient, LYRIC_CANDIDATES};
