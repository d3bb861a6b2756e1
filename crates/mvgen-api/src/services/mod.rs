//! Services behind the HTTP handlers.

pub mod lyrics;
pub mod orchestrator;

pub use lyrics::LyricsComposer;
pub use orchestrator::{JobBackend, Orchestrator};
