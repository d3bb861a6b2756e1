//! Request handlers.

pub mod health;
pub mod jobs;
pub mod lyrics;
pub mod music_videos;

pub use health::*;
pub use jobs::*;
pub use lyrics::*;
pub use music_videos::*;
