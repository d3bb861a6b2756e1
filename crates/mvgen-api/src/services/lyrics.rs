//! Lyric candidate drafts.

use async_trait::async_trait;

use mvgen_gateway::{GatewayResult, LyricsParams, TextSynthesisClient};

/// Produces lyric candidates for a song brief.
#[async_trait]
pub trait LyricsComposer: Send + Sync {
    async fn compose(&self, params: &LyricsParams) -> GatewayResult<Vec<String>>;
}

#[async_trait]
impl LyricsComposer for TextSynthesisClient {
    async fn compose(&self, params: &LyricsParams) -> GatewayResult<Vec<String>> {
        TextSynthesisClient::compose(self, params).await
    }
}
