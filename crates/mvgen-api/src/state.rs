//! Application state.

use std::sync::Arc;

use mvgen_gateway::{GatewayConfig, TextSynthesisClient};
use mvgen_queue::{PipelineGraph, QueueConfig};

use crate::config::ApiConfig;
use crate::services::{JobBackend, LyricsComposer, Orchestrator};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Orchestrator,
    pub lyrics: Arc<dyn LyricsComposer>,
}

impl AppState {
    pub fn new(config: ApiConfig, backend: Arc<dyn JobBackend>, lyrics: Arc<dyn LyricsComposer>) -> Self {
        Self {
            config,
            orchestrator: Orchestrator::new(backend),
            lyrics,
        }
    }

    /// Connect to Redis and build the gateway clients from the environment.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let graph = PipelineGraph::connect(QueueConfig::from_env())?;
        // Consumer groups start at `$`; they must exist before the first enqueue.
        graph.queue().init().await?;

        let gateway = GatewayConfig::from_env()?;
        let lyrics = TextSynthesisClient::new(gateway.text, gateway.text_model)?;

        Ok(Self::new(config, Arc::new(graph), Arc::new(lyrics)))
    }
}
