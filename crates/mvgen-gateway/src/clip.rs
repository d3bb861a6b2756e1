//! Video clip generation client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{Capability, JobToken, PollOutcome};
use crate::config::{read_json, ServiceConfig};
use crate::error::{GatewayError, GatewayResult};

const SERVICE: &str = "clip_synthesis";

/// Body of a clip generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipParams {
    /// Scene description derived from one lyric line
    pub prompt: String,
    /// Visual style
    pub style: String,
    /// Requested clip length (seconds)
    pub duration: u32,
}

#[derive(Debug, Deserialize)]
struct Generation {
    id: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    assets: Option<Assets>,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Assets {
    video: Option<String>,
}

/// Client for the clip generation service.
pub struct ClipSynthesisClient {
    http: Client,
    config: ServiceConfig,
}

impl ClipSynthesisClient {
    pub fn new(config: ServiceConfig) -> GatewayResult<Self> {
        let http = config.http_client()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Capability for ClipSynthesisClient {
    type Params = ClipParams;
    /// Remote URL of the generated clip.
    type Payload = String;

    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn submit_once(&self, params: &ClipParams) -> GatewayResult<JobToken> {
        let url = self.config.endpoint("generations");
        debug!("Submitting clip generation to {}", url);

        let response = self
            .config
            .authorize(self.http.post(&url))
            .json(params)
            .send()
            .await?;
        let generation: Generation = read_json(SERVICE, response).await?;

        generation
            .id
            .filter(|id| !id.is_empty())
            .map(JobToken::new)
            .ok_or_else(|| GatewayError::invalid_response("no id in generation response"))
    }

    async fn poll_once(&self, token: &JobToken) -> GatewayResult<PollOutcome<String>> {
        let url = self.config.endpoint(&format!("generations/{}", token));
        let response = self.config.authorize(self.http.get(&url)).send().await?;
        let generation: Generation = read_json(SERVICE, response).await?;

        Ok(match generation.state.as_str() {
            "completed" => match generation.assets.and_then(|a| a.video) {
                Some(video) => PollOutcome::Completed(video),
                None => PollOutcome::Failed(format!("generation {} completed without a video", token)),
            },
            "failed" => PollOutcome::Failed(
                generation
                    .failure_reason
                    .unwrap_or_else(|| format!("generation {} failed", token)),
            ),
            _ => PollOutcome::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ClipSynthesisClient {
        let config = ServiceConfig::new(server.uri(), Some("secret".to_string()), Duration::from_secs(5)).unwrap();
        ClipSynthesisClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_prompt_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generations"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "prompt": "anime scene: rain",
                "style": "anime",
                "duration": 5
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "gen-1",
                "state": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let params = ClipParams {
            prompt: "anime scene: rain".to_string(),
            style: "anime".to_string(),
            duration: 5,
        };
        let token = client(&server).submit(&params).await.unwrap();
        assert_eq!(token.as_str(), "gen-1");
    }

    #[tokio::test]
    async fn test_poll_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generations/done"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "done",
                "state": "completed",
                "assets": {"video": "https://cdn.example.com/done.mp4"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generations/dreaming"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "dreaming",
                "state": "dreaming"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generations/refused"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "refused",
                "state": "failed",
                "failure_reason": "prompt blocked"
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.poll(&JobToken::new("done")).await,
            PollOutcome::Completed("https://cdn.example.com/done.mp4".to_string())
        );
        assert!(client.poll(&JobToken::new("dreaming")).await.is_pending());
        assert_eq!(
            client.poll(&JobToken::new("refused")).await,
            PollOutcome::Failed("prompt blocked".to_string())
        );
        // Unmatched path answers 404; still pending for this cycle.
        assert!(client.poll(&JobToken::new("missing")).await.is_pending());
    }
}
