//! Music generation client (Suno-compatible API).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use mvgen_models::{AudioResult, GenerationRequest};

use crate::capability::{Capability, JobToken, PollOutcome};
use crate::config::{read_json, ServiceConfig};
use crate::error::{GatewayError, GatewayResult};

const SERVICE: &str = "audio_synthesis";

/// Body of a music generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioParams {
    /// Lyrics sung in the track
    pub prompt: String,
    /// Comma-separated style tags
    pub tags: String,
    /// Lyrics are supplied verbatim
    pub custom_mode: bool,
    /// Track title
    pub title: String,
}

impl From<&GenerationRequest> for AudioParams {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            prompt: request.lyrics.clone(),
            tags: request.audio_tags(),
            custom_mode: true,
            title: request.subject.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    data: Option<CreateData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateData {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    data: Option<TaskData>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    clips: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the music generation service.
pub struct AudioSynthesisClient {
    http: Client,
    config: ServiceConfig,
}

impl AudioSynthesisClient {
    pub fn new(config: ServiceConfig) -> GatewayResult<Self> {
        let http = config.http_client()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Capability for AudioSynthesisClient {
    type Params = AudioParams;
    /// Candidate renditions in response order.
    type Payload = Vec<AudioResult>;

    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn submit_once(&self, params: &AudioParams) -> GatewayResult<JobToken> {
        let url = self.config.endpoint("create");
        debug!("Submitting music generation to {}", url);

        let response = self
            .config
            .authorize(self.http.post(&url))
            .json(params)
            .send()
            .await?;
        let body: CreateResponse = read_json(SERVICE, response).await?;

        match body.data {
            Some(data) if !data.task_id.is_empty() => Ok(JobToken::new(data.task_id)),
            _ => Err(GatewayError::invalid_response(format!(
                "no task_id in create response ({})",
                body.message.unwrap_or_default()
            ))),
        }
    }

    async fn poll_once(&self, token: &JobToken) -> GatewayResult<PollOutcome<Vec<AudioResult>>> {
        let url = self.config.endpoint(&format!("clip/{}", token));
        let response = self.config.authorize(self.http.get(&url)).send().await?;
        let body: TaskResponse = read_json(SERVICE, response).await?;

        let data = body
            .data
            .ok_or_else(|| GatewayError::invalid_response("missing data in task response"))?;

        Ok(match data.status.as_str() {
            "completed" | "complete" | "succeeded" => PollOutcome::Completed(candidates(&data.clips)),
            "failed" | "error" => PollOutcome::Failed(
                data.error
                    .unwrap_or_else(|| format!("music generation {} reported {}", token, data.status)),
            ),
            _ => PollOutcome::Pending,
        })
    }
}

/// Extract renditions from a `clips` object or array, keeping response order.
fn candidates(clips: &Value) -> Vec<AudioResult> {
    let entries: Vec<&Value> = match clips {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|clip| {
            let url = clip.get("audio_url").and_then(Value::as_str)?;
            let duration = clip
                .get("metadata")
                .and_then(|m| m.get("duration"))
                .or_else(|| clip.get("duration"))
                .and_then(Value::as_f64);
            let Some(duration_secs) = duration else {
                warn!(url, "Skipping audio rendition without a duration");
                return None;
            };
            Some(AudioResult {
                url: url.to_string(),
                duration_secs,
                image_url: clip
                    .get("image_url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AudioSynthesisClient {
        let config = ServiceConfig::new(server.uri(), Some("key".to_string()), Duration::from_secs(5)).unwrap();
        AudioSynthesisClient::new(config).unwrap()
    }

    fn params() -> AudioParams {
        AudioParams {
            prompt: "Rain on the window".to_string(),
            tags: "pop,piano,fast,female".to_string(),
            custom_mode: true,
            title: "Summer rain".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .and(body_partial_json(json!({"custom_mode": true, "title": "Summer rain"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"task_id": "task-123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client(&server).submit(&params()).await.unwrap();
        assert_eq!(token.as_str(), "task-123");
    }

    #[tokio::test]
    async fn test_submit_gives_up_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).submit(&params()).await.unwrap_err();
        assert!(matches!(err, GatewayError::SubmissionFailed(_)));
    }

    #[tokio::test]
    async fn test_submit_recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"task_id": "task-2"}
            })))
            .mount(&server)
            .await;

        let token = client(&server).submit(&params()).await.unwrap();
        assert_eq!(token.as_str(), "task-2");
    }

    #[tokio::test]
    async fn test_poll_completed_keeps_candidate_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/task-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "status": "completed",
                    "clips": {
                        "zz-first": {
                            "audio_url": "https://cdn.example.com/1.mp3",
                            "image_url": "https://cdn.example.com/1.jpg",
                            "metadata": {"duration": 182.5}
                        },
                        "aa-second": {
                            "audio_url": "https://cdn.example.com/2.mp3",
                            "metadata": {"duration": 175.0}
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let outcome = client(&server).poll(&JobToken::new("task-123")).await;
        let PollOutcome::Completed(renditions) = outcome else {
            panic!("expected completed, got {:?}", outcome);
        };
        assert_eq!(renditions.len(), 2);
        assert_eq!(renditions[0].url, "https://cdn.example.com/1.mp3");
        assert_eq!(renditions[0].image_url.as_deref(), Some("https://cdn.example.com/1.jpg"));
        assert_eq!(renditions[1].duration_secs, 175.0);
    }

    #[tokio::test]
    async fn test_poll_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/running"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "processing"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "failed", "error": "lyrics rejected"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.poll(&JobToken::new("running")).await.is_pending());
        assert_eq!(
            client.poll(&JobToken::new("broken")).await,
            PollOutcome::Failed("lyrics rejected".to_string())
        );
        assert!(client.poll(&JobToken::new("flaky")).await.is_pending());
    }

    #[test]
    fn test_params_from_request() {
        let request = GenerationRequest {
            subject: "Night drive".to_string(),
            language: "English".to_string(),
            vocal: "male".to_string(),
            tempo: "slow".to_string(),
            genres: vec!["synthwave".to_string()],
            instruments: vec![],
            video_style: "retro".to_string(),
            lyrics: "[Verse]\nNeon lights".to_string(),
            translated_lines: vec![],
            requester_id: "m-1".to_string(),
        };
        let params = AudioParams::from(&request);
        assert_eq!(params.tags, "synthwave,slow,male");
        assert_eq!(params.title, "Night drive");
        assert!(params.custom_mode);
    }
}
