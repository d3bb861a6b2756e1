//! Lyrics generation client (OpenAI-compatible chat completions).
//!
//! Chat completions answer inline, so there is no poll step: `compose` is the
//! whole job. The one-retry submission policy still applies.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{read_json, ServiceConfig};
use crate::error::{GatewayError, GatewayResult};

const SERVICE: &str = "text_synthesis";

/// Number of lyric candidates requested per call.
pub const LYRIC_CANDIDATES: u32 = 3;

const MAX_TOKENS: u32 = 300;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that writes song lyrics.";

/// Inputs for a lyrics draft.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsParams {
    pub subject: String,
    pub genres: Vec<String>,
    pub language: String,
    pub vocal: String,
}

impl LyricsParams {
    /// User prompt asking for four tagged sections of four lines.
    pub fn prompt(&self) -> String {
        format!(
            "Create song lyrics based on the keyword '{}'. \
             The genre should be {}, the language should be {}, and the vocals should be suitable for {} vocals. \
             The song should have 4 verses, each with 4 lines, formatted as follows:\n\n\
             [Verse]\nLine 1\nLine 2\nLine 3\nLine 4\n\n\
             [Verse 2]\nLine 1\nLine 2\nLine 3\nLine 4\n\n\
             [Bridge]\nLine 1\nLine 2\nLine 3\nLine 4\n\n\
             [Verse 3]\nLine 1\nLine 2\nLine 3\nLine 4\n",
            self.subject,
            self.genres.join(", "),
            self.language,
            self.vocal
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    n: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the lyrics service.
pub struct TextSynthesisClient {
    http: Client,
    config: ServiceConfig,
    model: String,
}

impl TextSynthesisClient {
    pub fn new(config: ServiceConfig, model: impl Into<String>) -> GatewayResult<Self> {
        let http = config.http_client()?;
        Ok(Self {
            http,
            config,
            model: model.into(),
        })
    }

    /// Generate lyric candidates, retrying once on failure.
    pub async fn compose(&self, params: &LyricsParams) -> GatewayResult<Vec<String>> {
        match self.compose_once(params).await {
            Ok(candidates) => Ok(candidates),
            Err(first) => {
                warn!(service = SERVICE, error = %first, "Lyrics request failed, retrying once");
                self.compose_once(params).await.map_err(|second| {
                    GatewayError::SubmissionFailed(format!(
                        "{} failed twice: {} (first attempt: {})",
                        SERVICE, second, first
                    ))
                })
            }
        }
    }

    async fn compose_once(&self, params: &LyricsParams) -> GatewayResult<Vec<String>> {
        let url = self.config.endpoint("chat/completions");
        let prompt = params.prompt();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            n: LYRIC_CANDIDATES,
        };

        let response = self
            .config
            .authorize(self.http.post(&url))
            .json(&body)
            .send()
            .await?;
        let chat: ChatResponse = read_json(SERVICE, response).await?;

        let candidates: Vec<String> = chat
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if candidates.is_empty() {
            return Err(GatewayError::invalid_response("no lyric candidates in response"));
        }

        info!(
            subject = %params.subject,
            candidates = candidates.len(),
            "Generated lyric candidates"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> LyricsParams {
        LyricsParams {
            subject: "first snow".to_string(),
            genres: vec!["ballad".to_string(), "indie".to_string()],
            language: "Korean".to_string(),
            vocal: "female".to_string(),
        }
    }

    fn client(server: &MockServer) -> TextSynthesisClient {
        let config = ServiceConfig::new(server.uri(), Some("sk-test".to_string()), Duration::from_secs(5)).unwrap();
        TextSynthesisClient::new(config, "gpt-3.5-turbo").unwrap()
    }

    #[test]
    fn test_prompt_mentions_inputs() {
        let prompt = params().prompt();
        assert!(prompt.contains("'first snow'"));
        assert!(prompt.contains("ballad, indie"));
        assert!(prompt.contains("[Bridge]"));
    }

    #[tokio::test]
    async fn test_compose_returns_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"n": 3, "max_tokens": 300, "model": "gpt-3.5-turbo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "[Verse]\nOne"}},
                    {"message": {"role": "assistant", "content": "[Verse]\nTwo "}},
                    {"message": {"role": "assistant", "content": "[Verse]\nThree"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let candidates = client(&server).compose(&params()).await.unwrap();
        assert_eq!(candidates, vec!["[Verse]\nOne", "[Verse]\nTwo", "[Verse]\nThree"]);
    }

    #[tokio::test]
    async fn test_compose_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).compose(&params()).await.unwrap_err();
        assert!(matches!(err, GatewayError::SubmissionFailed(_)));
    }
}
