//! Gateway configuration.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Connection settings for one remote service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ServiceConfig {
    /// Create a config, validating the base URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> GatewayResult<Self> {
        let base_url = base_url.into();
        Url::parse(&base_url)
            .map_err(|e| GatewayError::invalid_config(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        })
    }

    fn from_env_vars(url_var: &str, key_var: &str, default_url: &str, timeout: Duration) -> GatewayResult<Self> {
        let base_url = std::env::var(url_var).unwrap_or_else(|_| default_url.to_string());
        Self::new(base_url, std::env::var(key_var).ok(), timeout)
    }

    /// Join a path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn http_client(&self) -> GatewayResult<Client> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("mvgen-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GatewayError::Network)
    }

    pub(crate) fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Settings for all three capabilities.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub audio: ServiceConfig,
    pub clip: ServiceConfig,
    pub text: ServiceConfig,
    /// Chat model used for lyrics
    pub text_model: String,
    /// Native clip length requested from the clip service (seconds)
    pub clip_duration_secs: u32,
}

impl GatewayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> GatewayResult<Self> {
        let timeout = Duration::from_secs(
            std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );

        let text_key_var = if std::env::var("TEXT_API_KEY").is_ok() {
            "TEXT_API_KEY"
        } else {
            "OPENAI_API_KEY"
        };

        Ok(Self {
            audio: ServiceConfig::from_env_vars(
                "AUDIO_API_URL",
                "AUDIO_API_KEY",
                "https://api.sunoapi.com/api/v1/suno",
                timeout,
            )?,
            clip: ServiceConfig::from_env_vars(
                "CLIP_API_URL",
                "CLIP_API_KEY",
                "https://api.lumalabs.ai/dream-machine/v1",
                timeout,
            )?,
            text: ServiceConfig::from_env_vars(
                "TEXT_API_URL",
                text_key_var,
                "https://api.openai.com/v1",
                // Chat completions with three candidates can take a while.
                timeout.max(Duration::from_secs(60)),
            )?,
            text_model: std::env::var("TEXT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            clip_duration_secs: std::env::var("CLIP_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        })
    }
}

/// Decode a JSON body, turning non-2xx statuses into [`GatewayError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(service: &'static str, response: Response) -> GatewayResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_trims_slash() {
        let config = ServiceConfig::new("http://localhost:9000/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000/api");
        assert_eq!(config.endpoint("/create"), "http://localhost:9000/api/create");
    }

    #[test]
    fn test_service_config_rejects_bad_url() {
        let err = ServiceConfig::new("not a url", None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_key_is_none() {
        let config = ServiceConfig::new("http://localhost", Some(String::new()), Duration::from_secs(5)).unwrap();
        assert!(config.api_key.is_none());
    }
}
