//! Firestore REST API client.
//!
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Tracing spans and request metrics

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{info_span, Instrument};

use crate::error::{CatalogError, CatalogResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::{TokenCache, TokenSource};
use crate::types::{Document, Value};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Catalog client configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Collection holding music video records
    pub collection: String,
    /// Emulator host; when set, requests go there with a fixed token
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl CatalogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> CatalogResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| CatalogError::config_error("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set"))?;

        if project_id.is_empty() {
            return Err(CatalogError::config_error("GCP_PROJECT_ID cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID").unwrap_or_else(|_| "(default)".to_string()),
            collection: std::env::var("CATALOG_COLLECTION").unwrap_or_else(|_| "music_videos".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST").ok().filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    /// Documents root for this project and database.
    pub fn documents_url(&self) -> String {
        let root = match &self.emulator_host {
            Some(host) if host.starts_with("http") => format!("{}/v1", host.trim_end_matches('/')),
            Some(host) => format!("http://{}/v1", host),
            None => FIRESTORE_URL.to_string(),
        };
        format!(
            "{}/projects/{}/databases/{}/documents",
            root, self.project_id, self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    base_url: String,
    tokens: TokenSource,
}

impl FirestoreClient {
    /// Create a client; service account credentials are loaded unless an
    /// emulator is configured.
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let tokens = match config.emulator_host {
            Some(_) => TokenSource::Static("owner".to_string()),
            None => TokenSource::Provider(Arc::new(TokenCache::new(Self::create_auth_provider()?))),
        };
        Self::with_tokens(config, tokens)
    }

    /// Create a client with an explicit token source.
    pub fn with_tokens(config: &CatalogConfig, tokens: TokenSource) -> CatalogResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("mvgen-catalog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.documents_url(),
            tokens,
        })
    }

    fn create_auth_provider() -> CatalogResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| CatalogError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(CatalogError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send a request, re-authenticating once if the token expired.
    async fn send_authorized<F>(&self, url: &str, build: F) -> CatalogResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.tokens.token().await?;
        let response = build().bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(CatalogError::from_http_status(401, format!("{} failed: {}", url, body)));
        }

        self.tokens.invalidate().await;
        let token = self.tokens.token().await?;
        Ok(build().bearer_auth(&token).send().await?)
    }

    /// Create a document with a caller-chosen id.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> CatalogResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let body = Document::new(fields);

        self.execute_request("create_document", collection, doc_id, async {
            let response = self
                .send_authorized(&url, || self.http.post(&url).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(CatalogError::AlreadyExists(format!("{}/{}", collection, doc_id))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    async fn execute_request<T, F>(&self, operation: &str, collection: &str, doc_id: &str, fut: F) -> CatalogResult<T>
    where
        F: std::future::Future<Output = CatalogResult<T>>,
    {
        let span = info_span!("catalog_request", operation = %operation, collection = %collection, doc_id = %doc_id);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> CatalogError {
        let body = response.text().await.unwrap_or_default();
        CatalogError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(emulator_host: Option<&str>) -> CatalogConfig {
        CatalogConfig {
            project_id: "demo-project".to_string(),
            database_id: "(default)".to_string(),
            collection: "music_videos".to_string(),
            emulator_host: emulator_host.map(str::to_string),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn test_documents_url() {
        assert_eq!(
            config(None).documents_url(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents"
        );
        assert_eq!(
            config(Some("localhost:8080")).documents_url(),
            "http://localhost:8080/v1/projects/demo-project/databases/(default)/documents"
        );
        assert_eq!(
            config(Some("http://127.0.0.1:9999/")).documents_url(),
            "http://127.0.0.1:9999/v1/projects/demo-project/databases/(default)/documents"
        );
    }

    #[test]
    fn test_expired_token_detection() {
        assert!(FirestoreClient::is_access_token_expired(r#"{"status": "UNAUTHENTICATED"}"#));
        assert!(!FirestoreClient::is_access_token_expired("PERMISSION_DENIED"));
    }
}
