//! Music video catalog records.

use std::collections::HashMap;

use async_trait::async_trait;
use mvgen_models::MusicVideoMetadata;
use tracing::info;
use uuid::Uuid;

use crate::client::{CatalogConfig, FirestoreClient};
use crate::error::{CatalogError, CatalogResult};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{ToFirestoreValue, Value};

/// Write side of the catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist one record and return its entity id.
    ///
    /// `CatalogError::Validation` means the record can never be accepted.
    async fn create(&self, metadata: &MusicVideoMetadata) -> CatalogResult<String>;
}

/// Firestore-backed music video collection.
#[derive(Clone)]
pub struct MusicVideoRepository {
    client: FirestoreClient,
    collection: String,
    retry: RetryConfig,
}

impl MusicVideoRepository {
    pub fn new(client: FirestoreClient, config: &CatalogConfig) -> Self {
        Self {
            client,
            collection: config.collection.clone(),
            retry: config.retry.clone(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> CatalogResult<Self> {
        let config = CatalogConfig::from_env()?;
        let client = FirestoreClient::new(&config)?;
        Ok(Self::new(client, &config))
    }
}

#[async_trait]
impl CatalogStore for MusicVideoRepository {
    async fn create(&self, metadata: &MusicVideoMetadata) -> CatalogResult<String> {
        metadata
            .check()
            .map_err(|e| CatalogError::validation(format!("{} ({})", e, e.field_names())))?;

        let entity_id = Uuid::new_v4().to_string();
        let fields = metadata_fields(metadata);

        with_retry(&self.retry, "create_music_video", || {
            self.client.create_document(&self.collection, &entity_id, fields.clone())
        })
        .await?;

        info!(
            entity_id = %entity_id,
            requester_id = %metadata.requester_id,
            duration_secs = metadata.duration_secs,
            "Catalog record created"
        );
        Ok(entity_id)
    }
}

/// Firestore fields for a record.
pub fn metadata_fields(metadata: &MusicVideoMetadata) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("requester_id".to_string(), metadata.requester_id.to_firestore_value());
    fields.insert("subject".to_string(), metadata.subject.to_firestore_value());
    fields.insert("language".to_string(), metadata.language.to_firestore_value());
    fields.insert("vocal".to_string(), metadata.vocal.to_firestore_value());
    fields.insert("tempo".to_string(), metadata.tempo.to_firestore_value());
    fields.insert("genres".to_string(), metadata.genres.to_firestore_value());
    fields.insert("instruments".to_string(), metadata.instruments.to_firestore_value());
    fields.insert("video_style".to_string(), metadata.video_style.to_firestore_value());
    fields.insert("lyrics".to_string(), metadata.lyrics.to_firestore_value());
    fields.insert("duration_secs".to_string(), metadata.duration_secs.to_firestore_value());
    fields.insert("video_url".to_string(), metadata.video_url.to_firestore_value());
    fields.insert("cover_image_url".to_string(), metadata.cover_image_url.to_firestore_value());
    fields.insert("created_at".to_string(), metadata.created_at.to_firestore_value());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_cache::TokenSource;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/demo-project/databases/(default)/documents/music_videos";

    fn metadata() -> MusicVideoMetadata {
        MusicVideoMetadata {
            requester_id: "member-7".to_string(),
            subject: "Night drive".to_string(),
            language: "English".to_string(),
            vocal: "male".to_string(),
            tempo: "fast".to_string(),
            genres: vec!["synthwave".to_string()],
            instruments: vec!["synth".to_string()],
            video_style: "neon".to_string(),
            lyrics: "[Verse]\nCity lights".to_string(),
            duration_secs: 40.0,
            video_url: "https://cdn.example.com/mv_videos/member-7_20260101_000000.mp4".to_string(),
            cover_image_url: "https://cdn.example.com/mv_covers/member-7_20260101_000000.jpg".to_string(),
            created_at: Utc::now(),
        }
    }

    fn repository(server: &MockServer) -> MusicVideoRepository {
        let config = CatalogConfig {
            project_id: "demo-project".to_string(),
            database_id: "(default)".to_string(),
            collection: "music_videos".to_string(),
            emulator_host: Some(server.uri()),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        };
        let client = FirestoreClient::with_tokens(&config, TokenSource::Static("owner".to_string())).unwrap();
        MusicVideoRepository::new(client, &config)
    }

    #[tokio::test]
    async fn test_create_writes_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DOCS))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo-project/databases/(default)/documents/music_videos/x",
                "fields": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = repository(&server).create(&metadata()).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let requests = server.received_requests().await.unwrap();
        let url = &requests[0].url;
        assert_eq!(url.query_pairs().find(|(k, _)| k == "documentId").unwrap().1, id);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["fields"]["subject"], json!({"stringValue": "Night drive"}));
        assert_eq!(body["fields"]["duration_secs"], json!({"doubleValue": 40.0}));
    }

    #[tokio::test]
    async fn test_bad_request_is_validation_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DOCS))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "status": "INVALID_ARGUMENT", "message": "bad"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = repository(&server).create(&metadata()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DOCS))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(DOCS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fields": {}})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(repository(&server).create(&metadata()).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_validation_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut record = metadata();
        record.subject = "x".repeat(201);
        let err = repository(&server).create(&record).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("subject"));
    }
}
