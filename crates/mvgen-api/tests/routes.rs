//! Router tests against in-memory services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use mvgen_api::{create_router, ApiConfig, AppState, JobBackend, LyricsComposer};
use mvgen_gateway::{GatewayError, GatewayResult, LyricsParams};
use mvgen_models::{GenerationJob, JobId};
use mvgen_queue::{PipelinePlan, QueueResult, SubmittedPipeline};

#[derive(Default)]
struct MemoryBackend {
    records: Mutex<Vec<GenerationJob>>,
}

#[async_trait]
impl JobBackend for MemoryBackend {
    async fn submit(&self, plan: &PipelinePlan) -> QueueResult<SubmittedPipeline> {
        self.records.lock().unwrap().extend(plan.records());
        Ok(SubmittedPipeline {
            job_id: plan.pipeline_id.clone(),
            audio_job_id: plan.audio.job_id.clone(),
            clip_job_ids: plan.clips.iter().map(|c| c.job_id.clone()).collect(),
        })
    }

    async fn record(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        Ok(self.records.lock().unwrap().iter().find(|r| &r.id == job_id).cloned())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

struct FixedLyrics {
    fail: bool,
}

#[async_trait]
impl LyricsComposer for FixedLyrics {
    async fn compose(&self, params: &LyricsParams) -> GatewayResult<Vec<String>> {
        if self.fail {
            return Err(GatewayError::SubmissionFailed("text_synthesis failed twice".to_string()));
        }
        Ok((1..=3).map(|i| format!("[Verse]\n{} take {}", params.subject, i)).collect())
    }
}

fn router_with(config: ApiConfig, lyrics_fail: bool) -> Router {
    let state = AppState::new(
        config,
        Arc::new(MemoryBackend::default()),
        Arc::new(FixedLyrics { fail: lyrics_fail }),
    );
    create_router(state, None)
}

fn router() -> Router {
    router_with(ApiConfig::default(), false)
}

fn submission() -> Value {
    json!({
        "subject": "Summer rain",
        "language": "English",
        "vocal": "female",
        "tempo": "fast",
        "genres": ["pop"],
        "instruments": ["piano"],
        "video_style": "anime",
        "lyrics": "[Verse]\nRain on the window\nDancing alone",
        "translated_lines": ["[Verse]", "Rain on the window,", "Dancing alone!"],
        "requester_id": "member-42"
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_when_backend_answers() {
    let response = router().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["checks"]["redis"]["status"], "ok");
}

#[tokio::test]
async fn test_submit_returns_accepted_with_job_ids() {
    let response = router()
        .oneshot(post_json("/api/music-videos", &submission()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert!(body["job_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(body["clip_job_ids"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_submitted_pipeline_is_pending() {
    let app = router();

    let response = app
        .clone()
        .oneshot(post_json("/api/music-videos", &submission()))
        .await
        .unwrap();
    let job_id = body_json(response).await["job_id"].as_str().unwrap().to_string();

    let response = app.oneshot(get(&format!("/api/jobs/{}", job_id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["kind"], "finishing");
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_missing_fields_are_a_structured_validation_error() {
    let response = router()
        .oneshot(post_json("/api/music-videos", &json!({"subject": "Summer rain"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
    for field in ["genres", "language", "vocal", "tempo", "video_style", "lyrics"] {
        assert!(body["fields"].get(field).is_some(), "{} missing from {}", field, body);
    }
    assert!(body["fields"].get("subject").is_none());
}

#[tokio::test]
async fn test_lines_that_filter_to_nothing_are_rejected() {
    let mut request = submission();
    request["translated_lines"] = json!(["[Chorus]", "...", ""]);

    let response = router().oneshot(post_json("/api/music-videos", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["fields"].get("translated_lines").is_some());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/music-videos")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "bad_request");
}

#[tokio::test]
async fn test_unknown_job_is_404_with_unknown_status() {
    let response = router().oneshot(get("/api/jobs/never-submitted")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body, json!({"status": "unknown", "job_id": "never-submitted"}));
}

#[tokio::test]
async fn test_lyrics_returns_three_candidates() {
    let request = json!({"subject": "Harbor", "genres": ["indie"], "language": "English", "vocal": "male"});

    let response = router().oneshot(post_json("/api/lyrics", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let lyrics = body_json(response).await["lyrics"].as_array().cloned().unwrap();
    assert_eq!(lyrics.len(), 3);
    assert!(lyrics[0].as_str().unwrap().contains("Harbor"));
}

#[tokio::test]
async fn test_lyrics_validation_and_upstream_failure() {
    let response = router()
        .oneshot(post_json("/api/lyrics", &json!({"subject": "Harbor"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["fields"].get("genres").is_some());

    let request = json!({"subject": "Harbor", "genres": ["indie"], "language": "English", "vocal": "male"});
    let response = router_with(ApiConfig::default(), true)
        .oneshot(post_json("/api/lyrics", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "upstream_error");
}

#[tokio::test]
async fn test_submissions_are_rate_limited_per_ip() {
    let config = ApiConfig {
        rate_limit_per_minute: 1,
        ..ApiConfig::default()
    };
    let app = router_with(config, false);

    let from = |ip: &str| {
        let mut request = post_json("/api/music-videos", &submission());
        request.headers_mut().insert("X-Forwarded-For", ip.parse().unwrap());
        request
    };

    let first = app.clone().oneshot(from("192.168.1.100")).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app.clone().oneshot(from("192.168.1.100")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));

    let other = app.oneshot(from("192.168.1.101")).await.unwrap();
    assert_eq!(other.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_status_queries_are_not_rate_limited() {
    let config = ApiConfig {
        rate_limit_per_minute: 1,
        ..ApiConfig::default()
    };
    let app = router_with(config, false);

    for _ in 0..3 {
        let mut request = get("/api/jobs/some-id");
        request.headers_mut().insert("X-Forwarded-For", "10.1.1.1".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_unmatched_route_is_json_404() {
    let response = router().oneshot(get("/api/nothing-here")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    tokio_test::assert_ok!(serde_json::from_slice::<Value>(
        &axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    ));
}
