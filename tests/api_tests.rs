//! HTTP API tests driven through the router without binding a socket.

use std::sync::Arc;
use std::time::Duration;

use agropest::{
    annotate::{Annotator, FALLBACK_EXPLANATION},
    api::{AppState, create_router},
    config::Config,
    engine::EngineBuilder,
    kb::{MemoryStore, default_knowledge},
    scorer::MatchResult,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app() -> Router {
    app_with(None, Duration::from_secs(10)).await
}

async fn app_with(annotator: Option<Arc<dyn Annotator>>, request_timeout: Duration) -> Router {
    let engine = EngineBuilder::new(Config::default())
        .store(Arc::new(MemoryStore::new(default_knowledge().unwrap())))
        .embedder(None)
        .annotator(annotator)
        .build()
        .await
        .unwrap();
    let state = Arc::new(AppState {
        engine: Arc::new(engine),
        request_timeout,
    });
    create_router(state, 64 * 1024)
}

/// Annotator that takes longer than any request is allowed to
struct StalledAnnotator;

#[async_trait]
impl Annotator for StalledAnnotator {
    async fn explain(&self, _description: &str, _candidates: &[MatchResult]) -> agropest::Result<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".to_string())
    }
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_mode_and_profile_count() {
    let (status, body) = send(app().await, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mode"], "fuzzy");
    assert_eq!(body["profiles"], 4);
}

#[tokio::test]
async fn identify_pest_returns_ranked_candidates() {
    // GIVEN: a whitefly description
    let request = json!({ "description": "My tomato leaves have tiny white bugs and sticky residue" });

    // WHEN: posted to the identification endpoint
    let (status, body) = send(app().await, Method::POST, "/identify-pest", Some(request)).await;

    // THEN: whitefly comes back with its evidence
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "identified");
    assert_eq!(body["pest"], "whitefly");
    assert!(body["confidence"].as_f64().unwrap() > 0.9);
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["pest"], "whitefly");
    assert!(body["report"].as_str().unwrap().contains("Identified Pest: whitefly"));
    assert!(body.get("explanation").is_none());
}

#[tokio::test]
async fn off_topic_description_gets_guidance() {
    let request = json!({ "description": "My car has a flat tire" });
    let (status, body) = send(app().await, Method::POST, "/identify-pest", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "off_topic");
    assert_eq!(body["pest"], "Unknown");
    assert!(body["candidates"].as_array().unwrap().is_empty());
    assert!(!body["guidance"].as_array().unwrap().is_empty());
    assert!(body.get("report").is_none());
}

#[tokio::test]
async fn empty_description_is_bad_request() {
    let request = json!({ "description": "   " });
    let (status, body) = send(app().await, Method::POST, "/identify-pest", Some(request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn missing_description_field_is_bad_request() {
    let (status, body) = send(app().await, Method::POST, "/identify-pest", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid input"), "{error}");
    assert!(error.contains("description"), "{error}");
}

#[tokio::test]
async fn non_text_description_is_bad_request() {
    // GIVEN: a number where text is expected
    let request = json!({ "description": 42 });

    // WHEN: posted
    let (status, body) = send(app().await, Method::POST, "/identify-pest", Some(request)).await;

    // THEN: the usual JSON error shape, not a bare 422
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));
}

#[tokio::test]
async fn slow_annotation_does_not_discard_the_ranking() {
    // GIVEN: a request deadline far shorter than the annotator takes
    let app = app_with(Some(Arc::new(StalledAnnotator)), Duration::from_millis(200)).await;
    let request = json!({ "description": "My tomato leaves have tiny white bugs and sticky residue" });

    // WHEN: a whitefly description is posted
    let (status, body) = send(app, Method::POST, "/identify-pest", Some(request)).await;

    // THEN: the ranking comes back with the fallback explanation
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pest"], "whitefly");
    assert_eq!(body["explanation"], FALLBACK_EXPLANATION);
}

#[tokio::test]
async fn list_and_show_profiles() {
    let app = app().await;

    let (status, body) = send(app.clone(), Method::GET, "/pests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["pests"],
        json!(["aphid", "mealybug", "spider mite", "whitefly"])
    );

    let (status, body) = send(app.clone(), Method::GET, "/pests/Whitefly", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["symptoms"].as_array().unwrap().contains(&json!("sticky leaves")));

    let (status, body) = send(app, Method::GET, "/pests/locust", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("locust"));
}

#[tokio::test]
async fn put_profile_then_identify_it() {
    let app = app().await;
    let profile = json!({
        "crops": ["onion", "garlic"],
        "symptoms": ["silver streaks on leaves", "black specks"],
        "synonyms": ["onion thrips"]
    });

    let (status, body) = send(app.clone(), Method::PUT, "/pests/thrips", Some(profile)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);

    let request = json!({ "description": "silver streaks on my onion leaves" });
    let (status, body) = send(app, Method::POST, "/identify-pest", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pest"], "thrips");
}

#[tokio::test]
async fn put_unmatchable_profile_is_rejected() {
    let (status, body) = send(
        app().await,
        Method::PUT,
        "/pests/ghost",
        Some(json!({ "life_cycle": "unknown" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn put_malformed_profile_is_bad_request() {
    let (status, body) = send(
        app().await,
        Method::PUT,
        "/pests/thrips",
        Some(json!({ "symptoms": "not a list" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));
}
