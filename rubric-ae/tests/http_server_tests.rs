//! HTTP Server & Routing Integration Tests
//!
//! Drives the router with `oneshot` requests against a temporary database.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::TestApp;

const DOMAINS: [&str; 2] = ["clarity", "structure"];
const LEVELS: [&str; 4] = ["poor", "fair", "good", "excellent"];

#[tokio::test]
async fn test_health_reports_fallback_mode() {
    // Given: App without a provider
    let app = TestApp::new(None).await;

    // When: GET /health
    let (status, body) = app.request("GET", "/health", None).await;

    // Then: Module identity and assessment mode are reported
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rubric-ae");
    assert_eq!(body["assessment_mode"], "fallback");
    assert!(body["uptime_seconds"].is_u64());
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_create_and_fetch_assignment() {
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;

    let (status, body) = app.request("GET", &format!("/assignments/{}", id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Personal essay");
    assert_eq!(body["config"]["domains"], json!(DOMAINS));
    assert_eq!(body["config"]["levelOrder"], "worst_first");
}

#[tokio::test]
async fn test_invalid_assignment_config_is_400() {
    // Given: A config with no levels
    let app = TestApp::new(None).await;

    // When: POST /assignments
    let (status, body) = app
        .request(
            "POST",
            "/assignments",
            Some(json!({"title": "Broken", "domains": ["clarity"], "levels": []})),
        )
        .await;

    // Then: Configuration error, nothing stored
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_unknown_assignment_is_404() {
    let app = TestApp::new(None).await;

    let (status, body) = app.request("GET", "/assignments/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = app.submit("missing", "k-1", "Some text").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request("GET", "/assignments/missing/statistics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submission_without_provider_returns_fallback_result() {
    // Given: Assignment with two domains, no provider configured
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;

    // When: A submission is posted
    let (status, body) = app.submit(&id, "k-1", "My summer vacation was long and hot.").await;

    // Then: A schema-valid fallback result comes back
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    assert_eq!(body["evaluatedBy"], "fallback");
    assert_eq!(body["assignmentId"], id.as_str());
    assert_eq!(body["studentKey"], "k-1");

    let domains = body["domainEvaluations"].as_object().unwrap();
    let mut keys: Vec<&str> = domains.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["clarity", "structure"]);

    for evaluation in domains.values().chain(std::iter::once(&body["overall"])) {
        assert!(LEVELS.contains(&evaluation["level"].as_str().unwrap()));
        let score = evaluation["score"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
    }
    assert!(!body["strengths"].as_array().unwrap().is_empty());
    assert!(!body["improvements"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_fallback_submissions_get_distinct_ids() {
    // Given: The helper app runs a seeded fallback generator
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;

    // When: The same student submits twice
    let (first_status, first) = app.submit(&id, "k-1", "First essay.").await;
    let (second_status, second) = app.submit(&id, "k-1", "Second essay.").await;

    // Then: Both are stored under their own evaluation id
    assert_eq!(first_status, StatusCode::OK, "unexpected body: {}", first);
    assert_eq!(second_status, StatusCode::OK, "unexpected body: {}", second);
    assert_ne!(first["id"], second["id"]);
    assert_eq!(first["overall"]["level"], second["overall"]["level"]);
}

#[tokio::test]
async fn test_blank_submission_is_400() {
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;

    let (status, body) = app.submit(&id, "k-1", "   ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_statistics_refresh_after_new_submission() {
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;
    let uri = format!("/assignments/{}/statistics", id);

    let (status, body) = app.request("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluationCount"], 0);
    assert_eq!(body["overallAverageScore"], Value::Null);

    app.submit(&id, "k-1", "First essay.").await;
    app.submit(&id, "k-2", "Second essay.").await;

    // Cached statistics were invalidated by the submissions
    let (_, body) = app.request("GET", &uri, None).await;
    assert_eq!(body["evaluationCount"], 2);
    assert_eq!(body["fallbackCount"], 2);
    assert!(body["domainAverageScores"]["clarity"].is_number());
}

#[tokio::test]
async fn test_growth_requires_two_results() {
    let app = TestApp::new(None).await;
    let id = app.create_assignment(&DOMAINS, &LEVELS).await;

    app.submit(&id, "k-1", "First essay.").await;
    let (status, body) = app.request("GET", "/students/k-1/growth", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"studentKey": "k-1", "hasData": false}));

    app.submit(&id, "k-1", "Second essay.").await;
    let (_, body) = app.request("GET", "/students/k-1/growth", None).await;
    assert_eq!(body["hasData"], true);
    assert_eq!(body["assessments"], 2);
    assert_eq!(body["domains"]["clarity"]["series"].as_array().unwrap().len(), 2);
    assert!(body["improvementRate"].is_number());
    assert!(body["improvementPercent"].is_number());
}

#[tokio::test]
async fn test_event_stream_headers_and_connected_frame() {
    // Given: Running app
    let app = TestApp::new(None).await;

    // When: An observer opens the stream
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events/a-1?clientId=c-1&userId=t-1&userName=Teacher")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Then: SSE headers and a connected frame first
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");
    assert!(app.broadcaster.is_subscribed("a-1", "c-1"));

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap().into_data().unwrap();
    let text = std::str::from_utf8(&frame).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.ends_with("\n\n"));

    let message: Value = serde_json::from_str(text.trim_start_matches("data: ").trim_end()).unwrap();
    assert_eq!(
        message,
        json!({"type": "connected", "clientId": "c-1", "user": {"id": "t-1", "name": "Teacher"}})
    );

    // Dropping the connection unsubscribes
    drop(body);
    assert!(!app.broadcaster.is_subscribed("a-1", "c-1"));
}

#[tokio::test]
async fn test_chat_message_excludes_sender() {
    let app = TestApp::new(None).await;
    let user = rubric_common::UserInfo::new("u", "Teacher");
    let mut sender = app.broadcaster.subscribe("a-1", "c-1", user.clone()).unwrap();
    let mut receiver = app.broadcaster.subscribe("a-1", "c-2", user.clone()).unwrap();
    while sender.try_recv().is_some() {}
    while receiver.try_recv().is_some() {}

    let (status, body) = app
        .request(
            "POST",
            "/events/a-1/messages",
            Some(json!({"clientId": "c-1", "user": {"id": "u", "name": "Teacher"}, "message": "Starting now"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 1);
    assert!(sender.try_recv().is_none());
    match receiver.try_recv() {
        Some(rubric_common::ProgressMessage::Message { user: from, message, .. }) => {
            assert_eq!(from, user);
            assert_eq!(message, "Starting now");
        }
        other => panic!("expected chat message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_chat_message_is_400() {
    let app = TestApp::new(None).await;
    let (status, _) = app
        .request("POST", "/events/a-1/messages", Some(json!({"clientId": "c-1", "message": " "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
