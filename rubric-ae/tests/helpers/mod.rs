//! Test Helper Utilities
//!
//! Shared setup for rubric-ae integration tests: a file-backed test
//! database, a scripted provider, and a router wired like the binary.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use rubric_ae::assessment::{
    AssessmentClient, AssessmentProvider, FallbackGenerator, ProviderError, RetryPolicy,
};
use rubric_ae::broadcast::ProgressBroadcaster;
use rubric_ae::db::SqliteRepository;
use rubric_ae::services::AssessmentService;
use rubric_ae::{build_router, AppState};

/// Create temporary test database with tables initialized
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_rubric.db");
    let pool = rubric_ae::db::init_database_pool(&db_path).await.unwrap();
    (temp_dir, pool)
}

/// One scripted provider reply
pub enum Reply {
    Text(String),
    Status(u16),
    Hang,
}

/// Provider that plays back canned replies and counts calls
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssessmentProvider for ScriptedProvider {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Status(status)) => Err(ProviderError::Upstream {
                status,
                body: "scripted failure".to_string(),
            }),
            Some(Reply::Hang) | None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

/// Application wired against a temporary database
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub broadcaster: ProgressBroadcaster,
    pub service: Arc<AssessmentService>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new(provider: Option<Arc<dyn AssessmentProvider>>) -> Self {
        let (db_dir, pool) = create_test_db().await;
        let broadcaster = ProgressBroadcaster::new(32);

        let client = AssessmentClient::new(provider, broadcaster.clone())
            .with_policy(RetryPolicy {
                timeout: Duration::from_millis(200),
                max_retries: 1,
                retry_delay: Duration::from_millis(5),
            })
            .with_fallback(FallbackGenerator::with_seed(2024));

        let service = Arc::new(AssessmentService::new(
            client,
            Arc::new(SqliteRepository::new(pool)),
            Duration::from_secs(60),
        ));

        let state = AppState::new(service.clone(), broadcaster.clone());
        Self {
            router: build_router(state.clone()),
            state,
            broadcaster,
            service,
            _db_dir: db_dir,
        }
    }

    /// Send a request and decode the JSON body (Null when empty)
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Create an assignment over HTTP and return its id
    pub async fn create_assignment(&self, domains: &[&str], levels: &[&str]) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/assignments",
                Some(serde_json::json!({
                    "title": "Personal essay",
                    "domains": domains,
                    "levels": levels,
                    "gradingCriteria": "Clear ideas, logical order.",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn submit(&self, assignment_id: &str, student_key: &str, content: &str) -> (StatusCode, Value) {
        self.request(
            "POST",
            &format!("/assignments/{}/submissions", assignment_id),
            Some(serde_json::json!({
                "studentKey": student_key,
                "studentName": format!("Student {}", student_key),
                "content": content,
            })),
        )
        .await
    }
}

/// Provider reply with the given level for every domain
pub fn provider_reply(domains: &[&str], level: &str, score: u32) -> String {
    let domain_map: serde_json::Map<String, Value> = domains
        .iter()
        .map(|d| {
            (
                d.to_string(),
                serde_json::json!({"level": level, "score": score, "feedback": "ok"}),
            )
        })
        .collect();
    format!(
        "Assessment follows.\n{}",
        serde_json::json!({
            "domains": domain_map,
            "overall": {"level": level, "feedback": "Solid work."},
            "strengths": ["Clear voice"],
            "improvements": ["Paragraph transitions"],
        })
    )
}
