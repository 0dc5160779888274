//! Server-Sent Events progress stream and chat relay

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use rubric_common::events::{ProgressMessage, UserInfo};
use rubric_common::sse::STREAM_HEADERS;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Identity supplied by an observer opening a stream
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    /// Generated when absent
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl StreamParams {
    fn into_identity(self) -> (String, UserInfo) {
        let client_id = self
            .client_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let user = match (self.user_id, self.user_name) {
            (Some(id), Some(name)) => UserInfo::new(id, name),
            (Some(id), None) => UserInfo::new(id.clone(), id),
            (None, Some(name)) => UserInfo::new(client_id.clone(), name),
            (None, None) => UserInfo::anonymous(&client_id),
        };
        (client_id, user)
    }
}

/// GET /events/:topic
///
/// Streams `data: <JSON>` frames for one topic. The first frame is the
/// `connected` acknowledgment. The subscription is released when the
/// connection drops.
pub async fn event_stream(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> ApiResult<impl IntoResponse> {
    let (client_id, user) = params.into_identity();
    let subscription = state.broadcaster.subscribe(&topic_id, &client_id, user)?;

    info!(topic = %topic_id, client = %client_id, "SSE client connected");

    Ok((STREAM_HEADERS, Sse::new(frames(subscription)).keep_alive(
        KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"),
    )))
}

fn frames(
    subscription: crate::broadcast::Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    subscription.into_stream().filter_map(|message| async move {
        match serde_json::to_string(&message) {
            Ok(json) => {
                debug!(event = message.event_type(), "SSE: forwarding message");
                Some(Ok(Event::default().data(json)))
            }
            Err(e) => {
                warn!("SSE: Failed to serialize {}: {}", message.event_type(), e);
                None
            }
        }
    })
}

/// POST /events/:topic/messages request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Sender's client id; the sender does not receive its own message
    pub client_id: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub delivered: usize,
}

/// POST /events/:topic/messages
pub async fn post_message(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is empty".to_string()));
    }

    let user = request
        .user
        .unwrap_or_else(|| UserInfo::anonymous(&request.client_id));

    let delivered = state.broadcaster.broadcast(
        &topic_id,
        ProgressMessage::chat(user, request.message),
        Some(&request.client_id),
    );

    Ok(Json(ChatResponse { delivered }))
}

/// Build event routes
pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events/:topic", get(event_stream))
        .route("/events/:topic/messages", post(post_message))
}
