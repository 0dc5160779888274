//! Observing-side progress stream consumer with reconnection
//!
//! [`ProgressConnector`] opens an [`EventSource`], decodes SSE frames into
//! [`ProgressMessage`]s and, when the connection drops or cannot be opened,
//! waits according to its [`BackoffPolicy`] before reconnecting. Waiting goes
//! through an injected [`Scheduler`], so tests run without real timers.

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{BackoffPolicy, SseFrameDecoder};
use crate::events::{ProgressMessage, UserInfo};

/// Connector errors (all recovered by reconnecting)
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Raw body chunks of an open event stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ConnectorError>> + Send>>;

/// Something that can open a progress stream
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self) -> Result<ByteStream, ConnectorError>;
}

/// Delay provider used between reconnection attempts
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Scheduler backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// HTTP event source for `GET {base_url}/events/{topic}`
#[derive(Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
    query: Vec<(&'static str, String)>,
}

impl HttpEventSource {
    pub fn new(base_url: &str, topic_id: &str, client_id: &str, user: &UserInfo) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/events/{}", base_url.trim_end_matches('/'), topic_id),
            query: vec![
                ("clientId", client_id.to_string()),
                ("userId", user.id.clone()),
                ("userName", user.name.clone()),
            ],
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self) -> Result<ByteStream, ConnectorError> {
        debug!(url = %self.url, "Opening progress stream");

        let response = self
            .client
            .get(&self.url)
            .query(&self.query)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Status(status.as_u16()));
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ConnectorError::Stream(e.to_string()))
        });
        Ok(Box::pin(body))
    }
}

/// Reconnecting progress stream consumer
pub struct ProgressConnector<S, T> {
    source: S,
    scheduler: T,
    policy: BackoffPolicy,
    max_consecutive_failures: Option<u32>,
}

impl<S, T> ProgressConnector<S, T>
where
    S: EventSource + 'static,
    T: Scheduler + 'static,
{
    pub fn new(source: S, scheduler: T) -> Self {
        Self {
            source,
            scheduler,
            policy: BackoffPolicy::default(),
            max_consecutive_failures: None,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Give up after this many consecutive connections that delivered nothing
    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = Some(max);
        self
    }

    /// Messages from the current connection and every reconnection after it
    ///
    /// A connection that yields at least one message counts as healthy and
    /// resets both the backoff and the failure count. The stream only ends
    /// when the failure limit (if any) is reached.
    pub fn into_stream(self) -> impl Stream<Item = ProgressMessage> + Send {
        let Self {
            source,
            scheduler,
            mut policy,
            max_consecutive_failures,
        } = self;

        async_stream::stream! {
            let mut failures: u32 = 0;

            loop {
                let mut received = false;

                match source.open().await {
                    Ok(mut body) => {
                        info!("Progress stream connected");
                        let mut decoder = SseFrameDecoder::new();

                        while let Some(chunk) = body.next().await {
                            let chunk = match chunk {
                                Ok(chunk) => chunk,
                                Err(e) => {
                                    warn!(error = %e, "Progress stream interrupted");
                                    break;
                                }
                            };

                            for payload in decoder.push(&chunk) {
                                match serde_json::from_str::<ProgressMessage>(&payload) {
                                    Ok(message) => {
                                        if !received {
                                            received = true;
                                            failures = 0;
                                            policy.reset();
                                        }
                                        yield message;
                                    }
                                    Err(e) => {
                                        warn!(error = %e, "Skipping undecodable progress frame");
                                    }
                                }
                            }
                        }
                        debug!("Progress stream closed by server");
                    }
                    Err(e) => {
                        warn!(error = %e, "Progress stream connection failed");
                    }
                }

                if !received {
                    failures += 1;
                }
                if let Some(max) = max_consecutive_failures {
                    if failures >= max {
                        warn!(failures, "Giving up on progress stream");
                        break;
                    }
                }

                let delay = policy.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Reconnecting progress stream");
                scheduler.sleep(delay).await;
            }
        }
    }
}
