//! Server-Sent Events (SSE) utilities
//!
//! Shared by the serving side (frame formatting lives on
//! [`ProgressMessage`](crate::events::ProgressMessage)) and observing clients.

mod backoff;
mod connector;
mod frame;

pub use backoff::BackoffPolicy;
pub use connector::{
    ByteStream, ConnectorError, EventSource, HttpEventSource, ProgressConnector, Scheduler,
    TokioScheduler,
};
pub use frame::SseFrameDecoder;

/// Response headers every progress stream carries
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];
