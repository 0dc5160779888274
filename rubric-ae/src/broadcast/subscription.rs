//! Channel handle returned to a subscribing connection

use futures::stream::Stream;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use super::registry::Registry;
use rubric_common::events::ProgressMessage;

/// Subscriber lifecycle
///
/// `Connecting → Open → Closing → Closed`. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SubscriberState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SubscriberState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Shared, forward-only state cell
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(SubscriberState::Connecting as u8)))
    }

    pub(crate) fn get(&self) -> SubscriberState {
        SubscriberState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move to `next` unless already at or past it
    pub(crate) fn advance(&self, next: SubscriberState) {
        self.0.fetch_max(next as u8, Ordering::SeqCst);
    }
}

/// One client's view of a topic
///
/// Dropping the subscription (which is what happens when the transport
/// aborts and the response stream is torn down) unregisters the client
/// exactly once.
pub struct Subscription {
    pub(crate) topic_id: String,
    pub(crate) client_id: String,
    pub(crate) generation: u64,
    pub(crate) receiver: mpsc::Receiver<ProgressMessage>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) registry: Weak<Registry>,
    pub(crate) released: bool,
}

impl Subscription {
    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }

    /// Next message, or `None` once the subscriber has been closed and the
    /// buffered messages are drained
    pub async fn recv(&mut self) -> Option<ProgressMessage> {
        self.receiver.recv().await
    }

    /// Non-blocking receive of an already buffered message
    pub fn try_recv(&mut self) -> Option<ProgressMessage> {
        self.receiver.try_recv().ok()
    }

    /// Unregister now instead of waiting for drop
    pub fn close(mut self) {
        self.release();
    }

    /// Adapt into a stream that unregisters the client when dropped
    pub fn into_stream(self) -> impl Stream<Item = ProgressMessage> + Send {
        async_stream::stream! {
            let mut subscription = self;
            while let Some(message) = subscription.recv().await {
                yield message;
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.topic_id, &self.client_id, self.generation);
        }
        self.state.advance(SubscriberState::Closed);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic_id", &self.topic_id)
            .field("client_id", &self.client_id)
            .field("state", &self.state.get())
            .finish()
    }
}
