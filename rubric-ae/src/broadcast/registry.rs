//! Per-topic subscriber registry and fan-out

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::subscription::{StateCell, SubscriberState, Subscription};
use rubric_common::events::{ProgressMessage, UserInfo};

/// Default per-subscriber buffer (messages)
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Broadcaster errors
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// `shutdown()` was called; no new subscriptions are accepted
    #[error("Progress broadcaster is shut down")]
    ShuttingDown,
}

struct SubscriberEntry {
    user: UserInfo,
    generation: u64,
    tx: mpsc::Sender<ProgressMessage>,
    state: Arc<StateCell>,
}

impl SubscriberEntry {
    fn close(self) -> UserInfo {
        self.state.advance(SubscriberState::Closing);
        drop(self.tx);
        self.state.advance(SubscriberState::Closed);
        self.user
    }
}

type Topics = HashMap<String, HashMap<String, SubscriberEntry>>;

/// Registry state shared by the broadcaster and its subscriptions
pub(crate) struct Registry {
    topics: Mutex<Topics>,
    buffer: usize,
    accepting: AtomicBool,
    next_generation: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove a subscriber on behalf of its dropped [`Subscription`]
    ///
    /// Only the registration that issued the subscription is removed; a
    /// newer connection that reused the client id is left alone.
    pub(crate) fn release(&self, topic_id: &str, client_id: &str, generation: u64) {
        let mut topics = self.lock();
        let matches = topics
            .get(topic_id)
            .and_then(|subs| subs.get(client_id))
            .is_some_and(|entry| entry.generation == generation);

        if matches {
            debug!(topic = topic_id, client = client_id, "Subscriber disconnected");
            remove_and_announce(&mut topics, topic_id, client_id);
        }
    }
}

/// Fan-out of progress messages to the subscribers of each topic
///
/// Cheap to clone; clones share the registry. Each test (or service) owns
/// its own instance.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    registry: Arc<Registry>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster
    ///
    /// # Arguments
    /// * `buffer` - Messages buffered per subscriber before it is considered
    ///   too slow and dropped (minimum 1)
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        info!("Progress broadcaster initialized with per-subscriber buffer {}", buffer);
        Self {
            registry: Arc::new(Registry {
                topics: Mutex::new(HashMap::new()),
                buffer,
                accepting: AtomicBool::new(true),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Register `client_id` on `topic_id`
    ///
    /// The new client first receives a `connected` acknowledgment; the other
    /// subscribers of the topic receive `user_joined`. Re-subscribing with a
    /// client id that is still registered replaces the old registration
    /// (whose stream then ends); the others see `user_left` for it before the
    /// new `user_joined`.
    pub fn subscribe(
        &self,
        topic_id: &str,
        client_id: &str,
        user: UserInfo,
    ) -> Result<Subscription, BroadcastError> {
        if !self.registry.accepting.load(Ordering::SeqCst) {
            return Err(BroadcastError::ShuttingDown);
        }

        let (tx, receiver) = mpsc::channel(self.registry.buffer);
        let state = StateCell::new();
        let generation = self.registry.next_generation.fetch_add(1, Ordering::SeqCst);

        // Fresh channel with capacity >= 1: cannot fail
        let _ = tx.try_send(ProgressMessage::Connected {
            client_id: client_id.to_string(),
            user: user.clone(),
        });

        {
            let mut topics = self.registry.lock();

            let previous = topics
                .get_mut(topic_id)
                .and_then(|subscribers| subscribers.remove(client_id));
            if let Some(previous) = previous {
                debug!(topic = topic_id, client = client_id, "Replacing previous registration");
                let replaced = previous.close();
                deliver(
                    &mut topics,
                    topic_id,
                    &ProgressMessage::user_left(replaced),
                    Some(client_id),
                );
            }

            topics.entry(topic_id.to_string()).or_default().insert(
                client_id.to_string(),
                SubscriberEntry {
                    user: user.clone(),
                    generation,
                    tx,
                    state: Arc::clone(&state),
                },
            );
            state.advance(SubscriberState::Open);

            deliver(
                &mut topics,
                topic_id,
                &ProgressMessage::user_joined(user),
                Some(client_id),
            );
        }

        info!(
            topic = topic_id,
            client = client_id,
            subscribers = self.subscriber_count(topic_id),
            "Subscriber connected"
        );

        Ok(Subscription {
            topic_id: topic_id.to_string(),
            client_id: client_id.to_string(),
            generation,
            receiver,
            state,
            registry: Arc::downgrade(&self.registry),
            released: false,
        })
    }

    /// Remove `client_id` from `topic_id` and announce `user_left`
    ///
    /// Idempotent: returns `false` if the client was not registered.
    pub fn unsubscribe(&self, topic_id: &str, client_id: &str) -> bool {
        let mut topics = self.registry.lock();
        let removed = remove_and_announce(&mut topics, topic_id, client_id);
        if removed {
            debug!(topic = topic_id, client = client_id, "Subscriber removed");
        }
        removed
    }

    /// Push `message` to every subscriber of `topic_id` except `exclude_client_id`
    ///
    /// Never blocks: a subscriber whose channel is closed or full is removed
    /// (and `user_left` is announced for it) instead of stalling the others.
    ///
    /// # Returns
    /// Number of subscribers the message was delivered to
    pub fn broadcast(
        &self,
        topic_id: &str,
        message: ProgressMessage,
        exclude_client_id: Option<&str>,
    ) -> usize {
        let mut topics = self.registry.lock();
        let delivered = deliver(&mut topics, topic_id, &message, exclude_client_id);
        debug!(
            topic = topic_id,
            event = message.event_type(),
            delivered,
            "Broadcast progress message"
        );
        delivered
    }

    /// Close every subscriber and stop accepting new ones
    ///
    /// Streams end after their buffered messages are drained.
    pub fn shutdown(&self) {
        self.registry.accepting.store(false, Ordering::SeqCst);
        let drained: Vec<_> = self.registry.lock().drain().collect();

        let mut closed = 0;
        for (_, subscribers) in drained {
            for (_, entry) in subscribers {
                entry.close();
                closed += 1;
            }
        }
        info!(closed, "Progress broadcaster shut down");
    }

    pub fn subscriber_count(&self, topic_id: &str) -> usize {
        self.registry.lock().get(topic_id).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_subscribed(&self, topic_id: &str, client_id: &str) -> bool {
        self.registry
            .lock()
            .get(topic_id)
            .is_some_and(|subs| subs.contains_key(client_id))
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Deliver to a topic, then announce departures of any subscribers that
/// could not take the message
fn deliver(
    topics: &mut Topics,
    topic_id: &str,
    message: &ProgressMessage,
    exclude: Option<&str>,
) -> usize {
    let (delivered, mut departed) = try_deliver(topics, topic_id, message, exclude);

    while let Some(user) = departed.pop() {
        let (_, more) = try_deliver(topics, topic_id, &ProgressMessage::user_left(user), None);
        departed.extend(more);
    }

    if topics.get(topic_id).is_some_and(HashMap::is_empty) {
        topics.remove(topic_id);
    }
    delivered
}

fn try_deliver(
    topics: &mut Topics,
    topic_id: &str,
    message: &ProgressMessage,
    exclude: Option<&str>,
) -> (usize, Vec<UserInfo>) {
    let Some(subscribers) = topics.get_mut(topic_id) else {
        return (0, Vec::new());
    };

    let mut delivered = 0;
    let mut dead = Vec::new();

    for (client_id, entry) in subscribers.iter() {
        if exclude == Some(client_id.as_str()) {
            continue;
        }
        match entry.tx.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(topic = topic_id, client = %client_id, "Dropping slow subscriber");
                dead.push(client_id.clone());
            }
            Err(TrySendError::Closed(_)) => {
                debug!(topic = topic_id, client = %client_id, "Dropping disconnected subscriber");
                dead.push(client_id.clone());
            }
        }
    }

    let departed = dead
        .into_iter()
        .filter_map(|client_id| subscribers.remove(&client_id))
        .map(SubscriberEntry::close)
        .collect();

    (delivered, departed)
}

fn remove_and_announce(topics: &mut Topics, topic_id: &str, client_id: &str) -> bool {
    let Some(entry) = topics
        .get_mut(topic_id)
        .and_then(|subscribers| subscribers.remove(client_id))
    else {
        return false;
    };

    let user = entry.close();
    deliver(topics, topic_id, &ProgressMessage::user_left(user), None);
    true
}
