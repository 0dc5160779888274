//! Live progress fan-out
//!
//! Subscribers register per topic (an assignment id) and receive every
//! [`ProgressMessage`](rubric_common::ProgressMessage) published to that
//! topic in publish order, each over its own bounded channel.

mod registry;
mod subscription;

pub use registry::{BroadcastError, ProgressBroadcaster, DEFAULT_SUBSCRIBER_BUFFER};
pub use subscription::{SubscriberState, Subscription};
