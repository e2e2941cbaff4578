// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sink::{SinkError, SinkReceiver};

/// Decides whether a published event is delivered to a subscriber.
///
/// Evaluated on the publisher's task, so it must be cheap and must not block.
pub type EventFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub fn accept_all() -> EventFilter {
    Arc::new(|_| true)
}

/// What happens when a subscriber's sink is full.
///
/// The right choice depends on the kind of stream. A chat stream should use `Buffer` (a
/// subscriber that falls behind is disconnected rather than silently missing messages), while a
/// price ticker is better served by `DropOldest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum DeliveryPolicy {
    /// Queue up to `capacity` events; on overflow the sink is closed with
    /// [`SinkError::Overflowed`].
    Buffer { capacity: usize },
    /// Queue up to `capacity` events; on overflow discard the oldest queued event.
    DropOldest { capacity: usize },
    /// Queue up to `capacity` events; on overflow discard the incoming event.
    DropNewest { capacity: usize },
}

impl DeliveryPolicy {
    pub fn capacity(&self) -> usize {
        match self {
            DeliveryPolicy::Buffer { capacity }
            | DeliveryPolicy::DropOldest { capacity }
            | DeliveryPolicy::DropNewest { capacity } => *capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub(crate) u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration-{}", self.0)
    }
}

/// The receiving end of a subscription.
///
/// Dropping a `Registration` stops consumption but does not remove it from the broker; call
/// [`EventBroker::unsubscribe`] (the engine does so through a guard) to release it.
pub struct Registration {
    id: RegistrationId,
    topic: String,
    receiver: SinkReceiver,
}

impl Registration {
    pub(crate) fn new(id: RegistrationId, topic: String, receiver: SinkReceiver) -> Self {
        Self {
            id,
            topic,
            receiver,
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the registration has been unsubscribed or the broker shut down (after
    /// any queued events have been drained). An overflowed `Buffer` sink yields its queued events,
    /// then a single `Err(SinkError::Overflowed)`, then `None`.
    pub async fn recv(&mut self) -> Option<Result<Value, SinkError>> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Invalid topic '{0}'")]
    InvalidTopic(String),

    #[error("Subscriber capacity must be at least 1")]
    InvalidCapacity,

    #[error("Event broker has been shut down")]
    ShutDown,
}

/// Publish/subscribe keyed by topic.
///
/// Implementations must never let a slow subscriber block `publish`, and `unsubscribe` must be
/// idempotent.
pub trait EventBroker: Send + Sync {
    /// Deliver `event` to every current subscriber of `topic` whose filter accepts it.
    fn publish(&self, topic: &str, event: Value);

    fn subscribe(
        &self,
        topic: &str,
        filter: EventFilter,
        policy: DeliveryPolicy,
    ) -> Result<Registration, BrokerError>;

    fn unsubscribe(&self, id: RegistrationId);

    fn subscriber_count(&self, topic: &str) -> usize;

    /// Close every subscriber sink and reject further subscriptions. Publishing after shutdown
    /// is a no-op.
    fn shutdown(&self);
}

pub(crate) fn validate_subscription(
    topic: &str,
    policy: &DeliveryPolicy,
) -> Result<(), BrokerError> {
    if topic.trim().is_empty() {
        return Err(BrokerError::InvalidTopic(topic.to_string()));
    }
    if policy.capacity() == 0 {
        return Err(BrokerError::InvalidCapacity);
    }
    Ok(())
}
