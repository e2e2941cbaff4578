// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    broker::{
        BrokerError, DeliveryPolicy, EventBroker, EventFilter, Registration, RegistrationId,
        validate_subscription,
    },
    sink::{PushOutcome, Sink, SinkReceiver},
};

struct Subscriber {
    filter: EventFilter,
    sink: Arc<Sink>,
}

/// The default broker: subscribers live in the same process as publishers.
///
/// Subscribers are grouped per topic in a concurrent map, so publishing, subscribing and
/// unsubscribing from unrelated operations never contend on a single lock.
#[derive(Default)]
pub struct InProcessBroker {
    topics: DashMap<String, HashMap<RegistrationId, Subscriber>>,
    registrations: DashMap<RegistrationId, String>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Close and remove the `Buffer` subscribers of `topic` (of every topic if `None`) after
    /// events bound for them were lost upstream. Subscribers with a lossy policy stay.
    pub(crate) fn overflow_buffered(&self, topic: Option<&str>) {
        let mut closed = vec![];

        match topic {
            Some(topic) => {
                if let Some(subscribers) = self.topics.get(topic) {
                    overflow_all(subscribers.value(), &mut closed);
                }
            }
            None => {
                for subscribers in self.topics.iter() {
                    overflow_all(subscribers.value(), &mut closed);
                }
            }
        }

        for id in closed {
            warn!(%id, "Events were lost before delivery, closing its subscription");
            self.unsubscribe(id);
        }
    }
}

fn overflow_all(
    subscribers: &HashMap<RegistrationId, Subscriber>,
    closed: &mut Vec<RegistrationId>,
) {
    closed.extend(
        subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.sink.overflow())
            .map(|(id, _)| *id),
    );
}

impl EventBroker for InProcessBroker {
    #[instrument(level = "trace", skip(self, event))]
    fn publish(&self, topic: &str, event: Value) {
        if self.is_shut_down() {
            debug!("Ignoring publish after shutdown");
            return;
        }

        let mut closed = vec![];

        if let Some(subscribers) = self.topics.get(topic) {
            for (id, subscriber) in subscribers.iter() {
                if !(subscriber.filter)(&event) {
                    continue;
                }

                match subscriber.sink.push(event.clone()) {
                    PushOutcome::Queued => {}
                    PushOutcome::DroppedOldest | PushOutcome::DroppedNewest => {
                        debug!(%id, "Subscriber is full, dropped an event");
                    }
                    PushOutcome::Overflowed => {
                        warn!(%id, "Subscriber fell behind, closing its subscription");
                        closed.push(*id);
                    }
                    PushOutcome::Closed => closed.push(*id),
                }
            }
        }

        // Removal must wait until the read guard above is released
        for id in closed {
            self.unsubscribe(id);
        }
    }

    fn subscribe(
        &self,
        topic: &str,
        filter: EventFilter,
        policy: DeliveryPolicy,
    ) -> Result<Registration, BrokerError> {
        validate_subscription(topic, &policy)?;

        if self.is_shut_down() {
            return Err(BrokerError::ShutDown);
        }

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sink = Sink::new(policy);

        self.registrations.insert(id, topic.to_string());
        self.topics.entry(topic.to_string()).or_default().insert(
            id,
            Subscriber {
                filter,
                sink: sink.clone(),
            },
        );

        // A shutdown racing with this subscription may have missed the new entry
        if self.is_shut_down() {
            self.unsubscribe(id);
            return Err(BrokerError::ShutDown);
        }

        debug!(%id, topic, ?policy, "Subscribed");

        Ok(Registration::new(
            id,
            topic.to_string(),
            SinkReceiver::new(sink),
        ))
    }

    fn unsubscribe(&self, id: RegistrationId) {
        let Some((_, topic)) = self.registrations.remove(&id) else {
            return;
        };

        if let dashmap::Entry::Occupied(mut entry) = self.topics.entry(topic) {
            if let Some(subscriber) = entry.get_mut().remove(&id) {
                subscriber.sink.close();
            }
            if entry.get().is_empty() {
                entry.remove();
            }
        }

        debug!(%id, "Unsubscribed");
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);

        let ids = self
            .registrations
            .iter()
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();

        for id in ids {
            self.unsubscribe(id);
        }

        debug!("Event broker shut down");
    }
}
