// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    broker::{BrokerError, DeliveryPolicy, EventBroker, EventFilter, Registration, RegistrationId},
    in_process::InProcessBroker,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Message bus is closed")]
    Closed,

    #[error("Message bus transport failure: {0}")]
    Transport(String),

    #[error("Listener fell behind the message bus, {skipped} messages were lost")]
    Lagged { skipped: u64 },
}

/// An external message bus shared by every process that should observe the same events.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn send(&self, message: BusMessage) -> Result<(), BusError>;

    /// Messages sent to the bus from now on (including this process's own messages).
    ///
    /// An `Err` item reports messages this listener lost; the stream continues after it.
    fn listen(&self) -> BoxStream<'static, Result<BusMessage, BusError>>;
}

/// A broker whose publishes travel through a [`MessageBus`].
///
/// Local subscribers are served by an inner [`InProcessBroker`] fed from the bus, so an event
/// published here reaches local subscribers the same way it reaches remote ones, and every
/// broker on the bus sees events in the bus's order.
///
/// Events lost on the way (a full outbound queue, a lagging listener) close the affected local
/// `Buffer` subscribers with [`SinkError::Overflowed`](crate::SinkError::Overflowed), just as an
/// in-process overflow would. Lossy policies tolerate the gap.
pub struct BridgedBroker {
    local: Arc<InProcessBroker>,
    outbound: mpsc::Sender<BusMessage>,
    forwarder: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl BridgedBroker {
    /// Wire a broker to `bus`. Must be called from within a tokio runtime.
    ///
    /// `outbound_capacity` bounds the publishes waiting to be handed to the bus; beyond that,
    /// publishes are dropped rather than blocking the publisher.
    pub fn new<B: MessageBus>(bus: Arc<B>, outbound_capacity: usize) -> Self {
        let local = Arc::new(InProcessBroker::new());
        let (outbound, mut outbound_rx) = mpsc::channel::<BusMessage>(outbound_capacity.max(1));

        // Start listening before anything can be published, so our own first events come back
        let mut incoming = bus.listen();

        let forwarder = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = bus.send(message).await {
                    warn!("Failed to forward event to the message bus: {e}");
                }
            }
        });

        let listener = {
            let local = local.clone();
            tokio::spawn(async move {
                while let Some(message) = incoming.next().await {
                    match message {
                        Ok(BusMessage { topic, payload }) => local.publish(&topic, payload),
                        Err(e) => {
                            // The lost messages' topics are unknown
                            warn!("Message bus listener lost events: {e}");
                            local.overflow_buffered(None);
                        }
                    }
                }
                debug!("Message bus stream ended");
            })
        };

        Self {
            local,
            outbound,
            forwarder,
            listener,
        }
    }
}

impl EventBroker for BridgedBroker {
    fn publish(&self, topic: &str, event: Value) {
        let message = BusMessage {
            topic: topic.to_string(),
            payload: event,
        };

        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(topic = message.topic, "Outbound bus queue is full, dropping event");
                self.local.overflow_buffered(Some(&message.topic));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Ignoring publish after shutdown");
            }
        }
    }

    fn subscribe(
        &self,
        topic: &str,
        filter: EventFilter,
        policy: DeliveryPolicy,
    ) -> Result<Registration, BrokerError> {
        self.local.subscribe(topic, filter, policy)
    }

    fn unsubscribe(&self, id: RegistrationId) {
        self.local.unsubscribe(id)
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.local.subscriber_count(topic)
    }

    fn shutdown(&self) {
        self.forwarder.abort();
        self.listener.abort();
        self.local.shutdown();
    }
}

impl Drop for BridgedBroker {
    fn drop(&mut self) {
        self.forwarder.abort();
        self.listener.abort();
    }
}

/// An in-memory [`MessageBus`] built on a tokio broadcast channel.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn send(&self, message: BusMessage) -> Result<(), BusError> {
        // An error here only means nobody is listening right now
        if self.sender.send(message).is_err() {
            debug!("No listeners on the local bus");
        }
        Ok(())
    }

    fn listen(&self) -> BoxStream<'static, Result<BusMessage, BusError>> {
        let mut receiver = self.sender.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => yield Ok(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(BusError::Lagged { skipped });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
