// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_stream::stream;
use event_broker::{EventBroker, Registration, RegistrationId};
use futures::{Stream, StreamExt, stream::BoxStream};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    context::ExecutionContext,
    engine::Engine,
    error::{ErrorKind, GraphQLError, Response},
    resolver::SubscriptionResolver,
    validation::field::ValidatedField,
};

const FELL_BEHIND_MESSAGE: &str = "Subscription closed: subscriber fell behind";

/// Unsubscribes when the stream goes away, however it ends.
///
/// The watcher releases the registration as soon as the context is cancelled, even if nobody is
/// polling the stream at the time.
struct RegistrationGuard {
    broker: Arc<dyn EventBroker>,
    id: RegistrationId,
    watcher: JoinHandle<()>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.watcher.abort();
        self.broker.unsubscribe(self.id);
        debug!(registration = %self.id, "Subscription released");
    }
}

/// The envelopes of an active subscription, one per delivered event.
///
/// The stream ends when the subscription's context is cancelled, when the broker shuts down, or
/// (after a final error envelope) when a `Buffer` subscriber falls behind.
pub struct SubscriptionStream {
    id: RegistrationId,
    inner: BoxStream<'static, Response>,
}

impl SubscriptionStream {
    pub(crate) fn new(
        engine: Engine,
        root_type: String,
        root_field: ValidatedField,
        resolver: Arc<dyn SubscriptionResolver>,
        variables: Arc<Map<String, Value>>,
        context: ExecutionContext,
        mut registration: Registration,
    ) -> Self {
        let id = registration.id();
        let broker = engine.broker().clone();

        let watcher = {
            let broker = broker.clone();
            let cancellation = context.cancellation.clone();
            tokio::spawn(async move {
                cancellation.cancelled().await;
                broker.unsubscribe(id);
                debug!(registration = %id, "Subscription cancelled");
            })
        };

        let guard = RegistrationGuard {
            broker,
            id,
            watcher,
        };

        let inner = stream! {
            let _guard = guard;

            loop {
                let event = tokio::select! {
                    biased;
                    _ = context.cancellation.cancelled() => break,
                    event = registration.recv() => event,
                };

                match event {
                    None => break,
                    Some(Err(e)) => {
                        warn!(registration = %id, error = %e, "Closing subscription");
                        yield Response {
                            data: None,
                            errors: vec![GraphQLError::new(
                                FELL_BEHIND_MESSAGE,
                                vec![],
                                ErrorKind::Internal,
                            )],
                        };
                        break;
                    }
                    Some(Ok(event)) => {
                        let response = engine
                            .execute_event(
                                &root_type,
                                &root_field,
                                resolver.as_ref(),
                                &variables,
                                &context,
                                event,
                            )
                            .await;

                        match response {
                            Some(response) => yield response,
                            None => break,
                        }
                    }
                }
            }

            debug!(registration = %id, "Subscription stream ended");
        };

        Self {
            id,
            inner: inner.boxed(),
        }
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.id
    }
}

impl Stream for SubscriptionStream {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
