// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
    time::Duration,
};

use event_broker::EventBroker;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ExecutionError,
    loader::{BatchCoordinator, BatchLoader, LoaderHandle, LoaderStats},
};

/// The already-authenticated caller of an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    Cancelled,
    TimedOut,
}

/// Cancels an in-flight operation or an active subscription.
///
/// Clones share the same state: cancel through any clone and every holder observes it.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancellationReason>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel_with(CancellationReason::Cancelled);
    }

    /// Cancel, reporting a timeout rather than a plain cancellation.
    pub fn time_out(&self) {
        self.cancel_with(CancellationReason::TimedOut);
    }

    /// Time out after `duration` unless cancelled earlier. Must be called within a tokio runtime.
    pub fn time_out_after(&self, duration: Duration) {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.token.cancelled() => {}
                _ = tokio::time::sleep(duration) => signal.time_out(),
            }
        });
    }

    fn cancel_with(&self, reason: CancellationReason) {
        // The first reason wins
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancellationReason> {
        self.reason.get().copied()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub(crate) fn error(&self) -> ExecutionError {
        match self.reason() {
            Some(CancellationReason::TimedOut) => ExecutionError::Timeout,
            _ => ExecutionError::Cancelled,
        }
    }
}

/// Per-operation state: who is asking, the operation's batch coordinator and its cancellation
/// signal. Created through [`Engine::context`](crate::Engine::context) and never shared between
/// operations.
pub struct ExecutionContext {
    pub(crate) identity: Arc<Identity>,
    pub(crate) cancellation: CancellationSignal,
    pub(crate) coordinator: Arc<BatchCoordinator>,
}

impl ExecutionContext {
    pub(crate) fn new(identity: Identity, coordinator: BatchCoordinator) -> Self {
        Self {
            identity: Arc::new(identity),
            cancellation: CancellationSignal::new(),
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel()
    }

    pub fn loader_stats(&self) -> BTreeMap<&'static str, LoaderStats> {
        self.coordinator.stats()
    }
}

struct ResolverContextInner {
    identity: Arc<Identity>,
    coordinator: Arc<BatchCoordinator>,
    variables: Arc<Map<String, Value>>,
    broker: Arc<dyn EventBroker>,
    cancellation: CancellationSignal,
}

/// What a resolver sees of the operation it runs in.
#[derive(Clone)]
pub struct ResolverContext {
    inner: Arc<ResolverContextInner>,
}

impl ResolverContext {
    pub(crate) fn new(
        context: &ExecutionContext,
        variables: Arc<Map<String, Value>>,
        broker: Arc<dyn EventBroker>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverContextInner {
                identity: context.identity.clone(),
                coordinator: context.coordinator.clone(),
                variables,
                broker,
                cancellation: context.cancellation.clone(),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Queue loads on the operation's batch coordinator.
    ///
    /// Loads return a deferred [`FieldValue`](crate::FieldValue) that settles once the engine
    /// flushes the loader at the end of the current wave.
    pub fn loader<L: BatchLoader>(&self) -> LoaderHandle<'_, L> {
        self.inner.coordinator.handle::<L>()
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.inner.variables
    }

    pub fn publish(&self, topic: &str, payload: Value) {
        self.inner.broker.publish(topic, payload)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cancellation_reason_wins() {
        let signal = CancellationSignal::new();
        let observer = signal.clone();

        signal.time_out();
        signal.cancel();

        assert!(observer.is_cancelled());
        assert_eq!(observer.reason(), Some(CancellationReason::TimedOut));
        assert!(matches!(observer.error(), ExecutionError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_duration() {
        let signal = CancellationSignal::new();
        signal.time_out_after(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(signal.reason(), Some(CancellationReason::TimedOut));
    }
}
