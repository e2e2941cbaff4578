// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;

use crate::broker::DeliveryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Subscriber fell behind: more than {capacity} events were pending")]
    Overflowed { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// The event was queued after discarding the oldest pending one
    DroppedOldest,
    /// The event was discarded
    DroppedNewest,
    /// The sink just overflowed and is now closed
    Overflowed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkStatus {
    Open,
    Closed,
    /// Closed due to overflow; the receiver has not observed it yet
    Overflowed,
}

struct SinkState {
    queue: VecDeque<Value>,
    status: SinkStatus,
}

/// A bounded, single-consumer queue between the broker and one subscriber.
///
/// Pushing never waits: the delivery policy decides what to do once the queue is full.
pub(crate) struct Sink {
    policy: DeliveryPolicy,
    state: Mutex<SinkState>,
    notify: Notify,
}

impl Sink {
    pub(crate) fn new(policy: DeliveryPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            state: Mutex::new(SinkState {
                queue: VecDeque::with_capacity(policy.capacity().min(64)),
                status: SinkStatus::Open,
            }),
            notify: Notify::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        // The state is a plain queue, so it stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: Value) -> PushOutcome {
        let outcome = {
            let mut state = self.state();

            if state.status != SinkStatus::Open {
                return PushOutcome::Closed;
            }

            if state.queue.len() < self.policy.capacity() {
                state.queue.push_back(event);
                PushOutcome::Queued
            } else {
                match self.policy {
                    DeliveryPolicy::Buffer { .. } => {
                        state.status = SinkStatus::Overflowed;
                        PushOutcome::Overflowed
                    }
                    DeliveryPolicy::DropOldest { .. } => {
                        state.queue.pop_front();
                        state.queue.push_back(event);
                        PushOutcome::DroppedOldest
                    }
                    DeliveryPolicy::DropNewest { .. } => PushOutcome::DroppedNewest,
                }
            }
        };

        if outcome != PushOutcome::DroppedNewest {
            self.notify.notify_one();
        }
        outcome
    }

    pub(crate) fn close(&self) {
        {
            let mut state = self.state();
            if state.status == SinkStatus::Open {
                state.status = SinkStatus::Closed;
            }
        }
        self.notify.notify_one();
    }

    /// Close a `Buffer` sink as if it had overflowed, for events lost before reaching it.
    /// Lossy policies are left open. Returns whether the sink was closed.
    pub(crate) fn overflow(&self) -> bool {
        if !matches!(self.policy, DeliveryPolicy::Buffer { .. }) {
            return false;
        }

        {
            let mut state = self.state();
            if state.status != SinkStatus::Open {
                return false;
            }
            state.status = SinkStatus::Overflowed;
        }
        self.notify.notify_one();
        true
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.state().status == SinkStatus::Open
    }
}

pub(crate) struct SinkReceiver {
    sink: Arc<Sink>,
}

impl SinkReceiver {
    pub(crate) fn new(sink: Arc<Sink>) -> Self {
        Self { sink }
    }

    pub(crate) async fn recv(&mut self) -> Option<Result<Value, SinkError>> {
        loop {
            // Created before inspecting the state so that a push racing with this check still
            // leaves a permit behind
            let notified = self.sink.notify.notified();

            {
                let mut state = self.sink.state();
                if let Some(event) = state.queue.pop_front() {
                    return Some(Ok(event));
                }
                match state.status {
                    SinkStatus::Open => {}
                    SinkStatus::Closed => return None,
                    SinkStatus::Overflowed => {
                        state.status = SinkStatus::Closed;
                        return Some(Err(SinkError::Overflowed {
                            capacity: self.sink.policy.capacity(),
                        }));
                    }
                }
            }

            notified.await;
        }
    }
}
