// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Topic-keyed publish/subscribe used to feed subscription operations.
//!
//! [`InProcessBroker`] fans events out to subscribers living in the same process.
//! [`BridgedBroker`] satisfies the same [`EventBroker`] contract over an external [`MessageBus`],
//! so several processes (or several brokers in one process, via [`LocalBus`]) observe the same
//! stream of events.

mod bridged;
mod broker;
mod in_process;
mod sink;

pub use bridged::{BridgedBroker, BusError, BusMessage, LocalBus, MessageBus};
pub use broker::{
    BrokerError, DeliveryPolicy, EventBroker, EventFilter, Registration, RegistrationId,
    accept_all,
};
pub use in_process::InProcessBroker;
pub use sink::SinkError;
