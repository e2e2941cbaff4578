// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use common::{
    EnvError, Environment,
    env_const::{
        DEFAULT_MAX_QUERY_DEPTH, DEFAULT_SUBSCRIPTION_BUFFER_SIZE, OverflowMode,
        get_loader_max_batch_size, get_max_query_depth, get_subscription_buffer_size,
        get_subscription_overflow,
    },
};
use event_broker::DeliveryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest selection set accepted (root fields are at depth 1)
    pub max_query_depth: usize,
    /// Cap on keys per batch-fetch call; `None` sends every queued key in one call
    pub max_batch_size: Option<usize>,
    /// Used by subscriptions whose resolver does not choose a delivery policy
    pub subscription_delivery: DeliveryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_query_depth: DEFAULT_MAX_QUERY_DEPTH,
            max_batch_size: None,
            subscription_delivery: DeliveryPolicy::Buffer {
                capacity: DEFAULT_SUBSCRIPTION_BUFFER_SIZE,
            },
        }
    }
}

impl EngineConfig {
    pub fn from_env(env: &dyn Environment) -> Result<Self, EnvError> {
        let capacity = get_subscription_buffer_size(env)?;
        let subscription_delivery = match get_subscription_overflow(env)? {
            OverflowMode::Buffer => DeliveryPolicy::Buffer { capacity },
            OverflowMode::DropOldest => DeliveryPolicy::DropOldest { capacity },
            OverflowMode::DropNewest => DeliveryPolicy::DropNewest { capacity },
        };

        Ok(Self {
            max_query_depth: get_max_query_depth(env)?,
            max_batch_size: get_loader_max_batch_size(env)?,
            subscription_delivery,
        })
    }
}
