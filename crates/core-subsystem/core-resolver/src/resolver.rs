// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use event_broker::{DeliveryPolicy, EventFilter, accept_all};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{context::ResolverContext, error::FieldError, value::FieldValue};

/// Everything a resolver receives for one field.
pub struct ResolveParams {
    /// The value of the enclosing object (the event payload or `null` at the root)
    pub parent: Arc<Value>,
    /// Arguments after variable substitution, with declared defaults filled in
    pub arguments: IndexMap<String, Value>,
    pub context: ResolverContext,
    pub type_name: String,
    pub field_name: String,
}

impl ResolveParams {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|value| !value.is_null())
    }

    pub fn optional_argument<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, FieldError> {
        self.argument(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    FieldError::resolver(format!("Invalid value for argument '{name}': {e}"))
                })
            })
            .transpose()
    }

    pub fn required_argument<T: DeserializeOwned>(&self, name: &str) -> Result<T, FieldError> {
        self.optional_argument(name)?
            .ok_or_else(|| FieldError::resolver(format!("Missing argument '{name}'")))
    }
}

#[async_trait]
pub trait FieldResolver: Send + Sync {
    async fn resolve(&self, params: ResolveParams) -> Result<FieldValue, FieldError>;
}

/// Reads the same-named key of the parent object (`null` if absent).
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyResolver;

#[async_trait]
impl FieldResolver for PropertyResolver {
    async fn resolve(&self, params: ResolveParams) -> Result<FieldValue, FieldError> {
        Ok(FieldValue::Value(
            params
                .parent
                .get(&params.field_name)
                .cloned()
                .unwrap_or(Value::Null),
        ))
    }
}

struct FnResolver<F>(F);

#[async_trait]
impl<F, Fut> FieldResolver for FnResolver<F>
where
    F: Fn(ResolveParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldValue, FieldError>> + Send + 'static,
{
    async fn resolve(&self, params: ResolveParams) -> Result<FieldValue, FieldError> {
        (self.0)(params).await
    }
}

/// Adapt an async closure into a resolver.
pub fn resolver_fn<F, Fut>(f: F) -> Arc<dyn FieldResolver>
where
    F: Fn(ResolveParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FieldValue, FieldError>> + Send + 'static,
{
    Arc::new(FnResolver(f))
}

/// Where a subscription listens: derived once from the root field's arguments.
pub struct SubscriptionSpec {
    pub topic: String,
    pub filter: EventFilter,
}

impl SubscriptionSpec {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            filter: accept_all(),
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }
}

/// The resolver of a subscription root field.
#[async_trait]
pub trait SubscriptionResolver: Send + Sync {
    async fn subscribe(&self, params: ResolveParams) -> Result<SubscriptionSpec, FieldError>;

    /// Map a delivered event to the value of the root field.
    fn resolve_event(&self, event: Value) -> Result<Value, FieldError> {
        Ok(event)
    }

    /// How events are queued for a slow subscriber. `None` uses the engine's configured default.
    fn delivery_policy(&self) -> Option<DeliveryPolicy> {
        None
    }
}
