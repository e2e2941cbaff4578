// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The GraphQL execution engine.
//!
//! Operations are validated against a [`core_model::Schema`] and executed by an [`Engine`]:
//! resolvers come from a sealed [`DispatchTable`], fetches by key are batched per wave through
//! [`BatchLoader`]s, and subscriptions are fed by an [`event_broker::EventBroker`].

pub mod access_solver;
pub mod validation;

mod config;
mod context;
mod dispatch;
mod engine;
mod error;
mod execution;
mod loader;
mod resolver;
mod subscription;
mod value;

pub use config::EngineConfig;
pub use context::{
    CancellationReason, CancellationSignal, ExecutionContext, Identity, ResolverContext,
};
pub use dispatch::{DispatchError, DispatchTable, DispatchTableBuilder, ResolverKey};
pub use engine::{Engine, EngineBuilder};
pub use error::{ErrorKind, ExecutionError, FieldError, GraphQLError, PathSegment, Response};
pub use loader::{BatchCoordinator, BatchLoader, LoaderHandle, LoaderRegistry, LoaderStats};
pub use resolver::{
    FieldResolver, PropertyResolver, ResolveParams, SubscriptionResolver, SubscriptionSpec,
    resolver_fn,
};
pub use subscription::SubscriptionStream;
pub use validation::{
    field::ValidatedField, operation::ValidatedOperation, validation_error::ValidationError,
};
pub use value::{Deferred, FieldValue};
