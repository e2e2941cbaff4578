// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! What a resolver produces.
//!
//! A resolver either returns a ready value (a JSON value, possibly a list of independent items),
//! an error, or a [`Deferred`] value that will be filled in when the batch coordinator flushes.
//! Deferred values let a resolver return immediately after queuing a load, which is what allows
//! the engine to collect every load of a wave before issuing a single batched fetch.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use serde_json::Value;

use crate::error::FieldError;

pub(crate) type Slot = Arc<OnceLock<Result<Value, FieldError>>>;

type Continuation = Box<dyn FnOnce(Value) -> FieldValue + Send>;

pub enum FieldValue {
    Value(Value),
    /// A list whose items settle (or fail) independently
    List(Vec<FieldValue>),
    Deferred(Deferred),
    Error(FieldError),
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Value(Value::Null)
    }

    /// Chain `f` onto a ready or deferred value.
    ///
    /// Lists and errors are returned unchanged.
    pub fn and_then<F>(self, f: F) -> FieldValue
    where
        F: FnOnce(Value) -> FieldValue + Send + 'static,
    {
        match self {
            FieldValue::Value(value) => f(value),
            FieldValue::Deferred(deferred) => FieldValue::Deferred(deferred.map(f)),
            other => other,
        }
    }

    /// Replace every deferred value whose load has completed. Returns `true` once nothing is
    /// left pending.
    pub(crate) fn settle(&mut self) -> bool {
        match self {
            FieldValue::List(items) => items
                .iter_mut()
                .fold(true, |settled, item| item.settle() && settled),
            FieldValue::Deferred(deferred) => match deferred.take_settled() {
                Some(settled) => {
                    *self = settled;
                    self.settle()
                }
                None => false,
            },
            FieldValue::Value(_) | FieldValue::Error(_) => true,
        }
    }

    /// Turn every still-pending deferred value into an error.
    pub(crate) fn abandon_pending(&mut self) {
        match self {
            FieldValue::List(items) => items.iter_mut().for_each(FieldValue::abandon_pending),
            FieldValue::Deferred(deferred) => {
                *self = FieldValue::Error(FieldError::internal(format!(
                    "Load from '{}' was never flushed",
                    deferred.loader
                )));
            }
            FieldValue::Value(_) | FieldValue::Error(_) => {}
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldValue::List(items) => f.debug_tuple("List").field(items).finish(),
            FieldValue::Deferred(deferred) => deferred.fmt(f),
            FieldValue::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<FieldError> for FieldValue {
    fn from(error: FieldError) -> Self {
        FieldValue::Error(error)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

/// A value waiting on a batch load.
pub struct Deferred {
    loader: &'static str,
    slot: Slot,
    continuation: Option<Continuation>,
}

impl Deferred {
    pub(crate) fn new(loader: &'static str, slot: Slot) -> Self {
        Self {
            loader,
            slot,
            continuation: None,
        }
    }

    pub fn loader(&self) -> &'static str {
        self.loader
    }

    /// Transform the loaded value once available. `f` may itself return another deferred load,
    /// which the engine settles within the same wave.
    pub fn map<F>(self, f: F) -> Deferred
    where
        F: FnOnce(Value) -> FieldValue + Send + 'static,
    {
        let Deferred {
            loader,
            slot,
            continuation,
        } = self;

        let continuation: Continuation = match continuation {
            None => Box::new(f),
            Some(previous) => Box::new(move |value| previous(value).and_then(f)),
        };

        Deferred {
            loader,
            slot,
            continuation: Some(continuation),
        }
    }

    fn take_settled(&mut self) -> Option<FieldValue> {
        let loaded = self.slot.get()?;

        Some(match loaded {
            Ok(value) => match self.continuation.take() {
                Some(continuation) => continuation(value.clone()),
                None => FieldValue::Value(value.clone()),
            },
            Err(error) => FieldValue::Error(error.clone()),
        })
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("loader", &self.loader)
            .field("loaded", &self.slot.get().is_some())
            .finish()
    }
}
