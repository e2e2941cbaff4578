// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use event_broker::BrokerError;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::{dispatch::DispatchError, validation::validation_error::ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    UnresolvedField,
    Resolver,
    NotFound,
    Authorization,
    Timeout,
    Cancelled,
    Internal,
}

/// A failure while resolving a single field.
///
/// Field errors never abort sibling resolution: the engine records them in the response's error
/// list and nulls out the field (bubbling the null up through non-null ancestors).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("{0}")]
    Resolver(String),

    #[error("No value found for key {key} in loader '{loader}'")]
    NotFound { loader: &'static str, key: String },

    #[error("Not authorized")]
    Authorization,

    #[error("Cannot return null for non-nullable field {0}")]
    NullForNonNull(String),

    #[error("{0}")]
    InvalidValue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FieldError {
    pub fn resolver(message: impl Into<String>) -> Self {
        FieldError::Resolver(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FieldError::Internal(message.into())
    }

    pub fn not_found(loader: &'static str, key: &impl fmt::Debug) -> Self {
        FieldError::NotFound {
            loader,
            key: format!("{key:?}"),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldError::Resolver(_)
            | FieldError::NullForNonNull(_)
            | FieldError::InvalidValue(_) => ErrorKind::Resolver,
            FieldError::NotFound { .. } => ErrorKind::NotFound,
            FieldError::Authorization => ErrorKind::Authorization,
            FieldError::Internal(_) => ErrorKind::Internal,
        }
    }

    // Message that should be emitted when the error is returned to the user.
    // This should hide any internal details of the error.
    pub fn user_error_message(&self) -> String {
        match self {
            FieldError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(e: serde_json::Error) -> Self {
        FieldError::Internal(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathSegment::Field(name) => serializer.serialize_str(name),
            PathSegment::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// An entry of the response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQLError {
    pub message: String,
    pub path: Vec<PathSegment>,
    pub kind: ErrorKind,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>, path: Vec<PathSegment>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            path,
            kind,
        }
    }

    /// Convert a field error, logging the detail of internal errors (which callers never see).
    pub fn from_field_error(field_error: &FieldError, path: Vec<PathSegment>) -> Self {
        if let FieldError::Internal(detail) = field_error {
            error!(?path, "Internal error while resolving field: {detail}");
        }
        Self::new(field_error.user_error_message(), path, field_error.kind())
    }
}

/// The envelope produced for every operation (and for every subscription event).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<ExecutionError> for Response {
    fn from(error: ExecutionError) -> Self {
        Response {
            data: None,
            errors: vec![error.into_graphql_error()],
        }
    }
}

/// A failure of the operation as a whole (as opposed to a [`FieldError`]).
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cannot query field '{field_name}' on type '{type_name}'")]
    UnresolvedField {
        type_name: String,
        field_name: String,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Selection set is too deep (maximum depth is {0})")]
    SelectionSetTooDeep(usize),

    #[error("The schema does not support {0} operations")]
    UnsupportedOperation(&'static str),

    #[error("Subscription operations must select exactly one root field, found {0}")]
    SubscriptionRootCount(usize),

    #[error("Subscription operations must be started with subscribe")]
    SubscriptionNotExecutable,

    #[error("Only subscription operations can be subscribed to")]
    NotASubscription,

    #[error("{0}")]
    SubscriptionSetup(FieldError),

    #[error("Subscription could not be registered: {0}")]
    Subscription(#[from] BrokerError),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Validation(_)
            | ExecutionError::SelectionSetTooDeep(_)
            | ExecutionError::UnsupportedOperation(_)
            | ExecutionError::SubscriptionRootCount(_)
            | ExecutionError::SubscriptionNotExecutable
            | ExecutionError::NotASubscription => ErrorKind::Validation,
            ExecutionError::UnresolvedField { .. } | ExecutionError::Dispatch(_) => {
                ErrorKind::UnresolvedField
            }
            ExecutionError::SubscriptionSetup(field_error) => field_error.kind(),
            ExecutionError::Subscription(_) => ErrorKind::Resolver,
            ExecutionError::Cancelled => ErrorKind::Cancelled,
            ExecutionError::Timeout => ErrorKind::Timeout,
        }
    }

    pub fn user_error_message(&self) -> String {
        match self {
            ExecutionError::SubscriptionSetup(field_error) => field_error.user_error_message(),
            _ => self.to_string(),
        }
    }

    pub fn into_graphql_error(self) -> GraphQLError {
        match &self {
            ExecutionError::SubscriptionSetup(field_error) => {
                GraphQLError::from_field_error(field_error, vec![])
            }
            _ => GraphQLError::new(self.user_error_message(), vec![], self.kind()),
        }
    }
}
