// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! # Access control expressions
//!
//! Access control expressions describe who may resolve a field, such as "any authenticated
//! caller", "callers with the `admin` role" or "callers whose `tenant` claim is `acme`". They are
//! combined with the usual logical operators and evaluated against the identity attached to the
//! execution context (see `core_resolver::access_solver`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum AccessExpression {
    BooleanLiteral(bool),
    /// The caller presented an identity (a subject)
    Authenticated,
    /// The caller holds the given role
    Role(String),
    /// The caller's claim `claim` equals `value`
    ClaimEq { claim: String, value: Value },
    Not(Box<AccessExpression>),
    And(Box<AccessExpression>, Box<AccessExpression>),
    Or(Box<AccessExpression>, Box<AccessExpression>),
}

impl AccessExpression {
    pub fn role(role: impl Into<String>) -> Self {
        AccessExpression::Role(role.into())
    }

    pub fn claim_eq(claim: impl Into<String>, value: impl Into<Value>) -> Self {
        AccessExpression::ClaimEq {
            claim: claim.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: AccessExpression) -> Self {
        AccessExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: AccessExpression) -> Self {
        AccessExpression::Or(Box::new(self), Box::new(other))
    }

    pub fn is_public(&self) -> bool {
        matches!(self, AccessExpression::BooleanLiteral(true))
    }
}

impl std::ops::Not for AccessExpression {
    type Output = AccessExpression;

    fn not(self) -> Self::Output {
        AccessExpression::Not(Box::new(self))
    }
}
