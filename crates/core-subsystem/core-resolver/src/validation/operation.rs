// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::types::OperationType;

use crate::validation::field::ValidatedField;

/// An operation whose variables have been substituted, fragments flattened and fields checked
/// against the schema.
#[derive(Debug, Clone)]
pub struct ValidatedOperation {
    pub name: Option<String>,
    /// The type of operation.
    pub typ: OperationType,
    /// The operation's root fields, in document order.
    pub fields: Vec<ValidatedField>,
}

impl ValidatedOperation {
    pub fn new(typ: OperationType, fields: Vec<ValidatedField>) -> Self {
        Self {
            name: None,
            typ,
            fields,
        }
    }

    pub fn depth(&self) -> usize {
        self.fields
            .iter()
            .map(ValidatedField::depth)
            .max()
            .unwrap_or(0)
    }
}
