// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use thiserror::Error;

/// Errors detected while building a [`Schema`](crate::schema::Schema). All of them are
/// startup-time configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("Field '{field_name}' is defined more than once on type '{type_name}'")]
    DuplicateField {
        type_name: String,
        field_name: String,
    },

    #[error("Type '{type_name}' referenced by '{referenced_by}' is not defined")]
    UnknownType {
        type_name: String,
        referenced_by: String,
    },

    #[error("Argument '{argument_name}' of '{field}' must be a scalar or enum type, found '{type_name}'")]
    NonInputArgument {
        field: String,
        argument_name: String,
        type_name: String,
    },

    #[error("Object type '{0}' must define at least one field")]
    EmptyObject(String),

    #[error("Root type '{0}' is not defined")]
    MissingRootType(String),

    #[error("Root type '{0}' must be an object type")]
    RootNotObject(String),
}
