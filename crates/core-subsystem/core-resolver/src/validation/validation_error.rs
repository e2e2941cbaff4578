// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::Pos;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{0}")]
    QueryParsingFailed(String, Pos, Option<Pos>),

    #[error("Variable '{0}' not found")]
    VariableNotFound(String, Pos),

    #[error("Variable '{0}' could not be deserialized: {2}")]
    MalformedVariable(String, Pos, serde_json::Error),

    #[error("Fragment definition '{0}' not found")]
    FragmentDefinitionNotFound(String, Pos),

    #[error("Fragment '{0}' spreads itself")]
    FragmentCycle(String, Pos),

    #[error("Fragment on '{0}' cannot be spread within type '{1}'")]
    FragmentTypeMismatch(String, String, Pos),

    #[error("The schema does not define a {0} root type")]
    OperationNotFound(String, Pos),

    #[error("Field '{0}' is not valid for type '{1}'")]
    InvalidField(String, String, Pos),

    #[error("Field '{0}' is of a scalar type, which should not specify fields")]
    ScalarWithField(String, Pos),

    #[error("Field '{0}' of type '{1}' must have a selection of subfields")]
    MissingSubfields(String, String, Pos),

    #[error("Field type '{0}' is not valid")]
    InvalidFieldType(String, Pos),

    #[error("Fields with the output name '{0}' select different fields or arguments")]
    ConflictingFields(String, Pos),

    #[error("Required argument '{0}' not found")]
    RequiredArgumentNotFound(String, Pos),

    #[error("Argument(s) '{0:?}' invalid for '{1}'")]
    StrayArguments(Vec<String>, String, Pos),

    #[error(
        "Argument '{argument_name}' is not of a valid type. Expected '{expected_type}', got '{actual_type}'"
    )]
    InvalidArgumentType {
        argument_name: String,
        expected_type: String,
        actual_type: String,
        pos: Pos,
    },

    #[error("Argument '{0}' could not be converted: {2}")]
    MalformedArgument(String, Pos, serde_json::Error),

    #[error("Selection set too deep")]
    SelectionSetTooDeep(Pos),

    #[error("Subscription operations must select exactly one root field, found {0}")]
    SubscriptionRootCount(usize, Pos),

    #[error("No operation found")]
    NoOperationFound,

    #[error("Must provide operation name if query contains multiple operations")]
    MultipleOperationsNoOperationName,

    #[error("operationName '{0}' doesn't match any operation")]
    MultipleOperationsUnmatchedOperationName(String),
}

impl ValidationError {
    pub fn position1(&self) -> Pos {
        match self {
            ValidationError::QueryParsingFailed(_, pos, _) => *pos,
            ValidationError::VariableNotFound(_, pos) => *pos,
            ValidationError::MalformedVariable(_, pos, _) => *pos,
            ValidationError::FragmentDefinitionNotFound(_, pos) => *pos,
            ValidationError::FragmentCycle(_, pos) => *pos,
            ValidationError::FragmentTypeMismatch(_, _, pos) => *pos,
            ValidationError::OperationNotFound(_, pos) => *pos,
            ValidationError::InvalidField(_, _, pos) => *pos,
            ValidationError::ScalarWithField(_, pos) => *pos,
            ValidationError::MissingSubfields(_, _, pos) => *pos,
            ValidationError::InvalidFieldType(_, pos) => *pos,
            ValidationError::ConflictingFields(_, pos) => *pos,
            ValidationError::RequiredArgumentNotFound(_, pos) => *pos,
            ValidationError::StrayArguments(_, _, pos) => *pos,
            ValidationError::InvalidArgumentType { pos, .. } => *pos,
            ValidationError::MalformedArgument(_, pos, _) => *pos,
            ValidationError::SelectionSetTooDeep(pos) => *pos,
            ValidationError::SubscriptionRootCount(_, pos) => *pos,
            ValidationError::NoOperationFound => Pos::default(),
            ValidationError::MultipleOperationsNoOperationName => Pos::default(),
            ValidationError::MultipleOperationsUnmatchedOperationName(_) => Pos::default(),
        }
    }

    pub fn position2(&self) -> Option<Pos> {
        match self {
            ValidationError::QueryParsingFailed(_, _, pos) => *pos,
            _ => None,
        }
    }
}
