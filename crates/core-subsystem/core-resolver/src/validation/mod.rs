// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowering of parsed documents into the validated form the engine executes.
//!
//! Take a user submitted query along with the operation name and variables (from the request
//! payload) and transform the query into a validated form (in the process, validate the query).

use async_graphql_parser::{Pos, types::ExecutableDocument};
use tracing::{error, instrument};

pub mod document_validator;
pub mod field;
pub mod operation;
pub mod validation_error;

mod arguments_validator;
mod operation_validator;
mod selection_set_validator;

use validation_error::ValidationError;

#[instrument(name = "validation::parse_query", skip_all)]
pub fn parse_query(query: &str) -> Result<ExecutableDocument, ValidationError> {
    async_graphql_parser::parse_query(query).map_err(|error| {
        error!(%error, "Failed to parse query");
        let (message, pos1, pos2) = match error {
            async_graphql_parser::Error::Syntax {
                message,
                start,
                end,
            } => {
                // Error::Syntax's message is formatted with newlines, escape them properly
                let message = message.escape_debug();
                (format!("Syntax error:\\n{message}"), start, end)
            }
            async_graphql_parser::Error::MultipleOperations {
                anonymous,
                operation,
            } => ("Multiple operations".to_string(), anonymous, Some(operation)),
            async_graphql_parser::Error::OperationDuplicated {
                operation: _,
                first,
                second,
            } => ("Operation duplicated".to_string(), first, Some(second)),
            async_graphql_parser::Error::FragmentDuplicated {
                fragment,
                first,
                second,
            } => (
                format!("Fragment {fragment} duplicated"),
                first,
                Some(second),
            ),
            async_graphql_parser::Error::MissingOperation => {
                ("Missing operation".to_string(), Pos::default(), None)
            }
            _ => ("Unknown error".to_string(), Pos::default(), None),
        };

        ValidationError::QueryParsingFailed(message, pos1, pos2)
    })
}
