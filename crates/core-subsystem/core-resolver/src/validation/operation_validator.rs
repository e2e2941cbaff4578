// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use async_graphql_parser::{
    Positioned,
    types::{FragmentDefinition, OperationDefinition, OperationType, VariableDefinition},
};
use async_graphql_value::{ConstValue, Name};
use core_model::Schema;
use serde_json::{Map, Value};

use crate::validation::validation_error::ValidationError;

use super::{operation::ValidatedOperation, selection_set_validator::SelectionSetValidator};

/// Context for validating an operation.
pub struct OperationValidator<'a> {
    schema: &'a Schema,
    operation_name: Option<String>,
    variables: Option<Map<String, Value>>,
    fragment_definitions: HashMap<Name, Positioned<FragmentDefinition>>,
    max_depth: usize,
}

impl<'a> OperationValidator<'a> {
    #[must_use]
    pub fn new(
        schema: &'a Schema,
        operation_name: Option<String>,
        variables: Option<Map<String, Value>>,
        fragment_definitions: HashMap<Name, Positioned<FragmentDefinition>>,
        max_depth: usize,
    ) -> Self {
        Self {
            schema,
            operation_name,
            variables,
            fragment_definitions,
            max_depth,
        }
    }

    /// Validate operation. Operation defines a GraphQL top-level operation such
    /// as
    /// ```graphql
    ///    mutation create($title: String!) {
    ///       createPost(title: $title) {
    ///          id
    ///       }
    ///    }
    /// ```
    ///
    /// Validations performed:
    /// - The schema has a root type for the operation's kind
    /// - Each variable in [OperationDefinition.variable_definitions] is
    ///   available (see [`validate_variables`] for details)
    /// - The selected fields are valid (see [SelectionSetValidator] for details)
    /// - A subscription selects exactly one root field
    ///
    /// # Returns
    ///   A validated operation with all variables and fields resolved and normalized.
    pub(super) fn validate(
        self,
        operation: Positioned<OperationDefinition>,
    ) -> Result<ValidatedOperation, ValidationError> {
        let (operation_kind, root_type_name) = match operation.node.ty {
            OperationType::Query => ("query", Some(self.schema.query_type())),
            OperationType::Mutation => ("mutation", self.schema.mutation_type()),
            OperationType::Subscription => ("subscription", self.schema.subscription_type()),
        };

        let container_type = root_type_name
            .and_then(|name| self.schema.get_type(name))
            .ok_or_else(|| {
                ValidationError::OperationNotFound(operation_kind.to_string(), operation.pos)
            })?;

        let variables = self.validate_variables(operation.node.variable_definitions)?;
        let selection_set_validator = SelectionSetValidator::new(
            self.schema,
            container_type,
            &variables,
            &self.fragment_definitions,
            self.max_depth,
        );

        let fields =
            selection_set_validator.validate(&operation.node.selection_set, 1, &mut vec![])?;

        if operation.node.ty == OperationType::Subscription && fields.len() != 1 {
            return Err(ValidationError::SubscriptionRootCount(
                fields.len(),
                operation.pos,
            ));
        }

        Ok(ValidatedOperation {
            name: self.operation_name,
            typ: operation.node.ty,
            fields,
        })
    }

    /// Validate variables.
    ///
    /// Validations performed:
    /// - Every declared variable is supplied, has a default, or is nullable (and so
    ///   resolves to null)
    ///
    /// Variable types are checked where the variables are used as arguments.
    ///
    /// # Returns
    ///   Resolved variables (note the output type uses `ConstValue` instead of
    ///   `Value` to indicate that the value has been resolved)
    fn validate_variables(
        &'a self,
        variable_definitions: Vec<Positioned<VariableDefinition>>,
    ) -> Result<HashMap<Name, ConstValue>, ValidationError> {
        variable_definitions
            .into_iter()
            .map(|variable_definition| {
                let VariableDefinition {
                    name,
                    var_type,
                    default_value,
                    ..
                } = variable_definition.node;

                let value = match self.supplied_value(&name)? {
                    Some(value) => value,
                    None => match default_value {
                        Some(default_value) => default_value.node,
                        None if var_type.node.nullable => ConstValue::Null,
                        None => {
                            return Err(ValidationError::VariableNotFound(
                                name.node.to_string(),
                                name.pos,
                            ));
                        }
                    },
                };

                Ok((name.node, value))
            })
            .collect()
    }

    fn supplied_value(
        &self,
        name: &Positioned<Name>,
    ) -> Result<Option<ConstValue>, ValidationError> {
        let Some(supplied) = self
            .variables
            .as_ref()
            .and_then(|variables| variables.get(name.node.as_str()))
        else {
            return Ok(None);
        };

        ConstValue::from_json(supplied.to_owned())
            .map(Some)
            .map_err(|e| ValidationError::MalformedVariable(name.node.to_string(), name.pos, e))
    }
}
