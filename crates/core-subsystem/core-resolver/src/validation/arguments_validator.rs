// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use async_graphql_parser::{Pos, Positioned, types::Field};
use async_graphql_value::{ConstValue, Name, Value};
use core_model::{ArgumentDefinition, FieldType, ScalarKind, Schema, TypeKind};
use indexmap::IndexMap;

use crate::validation::validation_error::ValidationError;

pub struct ArgumentValidator<'a> {
    schema: &'a Schema,
    variables: &'a HashMap<Name, ConstValue>,
    field: &'a Positioned<Field>,
}

impl<'a> ArgumentValidator<'a> {
    #[must_use]
    pub fn new(
        schema: &'a Schema,
        variables: &'a HashMap<Name, ConstValue>,
        field: &'a Positioned<Field>,
    ) -> Self {
        Self {
            schema,
            variables,
            field,
        }
    }

    /// Validations performed:
    /// - Ensure that all required arguments (non-null and without a default) are provided
    /// - Ensure that there are no stray arguments (arguments that are not defined in the field)
    /// - Ensure that each value (after variable substitution) fits the argument's type
    pub(super) fn validate(
        &self,
        argument_definitions: &IndexMap<String, ArgumentDefinition>,
    ) -> Result<IndexMap<String, serde_json::Value>, ValidationError> {
        let field_name = self.field.node.name.node.as_str();

        // Stray arguments tracking: 1. Maintain a map of all the arguments supplied in the query
        let mut supplied: IndexMap<&str, &Positioned<Value>> = self
            .field
            .node
            .arguments
            .iter()
            .map(|(name, value)| (name.node.as_str(), value))
            .collect();

        let mut validated = IndexMap::new();

        for (argument_name, argument_definition) in argument_definitions {
            // Stray arguments tracking: 2. Remove the argument being processed
            match supplied.shift_remove(argument_name.as_str()) {
                Some(value) => {
                    let pos = value.pos;
                    let value = self.resolve_variables(value)?;
                    self.validate_value(argument_name, &argument_definition.typ, &value, pos)?;

                    let value = value.into_json().map_err(|e| {
                        ValidationError::MalformedArgument(argument_name.clone(), pos, e)
                    })?;
                    validated.insert(argument_name.clone(), value);
                }
                None => {
                    if argument_definition.typ.is_non_null()
                        && argument_definition.default_value.is_none()
                    {
                        return Err(ValidationError::RequiredArgumentNotFound(
                            argument_name.clone(),
                            self.field.pos,
                        ));
                    }
                }
            }
        }

        // Stray arguments tracking: 3. Anything left over is not defined for the field
        if !supplied.is_empty() {
            return Err(ValidationError::StrayArguments(
                supplied.keys().map(|name| name.to_string()).collect(),
                field_name.to_string(),
                self.field.pos,
            ));
        }

        Ok(validated)
    }

    fn resolve_variables(&self, value: &Positioned<Value>) -> Result<ConstValue, ValidationError> {
        value.node.clone().into_const_with(|name| {
            self.variables
                .get(&name)
                .cloned()
                .ok_or_else(|| ValidationError::VariableNotFound(name.to_string(), value.pos))
        })
    }

    /// Check a (resolved) value against `typ`. Lists accept a single item, as GraphQL input
    /// coercion allows.
    fn validate_value(
        &self,
        argument_name: &str,
        typ: &FieldType,
        value: &ConstValue,
        pos: Pos,
    ) -> Result<(), ValidationError> {
        if let ConstValue::Null = value {
            return if typ.is_non_null() {
                Err(ValidationError::RequiredArgumentNotFound(
                    argument_name.to_string(),
                    pos,
                ))
            } else {
                Ok(())
            };
        }

        match (typ.nullable(), value) {
            (FieldType::List(item_type), ConstValue::List(items)) => items
                .iter()
                .try_for_each(|item| self.validate_value(argument_name, item_type, item, pos)),
            (FieldType::List(item_type), _) => {
                self.validate_value(argument_name, item_type, value, pos)
            }
            _ => self.validate_named_value(argument_name, typ, value, pos),
        }
    }

    fn validate_named_value(
        &self,
        argument_name: &str,
        typ: &FieldType,
        value: &ConstValue,
        pos: Pos,
    ) -> Result<(), ValidationError> {
        let type_name = typ.innermost_name();

        let acceptable = match self.schema.get_type(type_name).map(|t| &t.kind) {
            Some(TypeKind::Scalar(ScalarKind::Int)) => matches!(
                value,
                ConstValue::Number(n) if n.as_i64().is_some_and(|n| i32::try_from(n).is_ok())
            ),
            Some(TypeKind::Scalar(ScalarKind::Float)) => matches!(value, ConstValue::Number(_)),
            Some(TypeKind::Scalar(ScalarKind::String)) => matches!(value, ConstValue::String(_)),
            Some(TypeKind::Scalar(ScalarKind::Boolean)) => matches!(value, ConstValue::Boolean(_)),
            Some(TypeKind::Scalar(ScalarKind::Id)) => matches!(
                value,
                ConstValue::String(_) | ConstValue::Number(_)
            ),
            Some(TypeKind::Scalar(ScalarKind::Custom)) => true,
            // Enum values arrive as enum literals in the document and as strings in variables
            Some(TypeKind::Enum(values)) => match value {
                ConstValue::Enum(name) => values.iter().any(|v| v == name.as_str()),
                ConstValue::String(name) => values.contains(name),
                _ => false,
            },
            Some(TypeKind::Object(_)) | None => false,
        };

        if acceptable {
            Ok(())
        } else {
            Err(ValidationError::InvalidArgumentType {
                argument_name: argument_name.to_string(),
                expected_type: typ.to_string(),
                actual_type: value_kind(value).to_string(),
                pos,
            })
        }
    }
}

fn value_kind(value: &ConstValue) -> &'static str {
    match value {
        ConstValue::Null => "Null",
        ConstValue::Number(_) => "Number",
        ConstValue::String(_) => "String",
        ConstValue::Boolean(_) => "Boolean",
        ConstValue::Binary(_) => "Binary",
        ConstValue::Enum(_) => "Enum",
        ConstValue::List(_) => "List",
        ConstValue::Object(_) => "Object",
    }
}
