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
    Pos, Positioned,
    types::{
        Directive, Field, FragmentDefinition, FragmentSpread, Selection, SelectionSet,
        TypeCondition,
    },
};
use async_graphql_value::{ConstValue, Name, Value};
use core_model::{Schema, SchemaType};
use indexmap::IndexMap;

use crate::{
    execution::executor::TYPENAME_FIELD, validation::validation_error::ValidationError,
};

use super::{arguments_validator::ArgumentValidator, field::ValidatedField};

/// Context for validating a selection set.
pub struct SelectionSetValidator<'a> {
    schema: &'a Schema,
    /// The parent type of this field.
    container_type: &'a SchemaType,
    variables: &'a HashMap<Name, ConstValue>,
    fragment_definitions: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    max_depth: usize,
}

impl<'a> SelectionSetValidator<'a> {
    #[must_use]
    pub fn new(
        schema: &'a Schema,
        container_type: &'a SchemaType,
        variables: &'a HashMap<Name, ConstValue>,
        fragment_definitions: &'a HashMap<Name, Positioned<FragmentDefinition>>,
        max_depth: usize,
    ) -> Self {
        Self {
            schema,
            container_type,
            variables,
            fragment_definitions,
            max_depth,
        }
    }

    /// Validate selection set.
    ///
    /// Validations performed:
    /// - Each field is defined in the `container_type`
    /// - Each fragment referred is defined, applies to the `container_type` and does not spread
    ///   itself (directly or through other fragments)
    /// - Arguments to each field are valid (see [ArgumentValidator] for more details)
    /// - No field lies deeper than `max_depth` (`depth` is that of this set's fields)
    /// - Fields sharing an output name select the same field with the same arguments
    ///
    /// `@skip` and `@include` are evaluated here, so excluded selections never reach the engine.
    ///
    /// # Returns
    ///   A vector of validated fields (fragments are inlined and fields sharing an output name
    ///   merged, thus normalizing the fields)
    pub(super) fn validate(
        &self,
        selection_set: &Positioned<SelectionSet>,
        depth: usize,
        fragment_path: &mut Vec<Name>,
    ) -> Result<Vec<ValidatedField>, ValidationError> {
        let mut fields = vec![];
        self.collect_fields(selection_set, depth, fragment_path, &mut fields)?;
        Ok(fields)
    }

    fn collect_fields(
        &self,
        selection_set: &Positioned<SelectionSet>,
        depth: usize,
        fragment_path: &mut Vec<Name>,
        fields: &mut Vec<ValidatedField>,
    ) -> Result<(), ValidationError> {
        for selection in &selection_set.node.items {
            match &selection.node {
                Selection::Field(field) => {
                    if !self.is_included(&field.node.directives)? {
                        continue;
                    }
                    let validated = self.validate_field(field, depth, fragment_path)?;
                    merge_field(fields, validated, field.pos)?;
                }
                Selection::FragmentSpread(fragment_spread) => {
                    if !self.is_included(&fragment_spread.node.directives)? {
                        continue;
                    }
                    let fragment_name = &fragment_spread.node.fragment_name.node;
                    if fragment_path.contains(fragment_name) {
                        return Err(ValidationError::FragmentCycle(
                            fragment_name.to_string(),
                            fragment_spread.pos,
                        ));
                    }

                    let fragment_definition = self.fragment_definition(fragment_spread)?;
                    self.check_type_condition(
                        Some(&fragment_definition.type_condition),
                        fragment_spread.pos,
                    )?;

                    fragment_path.push(fragment_name.clone());
                    let result = self.collect_fields(
                        &fragment_definition.selection_set,
                        depth,
                        fragment_path,
                        fields,
                    );
                    fragment_path.pop();
                    result?;
                }
                Selection::InlineFragment(inline_fragment) => {
                    if !self.is_included(&inline_fragment.node.directives)? {
                        continue;
                    }
                    self.check_type_condition(
                        inline_fragment.node.type_condition.as_ref(),
                        inline_fragment.pos,
                    )?;
                    self.collect_fields(
                        &inline_fragment.node.selection_set,
                        depth,
                        fragment_path,
                        fields,
                    )?;
                }
            }
        }

        Ok(())
    }

    fn validate_field(
        &self,
        field: &Positioned<Field>,
        depth: usize,
        fragment_path: &mut Vec<Name>,
    ) -> Result<ValidatedField, ValidationError> {
        let field_name = field.node.name.node.as_str();
        let alias = field.node.alias.as_ref().map(|alias| alias.node.clone());

        if depth > self.max_depth {
            return Err(ValidationError::SelectionSetTooDeep(field.pos));
        }

        // __typename is answered by the engine for every object type, so the schema doesn't
        // declare it
        if field_name == TYPENAME_FIELD {
            return if !field.node.arguments.is_empty() {
                Err(ValidationError::StrayArguments(
                    field
                        .node
                        .arguments
                        .iter()
                        .map(|(name, _)| name.node.to_string())
                        .collect(),
                    field_name.to_string(),
                    field.pos,
                ))
            } else if !field.node.selection_set.node.items.is_empty() {
                Err(ValidationError::ScalarWithField(
                    field_name.to_string(),
                    field.pos,
                ))
            } else {
                Ok(ValidatedField {
                    alias,
                    name: field.node.name.node.clone(),
                    arguments: IndexMap::new(),
                    subfields: vec![],
                })
            };
        }

        let field_definition = self
            .container_type
            .fields()
            .and_then(|fields| fields.get(field_name))
            .ok_or_else(|| {
                ValidationError::InvalidField(
                    field_name.to_string(),
                    self.container_type.name.clone(),
                    field.pos,
                )
            })?;

        let field_type_name = field_definition.typ.innermost_name();
        let field_type = self.schema.get_type(field_type_name).ok_or_else(|| {
            ValidationError::InvalidFieldType(field_type_name.to_string(), field.pos)
        })?;

        let has_selection = !field.node.selection_set.node.items.is_empty();

        let subfields = match (field_type.is_leaf(), has_selection) {
            (true, true) => {
                return Err(ValidationError::ScalarWithField(
                    field_name.to_string(),
                    field.pos,
                ));
            }
            (true, false) => vec![],
            (false, false) => {
                return Err(ValidationError::MissingSubfields(
                    field_name.to_string(),
                    field_definition.typ.to_string(),
                    field.pos,
                ));
            }
            (false, true) => {
                let subfield_validator = Self::new(
                    self.schema,
                    field_type,
                    self.variables,
                    self.fragment_definitions,
                    self.max_depth,
                );
                subfield_validator.validate(&field.node.selection_set, depth + 1, fragment_path)?
            }
        };

        let arguments = ArgumentValidator::new(self.schema, self.variables, field)
            .validate(&field_definition.arguments)?;

        Ok(ValidatedField {
            alias,
            name: field.node.name.node.clone(),
            arguments,
            subfields,
        })
    }

    fn fragment_definition(
        &self,
        fragment: &Positioned<FragmentSpread>,
    ) -> Result<&'a FragmentDefinition, ValidationError> {
        self.fragment_definitions
            .get(&fragment.node.fragment_name.node)
            .map(|v| &v.node)
            .ok_or_else(|| {
                ValidationError::FragmentDefinitionNotFound(
                    fragment.node.fragment_name.node.to_string(),
                    fragment.pos,
                )
            })
    }

    /// Without abstract types, a fragment applies only to the exact type it names.
    fn check_type_condition(
        &self,
        type_condition: Option<&Positioned<TypeCondition>>,
        pos: Pos,
    ) -> Result<(), ValidationError> {
        match type_condition {
            Some(condition) if condition.node.on.node.as_str() != self.container_type.name => {
                Err(ValidationError::FragmentTypeMismatch(
                    condition.node.on.node.to_string(),
                    self.container_type.name.clone(),
                    pos,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate `@skip(if:)` and `@include(if:)`. Other directives are ignored.
    fn is_included(&self, directives: &[Positioned<Directive>]) -> Result<bool, ValidationError> {
        for directive in directives {
            let exclude_when = match directive.node.name.node.as_str() {
                "skip" => true,
                "include" => false,
                _ => continue,
            };

            if self.directive_condition(directive)? == exclude_when {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn directive_condition(
        &self,
        directive: &Positioned<Directive>,
    ) -> Result<bool, ValidationError> {
        let condition = directive
            .node
            .get_argument("if")
            .ok_or_else(|| {
                ValidationError::RequiredArgumentNotFound("if".to_string(), directive.pos)
            })?;

        let resolved = match &condition.node {
            Value::Variable(name) => self.variables.get(name).cloned().ok_or_else(|| {
                ValidationError::VariableNotFound(name.to_string(), condition.pos)
            })?,
            value => value.clone().into_const().unwrap_or(ConstValue::Null),
        };

        match resolved {
            ConstValue::Boolean(condition) => Ok(condition),
            other => Err(ValidationError::InvalidArgumentType {
                argument_name: "if".to_string(),
                expected_type: "Boolean!".to_string(),
                actual_type: other.to_string(),
                pos: condition.pos,
            }),
        }
    }
}

/// Add `field` to `fields`, merging it with an earlier field of the same output name.
fn merge_field(
    fields: &mut Vec<ValidatedField>,
    field: ValidatedField,
    pos: Pos,
) -> Result<(), ValidationError> {
    let output_name = field.output_name();

    match fields
        .iter_mut()
        .find(|existing| existing.output_name() == output_name)
    {
        None => fields.push(field),
        Some(existing) => {
            if existing.name != field.name || existing.arguments != field.arguments {
                return Err(ValidationError::ConflictingFields(output_name, pos));
            }
            for subfield in field.subfields {
                merge_field(&mut existing.subfields, subfield, pos)?;
            }
        }
    }

    Ok(())
}
