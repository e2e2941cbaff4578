// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The schema registry: the declared type graph consulted by the engine.
//!
//! A [`Schema`] is built once through a [`SchemaBuilder`] and is read-only afterwards, so it can be
//! shared (typically behind an `Arc`) by any number of concurrent operations without locking.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::SchemaError,
    mapped_arena::MappedArena,
    primitive_type::ScalarKind,
    types::{FieldDefinition, ObjectType, SchemaType, TypeKind},
};

pub const QUERY_ROOT_TYPENAME: &str = "Query";
pub const MUTATION_ROOT_TYPENAME: &str = "Mutation";
pub const SUBSCRIPTION_ROOT_TYPENAME: &str = "Subscription";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    types: MappedArena<SchemaType>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Schema {
    pub fn get_type(&self, name: &str) -> Option<&SchemaType> {
        self.types.get_by_key(name)
    }

    pub fn get_object(&self, name: &str) -> Option<&ObjectType> {
        match &self.get_type(name)?.kind {
            TypeKind::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn get_field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.get_object(type_name)?.fields.get(field_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &SchemaType> {
        self.types.iter().map(|(_, typ)| typ)
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn subscription_type(&self) -> Option<&str> {
        self.subscription_type.as_deref()
    }

    pub fn is_subscription_root(&self, type_name: &str) -> bool {
        self.subscription_type.as_deref() == Some(type_name)
    }

    /// Every `(object type, field)` pair reachable from a root operation type.
    ///
    /// Each object type is visited once, so cyclic references terminate.
    pub fn reachable_fields(&self) -> Vec<(&SchemaType, &FieldDefinition)> {
        let roots = std::iter::once(self.query_type.as_str())
            .chain(self.mutation_type.as_deref())
            .chain(self.subscription_type.as_deref());

        let mut visited: HashSet<&str> = HashSet::new();
        let mut pending: VecDeque<&str> = roots.collect();
        let mut reachable = vec![];

        while let Some(type_name) = pending.pop_front() {
            if !visited.insert(type_name) {
                continue;
            }
            let Some(typ) = self.get_type(type_name) else {
                continue;
            };
            if let Some(fields) = typ.fields() {
                for field in fields.values() {
                    reachable.push((typ, field));
                    pending.push_back(field.typ.innermost_name());
                }
            }
        }

        reachable
    }
}

/// Collects type declarations (in any order) and validates them into a [`Schema`].
pub struct SchemaBuilder {
    declarations: Vec<SchemaType>,
    errors: Vec<SchemaError>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            declarations: vec![],
            errors: vec![],
            query_type: QUERY_ROOT_TYPENAME.to_string(),
            mutation_type: None,
            subscription_type: None,
        }
    }

    pub fn object(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDefinition>,
    ) -> Self {
        let name = name.into();
        let mut field_map = IndexMap::new();

        for field in fields {
            if field_map.contains_key(&field.name) {
                self.errors.push(SchemaError::DuplicateField {
                    type_name: name.clone(),
                    field_name: field.name.clone(),
                });
            } else {
                field_map.insert(field.name.clone(), field);
            }
        }

        self.declarations.push(SchemaType {
            name,
            kind: TypeKind::Object(ObjectType { fields: field_map }),
        });
        self
    }

    pub fn enumeration(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.declarations.push(SchemaType {
            name: name.into(),
            kind: TypeKind::Enum(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Declare a custom scalar. Values of custom scalars are passed through unchanged.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.declarations.push(SchemaType {
            name: name.into(),
            kind: TypeKind::Scalar(ScalarKind::Custom),
        });
        self
    }

    pub fn query_root(mut self, name: impl Into<String>) -> Self {
        self.query_type = name.into();
        self
    }

    pub fn mutation_root(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn subscription_root(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let SchemaBuilder {
            declarations,
            errors,
            query_type,
            mutation_type,
            subscription_type,
        } = self;

        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }

        let mut types = MappedArena::default();

        for kind in ScalarKind::BUILT_INS {
            if let Some(name) = kind.name() {
                let _ = types.try_add(
                    name,
                    SchemaType {
                        name: name.to_string(),
                        kind: TypeKind::Scalar(kind),
                    },
                );
            }
        }

        for declaration in declarations {
            let name = declaration.name.clone();
            types
                .try_add(&name, declaration)
                .map_err(|_| SchemaError::DuplicateType(name))?;
        }

        // Mutation and subscription roots are picked up by their conventional names unless set
        // explicitly
        let mutation_type = mutation_type.or_else(|| {
            types
                .contains_key(MUTATION_ROOT_TYPENAME)
                .then(|| MUTATION_ROOT_TYPENAME.to_string())
        });
        let subscription_type = subscription_type.or_else(|| {
            types
                .contains_key(SUBSCRIPTION_ROOT_TYPENAME)
                .then(|| SUBSCRIPTION_ROOT_TYPENAME.to_string())
        });

        validate_references(&types)?;

        for root in std::iter::once(&query_type)
            .chain(mutation_type.as_ref())
            .chain(subscription_type.as_ref())
        {
            match types.get_by_key(root) {
                None => return Err(SchemaError::MissingRootType(root.clone())),
                Some(typ) if typ.is_leaf() => {
                    return Err(SchemaError::RootNotObject(root.clone()));
                }
                Some(_) => {}
            }
        }

        Ok(Schema {
            types,
            query_type,
            mutation_type,
            subscription_type,
        })
    }
}

fn validate_references(types: &MappedArena<SchemaType>) -> Result<(), SchemaError> {
    for (_, typ) in types.iter() {
        let Some(fields) = typ.fields() else {
            continue;
        };

        if fields.is_empty() {
            return Err(SchemaError::EmptyObject(typ.name.clone()));
        }

        for field in fields.values() {
            let referenced_by = format!("{}.{}", typ.name, field.name);

            let field_type_name = field.typ.innermost_name();
            if !types.contains_key(field_type_name) {
                return Err(SchemaError::UnknownType {
                    type_name: field_type_name.to_string(),
                    referenced_by,
                });
            }

            for argument in field.arguments.values() {
                let argument_type_name = argument.typ.innermost_name();
                match types.get_by_key(argument_type_name) {
                    None => {
                        return Err(SchemaError::UnknownType {
                            type_name: argument_type_name.to_string(),
                            referenced_by: format!("{referenced_by}({})", argument.name),
                        });
                    }
                    Some(argument_type) if !argument_type.is_leaf() => {
                        return Err(SchemaError::NonInputArgument {
                            field: referenced_by,
                            argument_name: argument.name.clone(),
                            type_name: argument_type_name.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArgumentDefinition, FieldType};

    fn cyclic_builder() -> SchemaBuilder {
        SchemaBuilder::new()
            .object(
                "Query",
                [FieldDefinition::new(
                    "posts",
                    FieldType::named("Post").non_null().list().non_null(),
                )],
            )
            .object(
                "Post",
                [
                    FieldDefinition::new("id", FieldType::named("ID").non_null()),
                    FieldDefinition::new("author", FieldType::named("User").non_null()),
                ],
            )
            .object(
                "User",
                [
                    FieldDefinition::new("name", FieldType::named("String")),
                    FieldDefinition::new("posts", FieldType::named("Post").list()),
                ],
            )
    }

    #[test]
    fn cyclic_types_build_and_are_traversed_once() {
        let schema = cyclic_builder().build().unwrap();

        let reachable = schema
            .reachable_fields()
            .into_iter()
            .map(|(typ, field)| format!("{}.{}", typ.name, field.name))
            .collect::<Vec<_>>();

        assert_eq!(
            reachable,
            vec!["Query.posts", "Post.id", "Post.author", "User.name", "User.posts"]
        );
        assert!(schema.mutation_type().is_none());
        assert!(schema.get_field("Post", "author").unwrap().typ.is_non_null());
    }

    #[test]
    fn detects_conventional_roots() {
        let schema = cyclic_builder()
            .object(
                "Mutation",
                [FieldDefinition::new("noop", FieldType::named("Boolean"))],
            )
            .build()
            .unwrap();

        assert_eq!(schema.mutation_type(), Some("Mutation"));
        assert_eq!(schema.subscription_type(), None);
    }

    #[test]
    fn rejects_unknown_types() {
        let result = SchemaBuilder::new()
            .object("Query", [FieldDefinition::new("me", FieldType::named("User"))])
            .build();

        assert_eq!(
            result.unwrap_err(),
            SchemaError::UnknownType {
                type_name: "User".to_string(),
                referenced_by: "Query.me".to_string(),
            }
        );
    }

    #[test]
    fn rejects_duplicates() {
        let duplicate_type = cyclic_builder().scalar("Post").build();
        assert_eq!(
            duplicate_type.unwrap_err(),
            SchemaError::DuplicateType("Post".to_string())
        );

        let duplicate_field = SchemaBuilder::new()
            .object(
                "Query",
                [
                    FieldDefinition::new("a", FieldType::named("Int")),
                    FieldDefinition::new("a", FieldType::named("String")),
                ],
            )
            .build();
        assert!(matches!(
            duplicate_field,
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn rejects_object_arguments_and_missing_roots() {
        let result = cyclic_builder()
            .object(
                "Mutation",
                [FieldDefinition::new("touch", FieldType::named("Post"))
                    .argument(ArgumentDefinition::new("post", FieldType::named("Post")))],
            )
            .build();
        assert!(matches!(result, Err(SchemaError::NonInputArgument { .. })));

        let result = cyclic_builder().subscription_root("Events").build();
        assert_eq!(
            result.unwrap_err(),
            SchemaError::MissingRootType("Events".to_string())
        );
    }
}
