// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{access::AccessExpression, primitive_type::ScalarKind};

/// A reference to a type, possibly wrapped in list and non-null modifiers.
///
/// The innermost type is referred to by name and looked up in the schema's arena, so references
/// never form ownership cycles.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Named(String),
    List(Box<FieldType>),
    NonNull(Box<FieldType>),
}

impl FieldType {
    pub fn named(type_name: impl Into<String>) -> Self {
        FieldType::Named(type_name.into())
    }

    pub fn list_of(underlying: FieldType) -> Self {
        FieldType::List(Box::new(underlying))
    }

    pub fn non_null(self) -> Self {
        match self {
            FieldType::NonNull(_) => self,
            _ => FieldType::NonNull(Box::new(self)),
        }
    }

    pub fn list(self) -> Self {
        FieldType::list_of(self)
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }

    /// The type with the outermost non-null modifier removed.
    pub fn nullable(&self) -> &FieldType {
        match self {
            FieldType::NonNull(underlying) => underlying,
            _ => self,
        }
    }

    pub fn innermost_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name,
            FieldType::List(underlying) | FieldType::NonNull(underlying) => {
                underlying.innermost_name()
            }
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(name) => write!(f, "{name}"),
            FieldType::List(underlying) => write!(f, "[{underlying}]"),
            FieldType::NonNull(underlying) => write!(f, "{underlying}!"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchemaType {
    pub name: String,
    pub kind: TypeKind,
}

impl SchemaType {
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDefinition>> {
        match &self.kind {
            TypeKind::Object(object) => Some(&object.fields),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, TypeKind::Object(_))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum TypeKind {
    Scalar(ScalarKind),
    Enum(Vec<String>),
    Object(ObjectType),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ObjectType {
    pub fields: IndexMap<String, FieldDefinition>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub arguments: IndexMap<String, ArgumentDefinition>,
    pub typ: FieldType,
    /// Evaluated against the caller's identity before the field's resolver is invoked
    pub access: AccessExpression,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
            typ,
            access: AccessExpression::BooleanLiteral(true),
        }
    }

    pub fn argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    pub fn access(mut self, access: AccessExpression) -> Self {
        self.access = access;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ArgumentDefinition {
    pub name: String,
    pub typ: FieldType,
    pub default_value: Option<Value>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
            default_value: None,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}
