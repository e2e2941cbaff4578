// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_value::Name;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedField {
    pub alias: Option<Name>,
    /// The name of the field.
    pub name: Name,
    /// The arguments to the field after variable substitution. Omitted arguments are absent (the
    /// engine fills in declared defaults).
    pub arguments: IndexMap<String, Value>,

    /// The subfields being selected in this field, if it is an object. Empty if no fields are
    /// being selected.
    pub subfields: Vec<ValidatedField>,
}

impl ValidatedField {
    pub fn new(name: &str) -> Self {
        Self {
            alias: None,
            name: Name::new(name),
            arguments: IndexMap::new(),
            subfields: vec![],
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(Name::new(alias));
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn subfield(mut self, subfield: ValidatedField) -> Self {
        self.subfields.push(subfield);
        self
    }

    pub fn output_name(&self) -> String {
        self.alias.as_ref().unwrap_or(&self.name).to_string()
    }

    /// Depth of the deepest selection below (and including) this field.
    pub fn depth(&self) -> usize {
        1 + self
            .subfields
            .iter()
            .map(ValidatedField::depth)
            .max()
            .unwrap_or(0)
    }
}
