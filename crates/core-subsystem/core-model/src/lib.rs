// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The schema registry: the declared type graph (object types, their fields and arguments, enums
//! and scalars) along with the access rules attached to each field.

pub mod access;
pub mod error;
pub mod mapped_arena;
pub mod primitive_type;
pub mod schema;
pub mod types;

pub use access::AccessExpression;
pub use error::SchemaError;
pub use primitive_type::ScalarKind;
pub use schema::{Schema, SchemaBuilder};
pub use types::{ArgumentDefinition, FieldDefinition, FieldType, ObjectType, SchemaType, TypeKind};
