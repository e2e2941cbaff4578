// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use core_model::{ScalarKind, SchemaType, TypeKind};
use serde_json::Value;

use crate::error::FieldError;

/// Check (and normalize) a scalar or enum value against its declared type.
pub(crate) fn complete_leaf(typ: &SchemaType, value: Value) -> Result<Value, FieldError> {
    let completed = match &typ.kind {
        TypeKind::Scalar(kind) => complete_scalar(*kind, value),
        TypeKind::Enum(values) => match value.as_str() {
            Some(name) if values.iter().any(|v| v == name) => Ok(value),
            _ => Err(value),
        },
        TypeKind::Object(_) => Err(value),
    };

    completed.map_err(|value| {
        FieldError::InvalidValue(format!(
            "Expected a value of type {}, found {value}",
            typ.name
        ))
    })
}

fn complete_scalar(kind: ScalarKind, value: Value) -> Result<Value, Value> {
    match kind {
        ScalarKind::Int => match value.as_i64() {
            Some(n) if i32::try_from(n).is_ok() => Ok(value),
            _ => Err(value),
        },
        ScalarKind::Float if value.is_number() => Ok(value),
        ScalarKind::String if value.is_string() => Ok(value),
        ScalarKind::Boolean if value.is_boolean() => Ok(value),
        ScalarKind::Id => match &value {
            Value::String(_) => Ok(value),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(value),
        },
        ScalarKind::Custom => Ok(value),
        _ => Err(value),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scalar(name: &str, kind: ScalarKind) -> SchemaType {
        SchemaType {
            name: name.to_string(),
            kind: TypeKind::Scalar(kind),
        }
    }

    #[test]
    fn coerces_ids_and_checks_ranges() {
        let id = scalar("ID", ScalarKind::Id);
        let int = scalar("Int", ScalarKind::Int);

        assert_eq!(complete_leaf(&id, json!(42)).unwrap(), json!("42"));
        assert_eq!(complete_leaf(&id, json!("u-1")).unwrap(), json!("u-1"));
        assert!(complete_leaf(&id, json!(1.5)).is_err());

        assert_eq!(complete_leaf(&int, json!(7)).unwrap(), json!(7));
        assert!(complete_leaf(&int, json!(4_000_000_000_i64)).is_err());
        assert!(complete_leaf(&int, json!("7")).is_err());
    }

    #[test]
    fn checks_enum_values() {
        let status = SchemaType {
            name: "Status".to_string(),
            kind: TypeKind::Enum(vec!["DRAFT".to_string(), "PUBLISHED".to_string()]),
        };

        assert!(complete_leaf(&status, json!("DRAFT")).is_ok());
        assert_eq!(
            complete_leaf(&status, json!("ARCHIVED")).unwrap_err(),
            FieldError::InvalidValue(
                "Expected a value of type Status, found \"ARCHIVED\"".to_string()
            )
        );
    }
}
