// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The resolver dispatch table: which resolver produces each `(type, field)` pair.
//!
//! Resolvers are registered on a [`DispatchTableBuilder`], which is sealed against the schema
//! into an immutable [`DispatchTable`] before the engine accepts any operation. Sealing verifies
//! that every field reachable from a root operation type has a resolver of the right kind, so a
//! missing resolver is a startup error and never a per-query one.

use std::{collections::HashMap, fmt, sync::Arc};

use core_model::Schema;
use thiserror::Error;
use tracing::debug;

use crate::resolver::{FieldResolver, PropertyResolver, SubscriptionResolver};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolverKey {
    pub type_name: String,
    pub field_name: String,
}

impl ResolverKey {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for ResolverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("A resolver for '{0}' is already registered")]
    DuplicateResolver(ResolverKey),

    #[error("No resolver registered for '{0}'")]
    UnresolvedField(ResolverKey),

    #[error("A resolver is registered for '{0}', which is not a field of the schema")]
    UnknownField(ResolverKey),

    #[error("'{key}' requires a {expected} resolver")]
    WrongResolverKind {
        key: ResolverKey,
        expected: &'static str,
    },
}

#[derive(Clone)]
pub(crate) enum RegisteredResolver {
    Field(Arc<dyn FieldResolver>),
    Subscription(Arc<dyn SubscriptionResolver>),
}

#[derive(Default)]
pub struct DispatchTableBuilder {
    resolvers: HashMap<ResolverKey, RegisteredResolver>,
}

impl DispatchTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        key: ResolverKey,
        resolver: RegisteredResolver,
    ) -> Result<&mut Self, DispatchError> {
        if self.resolvers.contains_key(&key) {
            return Err(DispatchError::DuplicateResolver(key));
        }
        self.resolvers.insert(key, resolver);
        Ok(self)
    }

    pub fn register(
        &mut self,
        type_name: &str,
        field_name: &str,
        resolver: Arc<dyn FieldResolver>,
    ) -> Result<&mut Self, DispatchError> {
        self.insert(
            ResolverKey::new(type_name, field_name),
            RegisteredResolver::Field(resolver),
        )
    }

    pub fn register_subscription(
        &mut self,
        type_name: &str,
        field_name: &str,
        resolver: Arc<dyn SubscriptionResolver>,
    ) -> Result<&mut Self, DispatchError> {
        self.insert(
            ResolverKey::new(type_name, field_name),
            RegisteredResolver::Subscription(resolver),
        )
    }

    /// Register a [`PropertyResolver`] for each of `field_names`.
    pub fn register_properties(
        &mut self,
        type_name: &str,
        field_names: &[&str],
    ) -> Result<&mut Self, DispatchError> {
        let property: Arc<dyn FieldResolver> = Arc::new(PropertyResolver);
        for field_name in field_names {
            self.register(type_name, field_name, property.clone())?;
        }
        Ok(self)
    }

    /// Check the registrations against `schema` and freeze them.
    pub fn seal(self, schema: &Schema) -> Result<DispatchTable, DispatchError> {
        let mut registered = self.resolvers.keys().collect::<Vec<_>>();
        registered.sort();

        if let Some(unknown) = registered
            .into_iter()
            .find(|key| schema.get_field(&key.type_name, &key.field_name).is_none())
        {
            return Err(DispatchError::UnknownField(unknown.clone()));
        }

        for (typ, field) in schema.reachable_fields() {
            let key = ResolverKey::new(&typ.name, &field.name);
            let is_subscription_root = schema.is_subscription_root(&typ.name);

            match (self.resolvers.get(&key), is_subscription_root) {
                (None, _) => return Err(DispatchError::UnresolvedField(key)),
                (Some(RegisteredResolver::Field(_)), true) => {
                    return Err(DispatchError::WrongResolverKind {
                        key,
                        expected: "subscription",
                    });
                }
                (Some(RegisteredResolver::Subscription(_)), false) => {
                    return Err(DispatchError::WrongResolverKind {
                        key,
                        expected: "field",
                    });
                }
                _ => {}
            }
        }

        let mut resolvers: HashMap<String, HashMap<String, RegisteredResolver>> = HashMap::new();
        for (key, resolver) in self.resolvers {
            resolvers
                .entry(key.type_name)
                .or_default()
                .insert(key.field_name, resolver);
        }

        debug!(types = resolvers.len(), "Sealed dispatch table");

        Ok(DispatchTable { resolvers })
    }
}

/// The sealed `(type, field) -> resolver` mapping. Immutable, so shared freely across operations.
#[derive(Clone)]
pub struct DispatchTable {
    resolvers: HashMap<String, HashMap<String, RegisteredResolver>>,
}

impl DispatchTable {
    fn lookup(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<&RegisteredResolver, DispatchError> {
        self.resolvers
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
            .ok_or_else(|| DispatchError::UnresolvedField(ResolverKey::new(type_name, field_name)))
    }

    pub fn resolver_for(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<&Arc<dyn FieldResolver>, DispatchError> {
        match self.lookup(type_name, field_name)? {
            RegisteredResolver::Field(resolver) => Ok(resolver),
            RegisteredResolver::Subscription(_) => Err(DispatchError::WrongResolverKind {
                key: ResolverKey::new(type_name, field_name),
                expected: "field",
            }),
        }
    }

    pub fn subscription_resolver_for(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<&Arc<dyn SubscriptionResolver>, DispatchError> {
        match self.lookup(type_name, field_name)? {
            RegisteredResolver::Subscription(resolver) => Ok(resolver),
            RegisteredResolver::Field(_) => Err(DispatchError::WrongResolverKind {
                key: ResolverKey::new(type_name, field_name),
                expected: "subscription",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use core_model::{FieldDefinition, FieldType, SchemaBuilder};

    use super::*;
    use crate::{error::FieldError, resolver::ResolveParams, resolver::SubscriptionSpec};

    struct Ticks;

    #[async_trait]
    impl SubscriptionResolver for Ticks {
        async fn subscribe(&self, _params: ResolveParams) -> Result<SubscriptionSpec, FieldError> {
            Ok(SubscriptionSpec::new("ticks"))
        }
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .object(
                "Query",
                [FieldDefinition::new("me", FieldType::named("User"))],
            )
            .object(
                "User",
                [
                    FieldDefinition::new("name", FieldType::named("String")),
                    FieldDefinition::new("friends", FieldType::named("User").list()),
                ],
            )
            .object(
                "Subscription",
                [FieldDefinition::new("tick", FieldType::named("Int"))],
            )
            .build()
            .unwrap()
    }

    fn complete_builder() -> DispatchTableBuilder {
        let mut builder = DispatchTableBuilder::new();
        builder
            .register_properties("Query", &["me"])
            .unwrap()
            .register_properties("User", &["name", "friends"])
            .unwrap()
            .register_subscription("Subscription", "tick", Arc::new(Ticks))
            .unwrap();
        builder
    }

    #[test]
    fn seals_a_complete_table() {
        let table = complete_builder().seal(&schema()).unwrap();

        assert!(table.resolver_for("User", "friends").is_ok());
        assert!(table.subscription_resolver_for("Subscription", "tick").is_ok());
        assert_eq!(
            table.resolver_for("User", "age").err(),
            Some(DispatchError::UnresolvedField(ResolverKey::new("User", "age")))
        );
        assert!(matches!(
            table.resolver_for("Subscription", "tick"),
            Err(DispatchError::WrongResolverKind { .. })
        ));
    }

    #[test]
    fn rejects_duplicates() {
        let mut builder = complete_builder();

        assert_eq!(
            builder.register_properties("User", &["name"]).err(),
            Some(DispatchError::DuplicateResolver(ResolverKey::new(
                "User", "name"
            )))
        );
    }

    #[test]
    fn missing_resolver_is_a_startup_error() {
        let mut builder = DispatchTableBuilder::new();
        builder
            .register_properties("Query", &["me"])
            .unwrap()
            .register_properties("User", &["name"])
            .unwrap()
            .register_subscription("Subscription", "tick", Arc::new(Ticks))
            .unwrap();

        assert_eq!(
            builder.seal(&schema()).err(),
            Some(DispatchError::UnresolvedField(ResolverKey::new(
                "User", "friends"
            )))
        );
    }

    #[test]
    fn rejects_unknown_fields_and_wrong_kinds() {
        let mut builder = complete_builder();
        builder.register_properties("User", &["age"]).unwrap();
        assert_eq!(
            builder.seal(&schema()).err(),
            Some(DispatchError::UnknownField(ResolverKey::new("User", "age")))
        );

        let mut builder = DispatchTableBuilder::new();
        builder
            .register_properties("Query", &["me"])
            .unwrap()
            .register_properties("User", &["name", "friends"])
            .unwrap()
            .register_properties("Subscription", &["tick"])
            .unwrap();
        assert!(matches!(
            builder.seal(&schema()),
            Err(DispatchError::WrongResolverKind {
                expected: "subscription",
                ..
            })
        ));
    }
}
