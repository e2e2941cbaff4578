// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Wave-by-wave field resolution.
//!
//! Every field at one depth of the result tree forms a wave. The executor invokes the resolvers of
//! a whole wave concurrently, then flushes the batch coordinator (repeatedly, if continuations
//! queue further loads) until every value of the wave has settled, and only then completes the
//! values into the response graph. Completing object values yields the tasks of the next wave.
//! Waiting for the whole wave before flushing is what turns N sibling loads into one batch.

use std::sync::Arc;

use core_model::{FieldDefinition, FieldType, Schema};
use futures::future::join_all;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, trace};

use crate::{
    access_solver::AccessSolver,
    context::{ExecutionContext, ResolverContext},
    dispatch::DispatchTable,
    error::{ExecutionError, FieldError, PathSegment},
    resolver::ResolveParams,
    validation::field::ValidatedField,
    value::FieldValue,
};

use super::{
    completion::complete_leaf,
    response::{NodeId, ROOT, ResponseGraph},
};

pub(crate) const TYPENAME_FIELD: &str = "__typename";

/// A field waiting to be resolved in some wave.
pub(crate) struct FieldTask<'a> {
    parent: NodeId,
    parent_type: &'a str,
    parent_value: Arc<Value>,
    field: &'a ValidatedField,
    /// Path of the enclosing object
    path: Vec<PathSegment>,
}

impl FieldTask<'_> {
    fn field_path(&self) -> Vec<PathSegment> {
        let mut path = self.path.clone();
        path.push(PathSegment::Field(self.field.output_name()));
        path
    }
}

struct PendingField<'a> {
    node: NodeId,
    definition: &'a FieldDefinition,
    field: &'a ValidatedField,
    path: Vec<PathSegment>,
}

pub(crate) struct Executor<'a> {
    schema: &'a Schema,
    dispatch: &'a DispatchTable,
    context: &'a ExecutionContext,
    resolver_context: ResolverContext,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        dispatch: &'a DispatchTable,
        context: &'a ExecutionContext,
        resolver_context: ResolverContext,
    ) -> Self {
        Self {
            schema,
            dispatch,
            context,
            resolver_context,
        }
    }

    pub(crate) fn root_tasks(
        &self,
        root_type: &'a str,
        fields: impl IntoIterator<Item = &'a ValidatedField>,
    ) -> Vec<FieldTask<'a>> {
        let root_value = Arc::new(Value::Null);

        fields
            .into_iter()
            .map(|field| FieldTask {
                parent: ROOT,
                parent_type: root_type,
                parent_value: root_value.clone(),
                field,
                path: vec![],
            })
            .collect()
    }

    pub(crate) fn resolve_params(
        &self,
        parent_type: &str,
        parent_value: Arc<Value>,
        field: &ValidatedField,
        definition: &FieldDefinition,
    ) -> ResolveParams {
        let mut arguments = field.arguments.clone();
        for (name, argument) in &definition.arguments {
            if let Some(default_value) = &argument.default_value {
                if !arguments.contains_key(name) {
                    arguments.insert(name.clone(), default_value.clone());
                }
            }
        }

        ResolveParams {
            parent: parent_value,
            arguments,
            context: self.resolver_context.clone(),
            type_name: parent_type.to_string(),
            field_name: field.name.to_string(),
        }
    }

    /// Resolve `tasks` and everything beneath them. Fails only if the operation is cancelled.
    pub(crate) async fn run(
        &self,
        graph: &mut ResponseGraph,
        mut tasks: Vec<FieldTask<'a>>,
    ) -> Result<(), ExecutionError> {
        let mut depth = 0;

        while !tasks.is_empty() {
            if self.context.cancellation.is_cancelled() {
                return Err(self.context.cancellation.error());
            }

            depth += 1;
            tasks = self
                .run_wave(graph, tasks)
                .instrument(debug_span!("wave", depth))
                .await?;
        }

        Ok(())
    }

    async fn run_wave(
        &self,
        graph: &mut ResponseGraph,
        tasks: Vec<FieldTask<'a>>,
    ) -> Result<Vec<FieldTask<'a>>, ExecutionError> {
        let mut pending = vec![];
        let mut invocations = vec![];

        for task in tasks {
            if graph.is_nulled(task.parent) {
                continue;
            }

            let output_name = task.field.output_name();
            let field_name = task.field.name.as_str();
            let path = task.field_path();

            if field_name == TYPENAME_FIELD {
                let node = graph.add_field(task.parent, &output_name, true);
                graph.set_leaf(node, Value::String(task.parent_type.to_string()));
                continue;
            }

            let Some(definition) = self.schema.get_field(task.parent_type, field_name) else {
                let node = graph.add_field(task.parent, &output_name, false);
                graph.fail(
                    node,
                    &FieldError::internal(format!(
                        "Field {}.{field_name} is not part of the schema",
                        task.parent_type
                    )),
                    &path,
                );
                continue;
            };

            let node = graph.add_field(task.parent, &output_name, definition.typ.is_non_null());

            if !self.context.identity.solve(&definition.access) {
                graph.fail(node, &FieldError::Authorization, &path);
                continue;
            }

            let resolver = match self.dispatch.resolver_for(task.parent_type, field_name) {
                Ok(resolver) => resolver,
                Err(e) => {
                    graph.fail(node, &FieldError::internal(e.to_string()), &path);
                    continue;
                }
            };

            trace!(field = %format!("{}.{field_name}", task.parent_type), "Dispatching");

            let params = self.resolve_params(
                task.parent_type,
                task.parent_value.clone(),
                task.field,
                definition,
            );
            invocations.push(resolver.resolve(params));
            pending.push(PendingField {
                node,
                definition,
                field: task.field,
                path,
            });
        }

        let cancellation = &self.context.cancellation;

        let resolved = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(cancellation.error()),
            resolved = join_all(invocations) => resolved,
        };

        let mut values = resolved
            .into_iter()
            .map(|result| result.unwrap_or_else(FieldValue::Error))
            .collect::<Vec<_>>();

        self.settle(&mut values).await?;

        let mut next_wave = vec![];
        let resolved_count = values.len();

        for (field, value) in pending.into_iter().zip(values) {
            self.complete_value(
                graph,
                field.node,
                &field.definition.typ,
                field.field,
                value,
                &field.path,
                &mut next_wave,
            );
        }

        debug!(
            resolved = resolved_count,
            next = next_wave.len(),
            "Wave complete"
        );

        Ok(next_wave)
    }

    /// Flush the batch coordinator until every deferred value of the wave has been loaded.
    async fn settle(&self, values: &mut [FieldValue]) -> Result<(), ExecutionError> {
        let coordinator = &self.context.coordinator;
        let cancellation = &self.context.cancellation;

        loop {
            let settled = values
                .iter_mut()
                .fold(true, |settled, value| value.settle() && settled);

            if settled {
                return Ok(());
            }

            if !coordinator.has_queued() {
                values.iter_mut().for_each(FieldValue::abandon_pending);
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(cancellation.error()),
                _ = coordinator.flush_all() => {}
            }
        }
    }

    /// Record a settled value at `node`, queuing the subfields of object values on `next_wave`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn complete_value(
        &self,
        graph: &mut ResponseGraph,
        node: NodeId,
        typ: &'a FieldType,
        field: &'a ValidatedField,
        value: FieldValue,
        path: &[PathSegment],
        next_wave: &mut Vec<FieldTask<'a>>,
    ) {
        match value {
            FieldValue::Error(error) => graph.fail(node, &error, path),
            FieldValue::Deferred(deferred) => graph.fail(
                node,
                &FieldError::internal(format!("Unsettled load from '{}'", deferred.loader())),
                path,
            ),
            FieldValue::Value(Value::Null) => {
                if typ.is_non_null() {
                    graph.fail(node, &FieldError::NullForNonNull(field.name.to_string()), path);
                } else {
                    graph.nullify(node);
                }
            }
            FieldValue::List(items) => {
                self.complete_list(graph, node, typ, field, items, path, next_wave)
            }
            FieldValue::Value(Value::Array(items))
                if matches!(typ.nullable(), FieldType::List(_)) =>
            {
                let items = items.into_iter().map(FieldValue::Value).collect();
                self.complete_list(graph, node, typ, field, items, path, next_wave)
            }
            FieldValue::Value(value) => {
                if let FieldType::List(_) = typ.nullable() {
                    graph.fail(
                        node,
                        &FieldError::InvalidValue(format!(
                            "Expected a list of type {typ}, found {value}"
                        )),
                        path,
                    );
                    return;
                }

                let type_name = typ.innermost_name();
                let Some(schema_type) = self.schema.get_type(type_name) else {
                    graph.fail(
                        node,
                        &FieldError::internal(format!(
                            "Type {type_name} is not part of the schema"
                        )),
                        path,
                    );
                    return;
                };

                if schema_type.is_leaf() {
                    match complete_leaf(schema_type, value) {
                        Ok(value) => graph.set_leaf(node, value),
                        Err(error) => graph.fail(node, &error, path),
                    }
                } else if !value.is_object() {
                    graph.fail(
                        node,
                        &FieldError::InvalidValue(format!(
                            "Expected an object of type {type_name}, found {value}"
                        )),
                        path,
                    );
                } else {
                    graph.set_object(node);
                    let parent_value = Arc::new(value);
                    next_wave.extend(field.subfields.iter().map(|subfield| FieldTask {
                        parent: node,
                        parent_type: &schema_type.name,
                        parent_value: parent_value.clone(),
                        field: subfield,
                        path: path.to_vec(),
                    }));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_list(
        &self,
        graph: &mut ResponseGraph,
        node: NodeId,
        typ: &'a FieldType,
        field: &'a ValidatedField,
        items: Vec<FieldValue>,
        path: &[PathSegment],
        next_wave: &mut Vec<FieldTask<'a>>,
    ) {
        let FieldType::List(item_type) = typ.nullable() else {
            graph.fail(
                node,
                &FieldError::InvalidValue(format!("Expected a value of type {typ}, found a list")),
                path,
            );
            return;
        };

        graph.set_list(node);

        for (index, item) in items.into_iter().enumerate() {
            let item_node = graph.add_list_item(node, item_type.is_non_null());
            let mut item_path = path.to_vec();
            item_path.push(PathSegment::Index(index));

            self.complete_value(graph, item_node, item_type, field, item, &item_path, next_wave);
        }
    }
}
