// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The entry points of the execution engine.
//!
//! An [`Engine`] bundles the sealed schema and dispatch table with the registered batch loaders,
//! the event broker and the configuration. It is cheap to clone and shared by every operation;
//! per-operation state lives in the [`ExecutionContext`] obtained from [`Engine::context`].

use std::sync::Arc;

use async_graphql_parser::types::OperationType;
use core_model::Schema;
use event_broker::{EventBroker, InProcessBroker};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::{
    access_solver::AccessSolver,
    config::EngineConfig,
    context::{ExecutionContext, Identity, ResolverContext},
    dispatch::{DispatchError, DispatchTable, DispatchTableBuilder},
    error::{ExecutionError, FieldError, PathSegment, Response},
    execution::{
        executor::{Executor, TYPENAME_FIELD},
        response::{ROOT, ResponseGraph},
    },
    loader::{BatchLoader, LoaderRegistry},
    resolver::SubscriptionResolver,
    subscription::SubscriptionStream,
    validation::{
        document_validator::DocumentValidator, field::ValidatedField,
        operation::ValidatedOperation, parse_query,
    },
    value::FieldValue,
};

struct EngineInner {
    schema: Arc<Schema>,
    dispatch: DispatchTable,
    loaders: LoaderRegistry,
    broker: Arc<dyn EventBroker>,
    config: EngineConfig,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

pub struct EngineBuilder {
    schema: Arc<Schema>,
    dispatch: DispatchTableBuilder,
    loaders: LoaderRegistry,
    broker: Option<Arc<dyn EventBroker>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            schema: schema.into(),
            dispatch: DispatchTableBuilder::new(),
            loaders: LoaderRegistry::new(),
            broker: None,
            config: EngineConfig::default(),
        }
    }

    pub fn dispatch(mut self, dispatch: DispatchTableBuilder) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn loader<L: BatchLoader>(mut self, loader: L) -> Self {
        self.loaders.register(loader);
        self
    }

    /// Use `broker` for subscriptions and publishing (an [`InProcessBroker`] by default).
    pub fn broker(mut self, broker: Arc<dyn EventBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seal the dispatch table against the schema. Fails if a reachable field has no resolver.
    pub fn build(self) -> Result<Engine, DispatchError> {
        let dispatch = self.dispatch.seal(&self.schema)?;

        debug!(loaders = self.loaders.len(), "Engine ready");

        Ok(Engine {
            inner: Arc::new(EngineInner {
                schema: self.schema,
                dispatch,
                loaders: self.loaders,
                broker: self
                    .broker
                    .unwrap_or_else(|| Arc::new(InProcessBroker::new())),
                config: self.config,
            }),
        })
    }
}

impl Engine {
    pub fn builder(schema: impl Into<Arc<Schema>>) -> EngineBuilder {
        EngineBuilder::new(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn broker(&self) -> &Arc<dyn EventBroker> {
        &self.inner.broker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// A fresh context (with its own batch coordinator) for one operation by `identity`.
    pub fn context(&self, identity: Identity) -> ExecutionContext {
        ExecutionContext::new(
            identity,
            self.inner.loaders.coordinator(self.inner.config.max_batch_size),
        )
    }

    /// Parse and validate `query` against the engine's schema.
    #[instrument(skip_all)]
    pub fn validate(
        &self,
        query: &str,
        operation_name: Option<String>,
        variables: Option<Map<String, Value>>,
    ) -> Result<ValidatedOperation, ExecutionError> {
        let document = parse_query(query)?;

        let document_validator = DocumentValidator::new(
            &self.inner.schema,
            operation_name,
            variables,
            self.inner.config.max_query_depth,
        );

        Ok(document_validator.validate(document)?)
    }

    /// Validate and execute a query or mutation in one step. Validation failures are reported in
    /// the returned envelope.
    pub async fn execute_query(
        &self,
        query: &str,
        operation_name: Option<String>,
        variables: Map<String, Value>,
        context: &ExecutionContext,
    ) -> Response {
        match self.validate(query, operation_name, Some(variables.clone())) {
            Ok(operation) => self.execute(&operation, &variables, context).await,
            Err(e) => e.into(),
        }
    }

    /// Execute a query or mutation.
    ///
    /// Query root fields resolve together, wave by wave. Mutation root fields resolve one at a
    /// time in document order, each with its whole subtree, before the next one starts.
    ///
    /// Field errors end up in the envelope next to the partial data. If the operation is
    /// cancelled (or times out) the envelope has no data and ends with the cancellation error.
    #[instrument(
        name = "Engine::execute"
        skip_all
        fields(operation = ?operation.name, kind = ?operation.typ)
        )]
    pub async fn execute(
        &self,
        operation: &ValidatedOperation,
        variables: &Map<String, Value>,
        context: &ExecutionContext,
    ) -> Response {
        if operation.typ == OperationType::Subscription {
            return ExecutionError::SubscriptionNotExecutable.into();
        }

        let root_type = match self.preflight(operation) {
            Ok(root_type) => root_type,
            Err(e) => return e.into(),
        };

        let resolver_context = ResolverContext::new(
            context,
            Arc::new(variables.clone()),
            self.inner.broker.clone(),
        );
        let executor = Executor::new(
            &self.inner.schema,
            &self.inner.dispatch,
            context,
            resolver_context,
        );
        let mut graph = ResponseGraph::new();

        let outcome = if operation.typ == OperationType::Mutation {
            let mut outcome = Ok(());
            for field in &operation.fields {
                outcome = executor
                    .run(&mut graph, executor.root_tasks(root_type, [field]))
                    .await;
                if outcome.is_err() {
                    break;
                }
            }
            outcome
        } else {
            executor
                .run(&mut graph, executor.root_tasks(root_type, &operation.fields))
                .await
        };

        match outcome {
            Ok(()) => graph.into_response(),
            Err(e) => {
                debug!(error = %e, "Operation ended early");
                let mut errors = graph.into_errors();
                errors.push(e.into_graphql_error());
                Response { data: None, errors }
            }
        }
    }

    /// Start a subscription.
    ///
    /// The root field's arguments are resolved once into a topic and filter. Each matching event
    /// is then executed like a query, with the event (mapped by the resolver) as the value of
    /// the root field. Dropping the stream or cancelling `context` unsubscribes.
    #[instrument(
        name = "Engine::subscribe"
        skip_all
        fields(operation = ?operation.name)
        )]
    pub async fn subscribe(
        &self,
        operation: &ValidatedOperation,
        variables: &Map<String, Value>,
        context: ExecutionContext,
    ) -> Result<SubscriptionStream, ExecutionError> {
        if operation.typ != OperationType::Subscription {
            return Err(ExecutionError::NotASubscription);
        }

        let root_type = self.preflight(operation)?;

        let [root_field] = operation.fields.as_slice() else {
            return Err(ExecutionError::SubscriptionRootCount(operation.fields.len()));
        };
        let field_name = root_field.name.as_str();

        let definition = self
            .inner
            .schema
            .get_field(root_type, field_name)
            .ok_or_else(|| ExecutionError::UnresolvedField {
                type_name: root_type.to_string(),
                field_name: field_name.to_string(),
            })?;

        if !context.identity.solve(&definition.access) {
            return Err(ExecutionError::SubscriptionSetup(FieldError::Authorization));
        }

        let resolver = self
            .inner
            .dispatch
            .subscription_resolver_for(root_type, field_name)?
            .clone();

        let variables = Arc::new(variables.clone());
        let resolver_context =
            ResolverContext::new(&context, variables.clone(), self.inner.broker.clone());
        let params = Executor::new(
            &self.inner.schema,
            &self.inner.dispatch,
            &context,
            resolver_context,
        )
        .resolve_params(root_type, Arc::new(Value::Null), root_field, definition);

        let cancellation = context.cancellation.clone();
        let spec = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(cancellation.error()),
            spec = resolver.subscribe(params) => spec.map_err(ExecutionError::SubscriptionSetup)?,
        };

        let policy = resolver
            .delivery_policy()
            .unwrap_or(self.inner.config.subscription_delivery);
        let registration = self
            .inner
            .broker
            .subscribe(&spec.topic, spec.filter, policy)?;

        debug!(
            topic = %spec.topic,
            registration = %registration.id(),
            ?policy,
            "Subscription registered"
        );

        Ok(SubscriptionStream::new(
            self.clone(),
            root_type.to_string(),
            root_field.clone(),
            resolver,
            variables,
            context,
            registration,
        ))
    }

    /// Resolve one subscription event into an envelope. `None` if the subscription was cancelled
    /// meanwhile.
    pub(crate) async fn execute_event(
        &self,
        root_type: &str,
        root_field: &ValidatedField,
        resolver: &dyn SubscriptionResolver,
        variables: &Arc<Map<String, Value>>,
        context: &ExecutionContext,
        event: Value,
    ) -> Option<Response> {
        let Some(definition) = self
            .inner
            .schema
            .get_field(root_type, root_field.name.as_str())
        else {
            return Some(
                ExecutionError::UnresolvedField {
                    type_name: root_type.to_string(),
                    field_name: root_field.name.to_string(),
                }
                .into(),
            );
        };

        // Loads are never memoized across events
        let event_context = ExecutionContext {
            identity: context.identity.clone(),
            cancellation: context.cancellation.clone(),
            coordinator: Arc::new(
                self.inner
                    .loaders
                    .coordinator(self.inner.config.max_batch_size),
            ),
        };
        let resolver_context = ResolverContext::new(
            &event_context,
            variables.clone(),
            self.inner.broker.clone(),
        );
        let executor = Executor::new(
            &self.inner.schema,
            &self.inner.dispatch,
            &event_context,
            resolver_context,
        );

        let mut graph = ResponseGraph::new();
        let output_name = root_field.output_name();
        let node = graph.add_field(ROOT, &output_name, definition.typ.is_non_null());

        let value = match resolver.resolve_event(event) {
            Ok(value) => FieldValue::Value(value),
            Err(e) => FieldValue::Error(e),
        };

        let mut tasks = vec![];
        executor.complete_value(
            &mut graph,
            node,
            &definition.typ,
            root_field,
            value,
            &[PathSegment::Field(output_name)],
            &mut tasks,
        );

        match executor.run(&mut graph, tasks).await {
            Ok(()) => Some(graph.into_response()),
            Err(_) => None,
        }
    }

    /// Close every subscription and reject new ones.
    pub fn shutdown(&self) {
        self.inner.broker.shutdown()
    }

    /// Re-check what validation guarantees: the operation kind is supported, the
    /// selection is not too deep and every selected field exists.
    fn preflight(&self, operation: &ValidatedOperation) -> Result<&str, ExecutionError> {
        let schema = &self.inner.schema;

        let root_type = match operation.typ {
            OperationType::Query => Some(schema.query_type()),
            OperationType::Mutation => schema.mutation_type(),
            OperationType::Subscription => schema.subscription_type(),
        }
        .ok_or(ExecutionError::UnsupportedOperation(match operation.typ {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        }))?;

        let max_depth = self.inner.config.max_query_depth;
        if operation.depth() > max_depth {
            return Err(ExecutionError::SelectionSetTooDeep(max_depth));
        }

        self.check_fields(root_type, &operation.fields)?;

        Ok(root_type)
    }

    fn check_fields(
        &self,
        type_name: &str,
        fields: &[ValidatedField],
    ) -> Result<(), ExecutionError> {
        for field in fields {
            let field_name = field.name.as_str();
            if field_name == TYPENAME_FIELD {
                continue;
            }

            let definition = self
                .inner
                .schema
                .get_field(type_name, field_name)
                .ok_or_else(|| ExecutionError::UnresolvedField {
                    type_name: type_name.to_string(),
                    field_name: field_name.to_string(),
                })?;

            if !field.subfields.is_empty() {
                self.check_fields(definition.typ.innermost_name(), &field.subfields)?;
            }
        }

        Ok(())
    }
}
