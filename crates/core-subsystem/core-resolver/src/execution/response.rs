// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The result tree under construction.
//!
//! Nodes live in an arena and point at their parent, which is what null bubbling needs: when a
//! non-null field ends up null, its parent is nulled instead, repeating until a nullable field
//! (or the root, which nulls the whole `data`) absorbs it.

use serde_json::{Map, Value};

use crate::error::{FieldError, GraphQLError, PathSegment, Response};

pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

#[derive(Debug)]
enum NodeValue {
    Pending,
    Null,
    Leaf(Value),
    Object(Vec<(String, NodeId)>),
    List(Vec<NodeId>),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    non_null: bool,
    value: NodeValue,
}

#[derive(Debug)]
pub(crate) struct ResponseGraph {
    nodes: Vec<Node>,
    errors: Vec<GraphQLError>,
}

impl ResponseGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                non_null: false,
                value: NodeValue::Object(vec![]),
            }],
            errors: vec![],
        }
    }

    fn push(&mut self, parent: NodeId, non_null: bool) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            non_null,
            value: NodeValue::Pending,
        });
        id
    }

    /// Add a field to an object node. Repeated output names reuse the existing entry.
    pub(crate) fn add_field(
        &mut self,
        object: NodeId,
        output_name: &str,
        non_null: bool,
    ) -> NodeId {
        let id = self.push(object, non_null);
        if let NodeValue::Object(entries) = &mut self.nodes[object].value {
            match entries.iter_mut().find(|(name, _)| name == output_name) {
                Some(entry) => entry.1 = id,
                None => entries.push((output_name.to_string(), id)),
            }
        }
        id
    }

    pub(crate) fn add_list_item(&mut self, list: NodeId, non_null: bool) -> NodeId {
        let id = self.push(list, non_null);
        if let NodeValue::List(items) = &mut self.nodes[list].value {
            items.push(id);
        }
        id
    }

    pub(crate) fn set_leaf(&mut self, node: NodeId, value: Value) {
        self.nodes[node].value = NodeValue::Leaf(value);
    }

    pub(crate) fn set_object(&mut self, node: NodeId) {
        self.nodes[node].value = NodeValue::Object(vec![]);
    }

    pub(crate) fn set_list(&mut self, node: NodeId) {
        self.nodes[node].value = NodeValue::List(vec![]);
    }

    /// Null out `node`, bubbling through non-null ancestors.
    pub(crate) fn nullify(&mut self, node: NodeId) {
        let mut current = node;
        loop {
            let entry = &mut self.nodes[current];
            entry.value = NodeValue::Null;

            match entry.parent {
                Some(parent) if entry.non_null => current = parent,
                _ => break,
            }
        }
    }

    /// Whether `node` or one of its ancestors has been nulled (so resolving beneath it is moot).
    pub(crate) fn is_nulled(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let entry = &self.nodes[id];
            if matches!(entry.value, NodeValue::Null) {
                return true;
            }
            current = entry.parent;
        }
        false
    }

    pub(crate) fn record_error(&mut self, error: &FieldError, path: &[PathSegment]) {
        self.errors
            .push(GraphQLError::from_field_error(error, path.to_vec()));
    }

    /// Record `error` at `path` and null out `node`.
    pub(crate) fn fail(&mut self, node: NodeId, error: &FieldError, path: &[PathSegment]) {
        self.record_error(error, path);
        self.nullify(node);
    }

    pub(crate) fn into_errors(self) -> Vec<GraphQLError> {
        self.errors
    }

    pub(crate) fn into_response(self) -> Response {
        let data = match &self.nodes[ROOT].value {
            NodeValue::Null => None,
            _ => Some(self.to_value(ROOT)),
        };

        Response {
            data,
            errors: self.errors,
        }
    }

    fn to_value(&self, node: NodeId) -> Value {
        match &self.nodes[node].value {
            NodeValue::Pending | NodeValue::Null => Value::Null,
            NodeValue::Leaf(value) => value.clone(),
            NodeValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(name, id)| (name.clone(), self.to_value(*id)))
                    .collect::<Map<_, _>>(),
            ),
            NodeValue::List(items) => {
                Value::Array(items.iter().map(|id| self.to_value(*id)).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_bubbles_to_nearest_nullable_ancestor() {
        let mut graph = ResponseGraph::new();

        let post = graph.add_field(ROOT, "post", false);
        graph.set_object(post);
        let title = graph.add_field(post, "title", false);
        graph.set_leaf(title, json!("Hello"));
        let author = graph.add_field(post, "author", true);
        graph.set_object(author);
        let name = graph.add_field(author, "name", true);

        graph.fail(
            name,
            &FieldError::resolver("boom"),
            &["post".into(), "author".into(), "name".into()],
        );

        assert!(graph.is_nulled(title));
        let response = graph.into_response();
        assert_eq!(response.data, Some(json!({"post": null})));
        assert_eq!(response.errors.len(), 1);
    }

    #[test]
    fn null_reaching_the_root_nulls_data() {
        let mut graph = ResponseGraph::new();

        let viewer = graph.add_field(ROOT, "viewer", true);
        graph.set_list(viewer);
        let first = graph.add_list_item(viewer, true);
        graph.set_leaf(first, json!(1));
        let second = graph.add_list_item(viewer, true);

        graph.fail(second, &FieldError::internal("oops"), &["viewer".into(), 1.into()]);

        let response = graph.into_response();
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].message, "Internal error");
    }
}
