// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph entity functions
//!
//! Entities flow through the executor as id references, so these functions
//! resolve labels, types and properties against the graph. An entity deleted
//! earlier in the same query falls back to whatever the reference carries.

use super::function_trait::{
    list_arg, Arity, BuiltinFunction, FunctionContext, FunctionError, FunctionResult,
};
use crate::storage::{Graph, NodeId, NodeValue, RelationId, Value};

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("id", "Internal id of a node or relationship", Arity::exactly(1), id),
        BuiltinFunction::new("labels", "Labels of a node", Arity::exactly(1), labels),
        BuiltinFunction::new("type", "Type of a relationship", Arity::exactly(1), rel_type),
        BuiltinFunction::new("properties", "Property map of an entity or map", Arity::exactly(1), properties),
        BuiltinFunction::new("keys", "Property keys of an entity or map", Arity::exactly(1), keys),
        BuiltinFunction::new("startNode", "Source node of a relationship", Arity::exactly(1), start_node),
        BuiltinFunction::new("endNode", "Destination node of a relationship", Arity::exactly(1), end_node),
        BuiltinFunction::new("hasLabels", "Whether a node carries every given label", Arity::exactly(2), has_labels),
        BuiltinFunction::new("nodes", "Nodes along a path", Arity::exactly(1), nodes),
        BuiltinFunction::new("relationships", "Relationships along a path", Arity::exactly(1), relationships),
        BuiltinFunction::new("length", "Number of hops in a path", Arity::exactly(1), length),
        BuiltinFunction::new("indegree", "Number of incoming relationships", Arity::at_least(1), indegree),
        BuiltinFunction::new("outdegree", "Number of outgoing relationships", Arity::at_least(1), outdegree),
    ]
}

fn id(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Node(n) => Ok(Value::Integer(n.id as i64)),
        Value::Edge(e) => Ok(Value::Integer(e.id as i64)),
        other => Err(FunctionError::type_mismatch("Node, Edge, or Null", other)),
    }
}

fn labels(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Node(n) => {
            let names = match context.graph.node_value(n.id) {
                Some(full) => full.labels,
                None => n.labels.clone(),
            };
            Ok(Value::from(names))
        }
        other => Err(FunctionError::type_mismatch("Node or Null", other)),
    }
}

fn rel_type(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Edge(e) => {
            let name = context
                .graph
                .get_edge(e.id)
                .and_then(|record| context.graph.schema().relation_name(record.relation))
                .map(str::to_string)
                .unwrap_or_else(|| e.rel_type.clone());
            Ok(Value::String(name))
        }
        other => Err(FunctionError::type_mismatch("Edge or Null", other)),
    }
}

/// Named properties of an entity or map argument
fn property_entries(graph: &Graph, value: &Value) -> FunctionResult<Option<Vec<(String, Value)>>> {
    match value {
        Value::Null => Ok(None),
        Value::Map(entries) => Ok(Some(entries.clone())),
        Value::Node(n) => Ok(Some(
            graph
                .node_value(n.id)
                .map(|full| full.properties)
                .unwrap_or_else(|| n.properties.clone()),
        )),
        Value::Edge(e) => Ok(Some(
            graph
                .edge_value(e.id)
                .map(|full| full.properties)
                .unwrap_or_else(|| e.properties.clone()),
        )),
        other => Err(FunctionError::type_mismatch("Map, Node, Edge, or Null", other)),
    }
}

fn properties(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(property_entries(context.graph, context.arg(0))?
        .map(Value::Map)
        .unwrap_or(Value::Null))
}

fn keys(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(property_entries(context.graph, context.arg(0))?
        .map(|entries| Value::List(entries.into_iter().map(|(k, _)| Value::String(k)).collect()))
        .unwrap_or(Value::Null))
}

fn endpoint(context: &FunctionContext, source: bool) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Edge(e) => Ok(Value::Node(NodeValue::reference(if source {
            e.src
        } else {
            e.dst
        }))),
        other => Err(FunctionError::type_mismatch("Edge or Null", other)),
    }
}

fn start_node(context: &FunctionContext) -> FunctionResult<Value> {
    endpoint(context, true)
}

fn end_node(context: &FunctionContext) -> FunctionResult<Value> {
    endpoint(context, false)
}

fn has_labels(context: &FunctionContext) -> FunctionResult<Value> {
    let node = match context.arg(0) {
        Value::Null => return Ok(Value::Null),
        Value::Node(n) => n.id,
        other => return Err(FunctionError::type_mismatch("Node or Null", other)),
    };
    let Some(wanted) = list_arg(context.arg(1))? else {
        return Ok(Value::Null);
    };
    let schema = context.graph.schema();
    for label in wanted {
        let name = label
            .as_str()
            .ok_or_else(|| FunctionError::type_mismatch("String", label))?;
        match schema.label_id(name) {
            Some(l) if context.graph.node_has_label(node, l) => {}
            _ => return Ok(Value::Boolean(false)),
        }
    }
    Ok(Value::Boolean(true))
}

fn nodes(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Path(p) => Ok(Value::List(p.nodes.iter().cloned().map(Value::Node).collect())),
        other => Err(FunctionError::type_mismatch("Path or Null", other)),
    }
}

fn relationships(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Path(p) => Ok(Value::List(p.edges.iter().cloned().map(Value::Edge).collect())),
        other => Err(FunctionError::type_mismatch("Path or Null", other)),
    }
}

fn length(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Path(p) => Ok(Value::Integer(p.len() as i64)),
        other => Err(FunctionError::type_mismatch("Path or Null", other)),
    }
}

/// Relation filter from the trailing arguments: strings or lists of strings.
/// `None` means every relation type; unknown names are skipped.
fn relation_filter(context: &FunctionContext) -> FunctionResult<Option<Vec<RelationId>>> {
    if context.argument_count() < 2 {
        return Ok(None);
    }
    let schema = context.graph.schema();
    let mut ids = Vec::new();
    let mut push = |v: &Value| -> FunctionResult<()> {
        let name = v
            .as_str()
            .ok_or_else(|| FunctionError::type_mismatch("String", v))?;
        if let Some(id) = schema.relation_id(name) {
            ids.push(id);
        }
        Ok(())
    };
    for arg in &context.arguments[1..] {
        match arg {
            Value::List(items) => items.iter().try_for_each(&mut push)?,
            other => push(other)?,
        }
    }
    Ok(Some(ids))
}

fn degree(context: &FunctionContext, outgoing: bool) -> FunctionResult<Value> {
    let node: NodeId = match context.arg(0) {
        Value::Null => return Ok(Value::Null),
        Value::Node(n) => n.id,
        other => return Err(FunctionError::type_mismatch("Node or Null", other)),
    };
    let filter = relation_filter(context)?;
    if matches!(&filter, Some(ids) if ids.is_empty()) {
        return Ok(Value::Integer(0));
    }
    let count = if outgoing {
        context.graph.out_degree(node, filter.as_deref())
    } else {
        context.graph.in_degree(node, filter.as_deref())
    };
    Ok(Value::Integer(count as i64))
}

fn indegree(context: &FunctionContext) -> FunctionResult<Value> {
    degree(context, false)
}

fn outdegree(context: &FunctionContext) -> FunctionResult<Value> {
    degree(context, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EdgeValue, PathValue, PropertyMap};

    fn sample() -> (Graph, NodeId, NodeId, u64) {
        let mut graph = Graph::new("g");
        let person = graph.intern_label("Person").unwrap();
        let knows = graph.intern_relation("KNOWS").unwrap();
        let name = graph.intern_attribute("name").unwrap();
        let mut props = PropertyMap::new();
        props.set(name, Value::from("ann"));
        let a = graph.create_node(&[person], props).unwrap();
        let b = graph.create_node(&[], PropertyMap::new()).unwrap();
        let e = graph.create_edge(knows, a, b, PropertyMap::new()).unwrap();
        graph.flush().unwrap();
        (graph, a, b, e)
    }

    fn call(graph: &Graph, f: fn(&FunctionContext) -> FunctionResult<Value>, args: Vec<Value>) -> Value {
        f(&FunctionContext::new(args, graph)).unwrap()
    }

    #[test]
    fn test_entity_accessors() {
        let (graph, a, b, e) = sample();
        let node = Value::Node(NodeValue::reference(a));
        let edge = Value::Edge(EdgeValue::reference(e, a, b));
        assert_eq!(call(&graph, id, vec![node.clone()]), Value::Integer(a as i64));
        assert_eq!(call(&graph, labels, vec![node.clone()]), Value::from(vec!["Person"]));
        assert_eq!(call(&graph, rel_type, vec![edge.clone()]), Value::from("KNOWS"));
        assert_eq!(call(&graph, keys, vec![node.clone()]), Value::from(vec!["name"]));
        assert_eq!(
            call(&graph, properties, vec![node.clone()]).map_get("name"),
            Some(&Value::from("ann"))
        );
        assert_eq!(call(&graph, start_node, vec![edge.clone()]).as_node_id(), Some(a));
        assert_eq!(call(&graph, end_node, vec![edge]).as_node_id(), Some(b));
        assert!(call(&graph, id, vec![Value::Null]).is_null());
    }

    #[test]
    fn test_has_labels_and_degrees() {
        let (graph, a, b, _) = sample();
        let node = Value::Node(NodeValue::reference(a));
        assert_eq!(
            call(&graph, has_labels, vec![node.clone(), Value::from(vec!["Person"])]),
            Value::Boolean(true)
        );
        assert_eq!(
            call(&graph, has_labels, vec![node.clone(), Value::from(vec!["Person", "Nope"])]),
            Value::Boolean(false)
        );
        assert_eq!(call(&graph, outdegree, vec![node.clone()]), Value::Integer(1));
        assert_eq!(
            call(&graph, outdegree, vec![node, Value::from("OTHER")]),
            Value::Integer(0)
        );
        assert_eq!(
            call(&graph, indegree, vec![Value::Node(NodeValue::reference(b)), Value::from(vec!["KNOWS"])]),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_path_functions() {
        let (graph, a, b, e) = sample();
        let path = PathValue {
            nodes: vec![NodeValue::reference(a), NodeValue::reference(b)],
            edges: vec![EdgeValue::reference(e, a, b)],
        };
        let value = Value::Path(path);
        assert_eq!(call(&graph, length, vec![value.clone()]), Value::Integer(1));
        assert_eq!(call(&graph, nodes, vec![value.clone()]).as_list().map(|l| l.len()), Some(2));
        assert_eq!(call(&graph, relationships, vec![value]).as_list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_wrong_entity_type() {
        let graph = Graph::new("g");
        let err = labels(&FunctionContext::new(vec![Value::Integer(1)], &graph)).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected Node or Null but was Integer");
    }
}
