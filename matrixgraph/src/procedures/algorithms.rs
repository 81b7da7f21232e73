// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph algorithm procedures: PageRank, weighted shortest path and BFS
//!
//! Every algorithm follows relationships in their stored direction.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;

use super::{string_argument, BuiltinProcedure};
use crate::exec::eval::resolve_relations;
use crate::exec::{ExecResult, ExecutionContext, ExecutionError};
use crate::functions::Arity;
use crate::storage::{EdgeId, EdgeValue, Graph, NodeId, NodeValue, PathValue, RelationId, Value};

const DAMPING: f64 = 0.85;
const TOLERANCE: f64 = 1e-4;
const MAX_ITERATIONS: usize = 100;

pub(crate) fn procedures() -> Vec<BuiltinProcedure> {
    vec![
        BuiltinProcedure::new("algo.pageRank", Arity::exactly(2), &["node", "score"], page_rank),
        BuiltinProcedure::new(
            "algo.shortestPath",
            Arity::between(2, 3),
            &["path", "pathWeight"],
            shortest_path,
        ),
        BuiltinProcedure::new("algo.BFS", Arity::exactly(3), &["nodes", "edges"], bfs),
    ]
}

/// Relation filter from an optional type name. `None` when the type does
/// not exist, in which case nothing is reachable.
fn relation_filter(graph: &Graph, name: &Value, procedure: &str) -> ExecResult<Option<Option<Vec<RelationId>>>> {
    match name {
        Value::Null => Ok(Some(None)),
        other => {
            let name = string_argument(procedure, other)?;
            Ok(resolve_relations(graph, &[name.to_string()]))
        }
    }
}

fn node_argument(procedure: &str, value: &Value) -> ExecResult<NodeId> {
    value.as_node_id().ok_or_else(|| {
        ExecutionError::type_mismatch("Node", format!("{} in a call to {}", value.type_name(), procedure))
    })
}

fn page_rank(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let graph = ctx.graph();
    let nodes: Vec<NodeId> = match &arguments[0] {
        Value::Null => graph.node_ids(),
        other => match graph.schema().label_id(string_argument("algo.pageRank", other)?) {
            Some(label) => graph.label_nodes(label),
            None => return Ok(Vec::new()),
        },
    };
    let relations = match relation_filter(graph, &arguments[1], "algo.pageRank")? {
        Some(relations) => relations,
        None => {
            // no edges of an unknown type: every node keeps the uniform score
            let uniform = 1.0 / nodes.len().max(1) as f64;
            return Ok(nodes
                .into_iter()
                .map(|n| vec![Value::Node(NodeValue::reference(n)), Value::Float(uniform)])
                .collect());
        }
    };
    let scores = rank(graph, &nodes, relations.as_deref());
    Ok(nodes
        .into_iter()
        .zip(scores)
        .map(|(n, s)| vec![Value::Node(NodeValue::reference(n)), Value::Float(s)])
        .collect())
}

/// Power iteration over the subgraph induced by `nodes`.
fn rank(graph: &Graph, nodes: &[NodeId], relations: Option<&[RelationId]>) -> Vec<f64> {
    let n = nodes.len();
    if n == 0 {
        return Vec::new();
    }
    let position: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut out_degree = vec![0usize; n];
    for (i, id) in nodes.iter().enumerate() {
        for (_, dst) in graph.outgoing(*id, relations) {
            if let Some(&j) = position.get(&dst) {
                incoming[j].push(i);
                out_degree[i] += 1;
            }
        }
    }

    let base = (1.0 - DAMPING) / n as f64;
    let mut scores = vec![1.0 / n as f64; n];
    for iteration in 0..MAX_ITERATIONS {
        let dangling: f64 = (0..n).filter(|i| out_degree[*i] == 0).map(|i| scores[i]).sum();
        let spread = DAMPING * dangling / n as f64;
        let next: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|j| {
                let inflow: f64 = incoming[j]
                    .iter()
                    .map(|&i| scores[i] / out_degree[i] as f64)
                    .sum();
                base + spread + DAMPING * inflow
            })
            .collect();
        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        if delta < TOLERANCE {
            debug!("pageRank converged after {} iterations", iteration + 1);
            break;
        }
    }
    scores
}

struct PathConfig {
    relations: Option<Option<Vec<RelationId>>>,
    weight: Option<String>,
    max_len: Option<usize>,
}

fn path_config(graph: &Graph, config: Option<&Value>) -> ExecResult<PathConfig> {
    let mut out = PathConfig {
        relations: Some(None),
        weight: None,
        max_len: None,
    };
    let entries = match config {
        None | Some(Value::Null) => return Ok(out),
        Some(Value::Map(entries)) => entries,
        Some(other) => {
            return Err(ExecutionError::Argument(format!(
                "algo.shortestPath expected a map as configuration, got {}",
                other.type_name()
            )))
        }
    };
    for (key, value) in entries {
        match key.as_str() {
            "relTypes" => {
                let names = value
                    .as_list()
                    .ok_or_else(|| ExecutionError::type_mismatch("List", value.type_name()))?
                    .iter()
                    .map(|v| string_argument("algo.shortestPath", v).map(str::to_string))
                    .collect::<ExecResult<Vec<_>>>()?;
                out.relations = resolve_relations(graph, &names);
            }
            "weightProp" => out.weight = Some(string_argument("algo.shortestPath", value)?.to_string()),
            "maxLen" => match value {
                Value::Integer(n) if *n >= 0 => out.max_len = Some(*n as usize),
                other => {
                    return Err(ExecutionError::Argument(format!(
                        "maxLen expected Integer >= 0, got {}",
                        other.type_name()
                    )))
                }
            },
            other => {
                return Err(ExecutionError::Argument(format!(
                    "Unknown algo.shortestPath option '{}'",
                    other
                )))
            }
        }
    }
    Ok(out)
}

fn edge_weight(graph: &Graph, edge: EdgeId, weight: Option<&str>) -> ExecResult<f64> {
    let attr = match weight.and_then(|w| graph.schema().attribute_id(w)) {
        Some(attr) => attr,
        None => return Ok(1.0),
    };
    match graph.edge_property(edge, attr) {
        None => Ok(1.0),
        Some(v) => {
            let w = v
                .as_f64()
                .ok_or_else(|| ExecutionError::type_mismatch("Integer or Float", v.type_name()))?;
            if w < 0.0 {
                return Err(ExecutionError::Argument(
                    "algo.shortestPath does not support negative weights".to_string(),
                ));
            }
            Ok(w)
        }
    }
}

fn shortest_path(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let graph = ctx.graph();
    let source = node_argument("algo.shortestPath", &arguments[0])?;
    let target = node_argument("algo.shortestPath", &arguments[1])?;
    let config = path_config(graph, arguments.get(2))?;
    let relations = match config.relations {
        Some(relations) => relations,
        None => return Ok(Vec::new()),
    };
    let weight = config.weight.as_deref();
    let found = match config.max_len {
        Some(max_len) => bounded_path(graph, source, target, relations.as_deref(), weight, max_len)?,
        None => weighted_path(graph, source, target, relations.as_deref(), weight)?,
    };
    Ok(found
        .map(|(path, cost)| vec![Value::Path(path), Value::Float(cost)])
        .into_iter()
        .collect())
}

/// Cheapest path without a hop limit, via A* with a zero heuristic.
fn weighted_path(
    graph: &Graph,
    source: NodeId,
    target: NodeId,
    relations: Option<&[RelationId]>,
    weight: Option<&str>,
) -> ExecResult<Option<(PathValue, f64)>> {
    let mut network: DiGraph<NodeId, (EdgeValue, f64)> = DiGraph::new();
    let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
    for id in graph.node_ids() {
        index.insert(id, network.add_node(id));
    }
    for (&id, &from) in &index {
        for (edge, dst) in graph.outgoing(id, relations) {
            if let Some(&to) = index.get(&dst) {
                let cost = edge_weight(graph, edge, weight)?;
                network.add_edge(from, to, (EdgeValue::reference(edge, id, dst), cost));
            }
        }
    }
    let (start, goal) = match (index.get(&source), index.get(&target)) {
        (Some(s), Some(g)) => (*s, *g),
        _ => return Ok(None),
    };
    let found = astar(&network, start, |n| n == goal, |e| e.weight().1, |_| 0.0);
    let (cost, hops) = match found {
        Some(found) => found,
        None => return Ok(None),
    };
    let mut path = PathValue::single(NodeValue::reference(source));
    for pair in hops.windows(2) {
        let cheapest = network
            .edges_connecting(pair[0], pair[1])
            .min_by(|a, b| a.weight().1.total_cmp(&b.weight().1));
        if let Some(edge) = cheapest {
            path.edges.push(edge.weight().0.clone());
            path.nodes.push(NodeValue::reference(network[pair[1]]));
        }
    }
    Ok(Some((path, cost)))
}

/// Cheapest path of at most `max_len` hops: Bellman-Ford by layers.
fn bounded_path(
    graph: &Graph,
    source: NodeId,
    target: NodeId,
    relations: Option<&[RelationId]>,
    weight: Option<&str>,
    max_len: usize,
) -> ExecResult<Option<(PathValue, f64)>> {
    if graph.get_node(source).is_none() || graph.get_node(target).is_none() {
        return Ok(None);
    }
    // per layer: node -> (cost, predecessor node, edge)
    let mut layers: Vec<HashMap<NodeId, (f64, Option<(NodeId, EdgeValue)>)>> =
        vec![HashMap::from([(source, (0.0, None))])];
    for _ in 0..max_len {
        let mut next: HashMap<NodeId, (f64, Option<(NodeId, EdgeValue)>)> = HashMap::new();
        let previous = layers.last().map(|l| l.iter().map(|(n, (c, _))| (*n, *c)).collect::<Vec<_>>());
        for (node, cost) in previous.unwrap_or_default() {
            for (edge, dst) in graph.outgoing(node, relations) {
                let total = cost + edge_weight(graph, edge, weight)?;
                let better = next.get(&dst).map(|(c, _)| total < *c).unwrap_or(true);
                if better {
                    next.insert(dst, (total, Some((node, EdgeValue::reference(edge, node, dst)))));
                }
            }
        }
        if next.is_empty() {
            break;
        }
        layers.push(next);
    }

    let best = layers
        .iter()
        .enumerate()
        .filter_map(|(depth, layer)| layer.get(&target).map(|(c, _)| (depth, *c)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    let (depth, cost) = match best {
        Some(best) => best,
        None => return Ok(None),
    };

    let mut nodes = vec![NodeValue::reference(target)];
    let mut edges = Vec::with_capacity(depth);
    let mut cursor = target;
    for layer in layers[1..=depth].iter().rev() {
        let (prev, edge) = match layer.get(&cursor) {
            Some((_, Some((prev, edge)))) => (*prev, edge.clone()),
            _ => {
                return Err(ExecutionError::Internal(
                    "broken predecessor chain in bounded shortest path".to_string(),
                ))
            }
        };
        edges.push(edge);
        nodes.push(NodeValue::reference(prev));
        cursor = prev;
    }
    nodes.reverse();
    edges.reverse();
    Ok(Some((PathValue { nodes, edges }, cost)))
}

fn bfs(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let graph = ctx.graph();
    let source = node_argument("algo.BFS", &arguments[0])?;
    let max_level = match &arguments[1] {
        Value::Null => None,
        Value::Integer(n) if *n <= 0 => None,
        Value::Integer(n) => Some(*n as usize),
        other => return Err(ExecutionError::type_mismatch("Integer", other.type_name())),
    };
    let relations = match relation_filter(graph, &arguments[2], "algo.BFS")? {
        Some(relations) => relations,
        None => return Ok(vec![vec![Value::List(Vec::new()), Value::List(Vec::new())]]),
    };

    let mut seen: HashSet<NodeId> = HashSet::from([source]);
    let mut frontier: VecDeque<(NodeId, usize)> = VecDeque::from([(source, 0)]);
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    while let Some((node, level)) = frontier.pop_front() {
        if max_level.map(|m| level >= m).unwrap_or(false) {
            continue;
        }
        for (edge, dst) in graph.outgoing(node, relations.as_deref()) {
            if seen.insert(dst) {
                nodes.push(Value::Node(NodeValue::reference(dst)));
                edges.push(Value::Edge(EdgeValue::reference(edge, node, dst)));
                frontier.push_back((dst, level + 1));
            }
        }
    }
    Ok(vec![vec![Value::List(nodes), Value::List(edges)]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{GraphAccess, MemoryBudget};
    use crate::storage::PropertyMap;

    fn chain() -> (Graph, Vec<NodeId>) {
        // a -> b -> c, plus a heavy shortcut a -> c
        let mut g = Graph::new("g");
        let rel = g.intern_relation("R").unwrap();
        let w = g.intern_attribute("w").unwrap();
        let ids: Vec<NodeId> = (0..3)
            .map(|_| g.create_node(&[], PropertyMap::new()).unwrap())
            .collect();
        let weighted = |v: i64| {
            let mut p = PropertyMap::new();
            p.set(w, Value::Integer(v));
            p
        };
        g.create_edge(rel, ids[0], ids[1], weighted(1)).unwrap();
        g.create_edge(rel, ids[1], ids[2], weighted(1)).unwrap();
        g.create_edge(rel, ids[0], ids[2], weighted(5)).unwrap();
        g.commit().unwrap();
        (g, ids)
    }

    fn call(g: &Graph, body: super::super::ProcedureBody, args: &[Value]) -> Vec<Vec<Value>> {
        let mut ctx = ExecutionContext::new(GraphAccess::Read(g), HashMap::new(), MemoryBudget::unlimited());
        body(&mut ctx, args).unwrap()
    }

    fn node(id: NodeId) -> Value {
        Value::Node(NodeValue::reference(id))
    }

    #[test]
    fn test_weighted_shortest_path_prefers_cheaper_route() {
        let (g, ids) = chain();
        let config = Value::Map(vec![("weightProp".into(), Value::from("w"))]);
        let rows = call(&g, shortest_path, &[node(ids[0]), node(ids[2]), config]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::Float(2.0));
        match &rows[0][0] {
            Value::Path(p) => assert_eq!(p.len(), 2),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn test_max_len_limits_hops() {
        let (g, ids) = chain();
        let config = Value::Map(vec![
            ("weightProp".into(), Value::from("w")),
            ("maxLen".into(), Value::Integer(1)),
        ]);
        let rows = call(&g, shortest_path, &[node(ids[0]), node(ids[2]), config]);
        assert_eq!(rows[0][1], Value::Float(5.0));
    }

    #[test]
    fn test_unreachable_target_yields_nothing() {
        let (g, ids) = chain();
        let rows = call(&g, shortest_path, &[node(ids[2]), node(ids[0])]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_bfs_levels() {
        let (g, ids) = chain();
        let rows = call(&g, bfs, &[node(ids[0]), Value::Integer(1), Value::Null]);
        let reached = rows[0][0].as_list().unwrap();
        assert_eq!(reached.len(), 2);
        let rows = call(&g, bfs, &[node(ids[1]), Value::Integer(0), Value::from("R")]);
        assert_eq!(rows[0][0].as_list().unwrap(), &[node(ids[2])]);
    }

    #[test]
    fn test_page_rank_sums_to_one() {
        let (g, ids) = chain();
        let rows = call(&g, page_rank, &[Value::Null, Value::Null]);
        assert_eq!(rows.len(), 3);
        let total: f64 = rows.iter().filter_map(|r| r[1].as_f64()).sum();
        assert!((total - 1.0).abs() < 1e-3);
        // the sink collects the most rank
        let best = rows
            .iter()
            .max_by(|a, b| a[1].as_f64().unwrap().total_cmp(&b[1].as_f64().unwrap()))
            .unwrap();
        assert_eq!(best[0].as_node_id(), Some(ids[2]));
    }
}
