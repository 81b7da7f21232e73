// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Full-text index procedures
//!
//! `createNodeIndex` takes either a label name or a configuration map
//! (`label`, `language`, `stopwords`) followed by the indexed fields. A
//! field is a property name or a map with `field` and optional `weight`.

use log::info;

use super::{string_argument, BuiltinProcedure};
use crate::exec::{ExecResult, ExecutionContext, ExecutionError};
use crate::functions::Arity;
use crate::storage::indexes::{FullTextConfig, FullTextField, IndexDefinition, IndexKind};
use crate::storage::{EntityKind, NodeValue, Value};

pub(crate) fn procedures() -> Vec<BuiltinProcedure> {
    vec![
        BuiltinProcedure::new(
            "db.idx.fulltext.createNodeIndex",
            Arity::at_least(2),
            &[],
            create_node_index,
        )
        .writing(),
        BuiltinProcedure::new(
            "db.idx.fulltext.queryNodes",
            Arity::exactly(2),
            &["node", "score"],
            query_nodes,
        ),
        BuiltinProcedure::new("db.idx.fulltext.drop", Arity::exactly(1), &[], drop_index).writing(),
    ]
}

fn expected_map(what: &str) -> ExecutionError {
    ExecutionError::Argument(format!("{} expected a map or a string", what))
}

fn parse_config(target: &Value) -> ExecResult<(String, FullTextConfig)> {
    let mut config = FullTextConfig::default();
    let label = match target {
        Value::String(label) => label.clone(),
        Value::Map(entries) => {
            let mut label = None;
            for (key, value) in entries {
                match key.as_str() {
                    "label" => label = Some(string_argument("createNodeIndex", value)?.to_string()),
                    "language" => {
                        config.language = string_argument("createNodeIndex", value)?.to_lowercase()
                    }
                    "stopwords" => {
                        let words = value.as_list().ok_or_else(|| {
                            ExecutionError::type_mismatch("List", value.type_name())
                        })?;
                        config.stopwords = Some(
                            words
                                .iter()
                                .map(|w| string_argument("createNodeIndex", w).map(str::to_lowercase))
                                .collect::<ExecResult<_>>()?,
                        );
                    }
                    other => {
                        return Err(ExecutionError::Argument(format!(
                            "Unknown full-text index option '{}'",
                            other
                        )))
                    }
                }
            }
            label.ok_or_else(|| ExecutionError::Argument("Label is missing".to_string()))?
        }
        _ => return Err(expected_map("Index configuration")),
    };
    Ok((label, config))
}

fn parse_field(value: &Value) -> ExecResult<FullTextField> {
    match value {
        Value::String(name) => Ok(FullTextField {
            name: name.clone(),
            weight: 1.0,
        }),
        Value::Map(_) => {
            let name = value
                .map_get("field")
                .ok_or_else(|| ExecutionError::Argument("Field is missing".to_string()))?;
            let weight = match value.map_get("weight") {
                None => 1.0,
                Some(w) => w
                    .as_f64()
                    .ok_or_else(|| ExecutionError::type_mismatch("Float", w.type_name()))?,
            };
            Ok(FullTextField {
                name: string_argument("createNodeIndex", name)?.to_string(),
                weight,
            })
        }
        _ => Err(expected_map("Field")),
    }
}

fn create_node_index(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let (label, mut config) = parse_config(&arguments[0])?;
    config.fields = arguments[1..]
        .iter()
        .map(parse_field)
        .collect::<ExecResult<_>>()?;
    let handle = ctx
        .graph_mut()?
        .create_index(IndexDefinition::fulltext(&label, config))?;
    info!(
        "full-text index created on {}",
        handle.definition().describe()
    );
    ctx.new_indexes.push(handle);
    ctx.stats.indices_created += 1;
    Ok(Vec::new())
}

fn query_nodes(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let label = string_argument("queryNodes", &arguments[0])?;
    let query = string_argument("queryNodes", &arguments[1])?;
    let index = ctx.graph().indexes().fulltext(label).ok_or_else(|| {
        ExecutionError::Argument(format!("There is no full-text index on label '{}'", label))
    })?;
    Ok(index
        .query(query)
        .into_iter()
        .map(|(id, score)| vec![Value::Node(NodeValue::reference(id)), Value::Float(score)])
        .collect())
}

fn drop_index(ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let label = string_argument("drop", &arguments[0])?.to_string();
    ctx.graph_mut()?
        .drop_index(IndexKind::FullText, EntityKind::Node, &label, &[])?;
    info!("full-text index on :{} dropped", label);
    ctx.stats.indices_deleted += 1;
    Ok(Vec::new())
}
