// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Schema introspection procedures

use super::BuiltinProcedure;
use crate::exec::{ExecResult, ExecutionContext};
use crate::functions::Arity;
use crate::storage::indexes::{IndexHandle, IndexStatus};
use crate::storage::{EntityKind, Value};

pub(crate) fn procedures() -> Vec<BuiltinProcedure> {
    vec![
        BuiltinProcedure::new("db.labels", Arity::exactly(0), &["label"], labels),
        BuiltinProcedure::new(
            "db.relationshipTypes",
            Arity::exactly(0),
            &["relationshipType"],
            relationship_types,
        ),
        BuiltinProcedure::new("db.propertyKeys", Arity::exactly(0), &["propertyKey"], property_keys),
        BuiltinProcedure::new(
            "db.indexes",
            Arity::exactly(0),
            &["label", "properties", "types", "language", "stopwords", "entitytype", "status"],
            indexes,
        ),
        BuiltinProcedure::new(
            "db.constraints",
            Arity::exactly(0),
            &["type", "label", "properties", "entitytype", "status"],
            constraints,
        ),
    ]
}

fn single_column(names: &[String]) -> Vec<Vec<Value>> {
    names.iter().map(|n| vec![Value::from(n.as_str())]).collect()
}

fn labels(ctx: &mut ExecutionContext<'_>, _: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    Ok(single_column(ctx.graph().schema().labels()))
}

fn relationship_types(ctx: &mut ExecutionContext<'_>, _: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    Ok(single_column(ctx.graph().schema().relations()))
}

fn property_keys(ctx: &mut ExecutionContext<'_>, _: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    Ok(single_column(ctx.graph().schema().attributes()))
}

/// Indexes of one label or relation type, merged into a single row
struct IndexRow {
    entity: EntityKind,
    label: String,
    properties: Vec<String>,
    types: Vec<(String, Vec<Value>)>,
    language: Value,
    stopwords: Value,
    operational: bool,
}

impl IndexRow {
    fn absorb(&mut self, handle: &IndexHandle) {
        let def = handle.definition();
        for property in &def.properties {
            if !self.properties.contains(property) {
                self.properties.push(property.clone());
            }
            let kind = Value::from(def.kind.as_str());
            match self.types.iter_mut().find(|(p, _)| p == property) {
                Some((_, kinds)) => kinds.push(kind),
                None => self.types.push((property.clone(), vec![kind])),
            }
        }
        if let IndexHandle::FullText(idx) = handle {
            if let Some(config) = &def.fulltext {
                self.language = Value::from(config.language.as_str());
            }
            self.stopwords = Value::from(idx.stopwords());
        }
        self.operational &= handle.state().status() == IndexStatus::Operational;
    }

    fn into_row(self) -> Vec<Value> {
        vec![
            Value::from(self.label),
            Value::from(self.properties),
            Value::Map(
                self.types
                    .into_iter()
                    .map(|(p, kinds)| (p, Value::List(kinds)))
                    .collect(),
            ),
            self.language,
            self.stopwords,
            Value::from(self.entity.as_str()),
            Value::from(
                if self.operational {
                    IndexStatus::Operational
                } else {
                    IndexStatus::UnderConstruction
                }
                .to_string(),
            ),
        ]
    }
}

fn indexes(ctx: &mut ExecutionContext<'_>, _: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    let mut rows: Vec<IndexRow> = Vec::new();
    for handle in ctx.graph().indexes().handles() {
        let def = handle.definition();
        let position = rows
            .iter()
            .position(|r| r.entity == def.entity && r.label == def.label);
        let row = match position {
            Some(i) => &mut rows[i],
            None => {
                rows.push(IndexRow {
                    entity: def.entity,
                    label: def.label.clone(),
                    properties: Vec::new(),
                    types: Vec::new(),
                    language: Value::Null,
                    stopwords: Value::Null,
                    operational: true,
                });
                let last = rows.len() - 1;
                &mut rows[last]
            }
        };
        row.absorb(&handle);
    }
    Ok(rows.into_iter().map(IndexRow::into_row).collect())
}

fn constraints(ctx: &mut ExecutionContext<'_>, _: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
    Ok(ctx
        .graph()
        .constraints()
        .iter()
        .map(|c| {
            let def = &c.definition;
            vec![
                Value::from(def.kind.as_str()),
                Value::from(def.label.as_str()),
                Value::from(def.properties.clone()),
                Value::from(def.entity.as_str()),
                Value::from(c.status.to_string()),
            ]
        })
        .collect())
}
