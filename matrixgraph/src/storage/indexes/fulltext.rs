// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Full-text index
//!
//! Inverted index from analyzed terms to weighted term frequencies per node.
//! The analyzer lowercases, splits on non-alphanumeric characters and drops
//! stopwords. Query syntax:
//!
//! - `a b`   both terms (AND)
//! - `a|b`   either term (OR)
//! - `ab*`   any term starting with `ab`
//!
//! Matches are scored with a TF-IDF sum and returned best first.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::types::{FullTextConfig, IndexDefinition, IndexState};
use crate::storage::types::{AttributeId, LabelId, PropertyMap};
use crate::storage::value::Value;

static ENGLISH_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "is", "the", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in",
        "into", "it", "no", "not", "of", "on", "or", "such", "that", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Default)]
struct Postings {
    terms: BTreeMap<String, HashMap<u64, f64>>,
    documents: HashMap<u64, Vec<String>>,
}

#[derive(Debug)]
pub struct FullTextIndex {
    definition: IndexDefinition,
    label_id: LabelId,
    fields: Vec<(AttributeId, f64)>,
    stopwords: HashSet<String>,
    state: IndexState,
    postings: RwLock<Postings>,
}

impl FullTextIndex {
    pub fn new(definition: IndexDefinition, label_id: LabelId, attributes: Vec<AttributeId>) -> Self {
        let config = definition.fulltext.clone().unwrap_or_default();
        let fields = attributes
            .into_iter()
            .zip(config.fields.iter().map(|f| f.weight))
            .collect();
        Self {
            stopwords: stopwords_for(&config),
            definition,
            label_id,
            fields,
            state: IndexState::default(),
            postings: RwLock::new(Postings::default()),
        }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn label_id(&self) -> LabelId {
        self.label_id
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn covers(&self, attr: AttributeId) -> bool {
        self.fields.iter().any(|(a, _)| *a == attr)
    }

    pub fn stopwords(&self) -> Vec<String> {
        let mut words: Vec<String> = self.stopwords.iter().cloned().collect();
        words.sort();
        words
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !self.stopwords.contains(t))
            .collect()
    }

    /// (Re)index a node from its current properties.
    pub fn index_entity(&self, id: u64, properties: &PropertyMap) {
        let mut weighted: HashMap<String, f64> = HashMap::new();
        for (attr, weight) in &self.fields {
            if let Some(Value::String(text)) = properties.get(*attr) {
                for term in self.analyze(text) {
                    *weighted.entry(term).or_insert(0.0) += weight;
                }
            }
        }
        let mut postings = self.postings.write();
        remove_document(&mut postings, id);
        if weighted.is_empty() {
            return;
        }
        let terms: Vec<String> = weighted.keys().cloned().collect();
        for (term, tf) in weighted {
            postings.terms.entry(term).or_default().insert(id, tf);
        }
        postings.documents.insert(id, terms);
    }

    pub fn remove_entity(&self, id: u64) {
        remove_document(&mut self.postings.write(), id);
    }

    pub fn document_count(&self) -> usize {
        self.postings.read().documents.len()
    }

    /// Matching node ids with scores, best first (ties by id).
    pub fn query(&self, query: &str) -> Vec<(u64, f64)> {
        let postings = self.postings.read();
        let total = postings.documents.len().max(1) as f64;
        let mut result: Option<HashMap<u64, f64>> = None;

        for clause in query.split_whitespace() {
            let mut clause_hits: HashMap<u64, f64> = HashMap::new();
            for alternative in clause.split('|').filter(|a| !a.is_empty()) {
                let (stem, prefix) = match alternative.strip_suffix('*') {
                    Some(stem) => (stem, true),
                    None => (alternative, false),
                };
                let normalized = stem.to_lowercase();
                if normalized.is_empty() || (!prefix && self.stopwords.contains(&normalized)) {
                    continue;
                }
                let matching: Vec<&HashMap<u64, f64>> = if prefix {
                    postings
                        .terms
                        .range(normalized.clone()..)
                        .take_while(|(t, _)| t.starts_with(&normalized))
                        .map(|(_, docs)| docs)
                        .collect()
                } else {
                    postings.terms.get(&normalized).into_iter().collect()
                };
                for docs in matching {
                    let idf = (1.0 + total / docs.len() as f64).ln();
                    for (doc, tf) in docs {
                        *clause_hits.entry(*doc).or_insert(0.0) += tf * idf;
                    }
                }
            }
            result = Some(match result {
                None => clause_hits,
                Some(acc) => acc
                    .into_iter()
                    .filter_map(|(doc, score)| clause_hits.get(&doc).map(|s| (doc, score + s)))
                    .collect(),
            });
        }

        let mut hits: Vec<(u64, f64)> = result.unwrap_or_default().into_iter().collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits
    }
}

fn remove_document(postings: &mut Postings, id: u64) {
    if let Some(terms) = postings.documents.remove(&id) {
        for term in terms {
            if let Some(docs) = postings.terms.get_mut(&term) {
                docs.remove(&id);
                if docs.is_empty() {
                    postings.terms.remove(&term);
                }
            }
        }
    }
}

fn stopwords_for(config: &FullTextConfig) -> HashSet<String> {
    match &config.stopwords {
        Some(words) => words.iter().map(|w| w.to_lowercase()).collect(),
        None if config.language.eq_ignore_ascii_case("english") => {
            ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect()
        }
        None => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::indexes::types::FullTextField;

    fn index(stopwords: Option<Vec<String>>) -> FullTextIndex {
        let config = FullTextConfig {
            language: "english".into(),
            stopwords,
            fields: vec![FullTextField {
                name: "title".into(),
                weight: 1.0,
            }],
        };
        FullTextIndex::new(IndexDefinition::fulltext("Movie", config), 0, vec![3])
    }

    fn doc(text: &str) -> PropertyMap {
        let mut p = PropertyMap::new();
        p.set(3, Value::String(text.into()));
        p
    }

    #[test]
    fn test_and_or_prefix_queries() {
        let idx = index(None);
        idx.index_entity(1, &doc("The Matrix Reloaded"));
        idx.index_entity(2, &doc("The Matrix"));
        idx.index_entity(3, &doc("Jurassic Park"));

        let ids = |q: &str| -> Vec<u64> {
            let mut v: Vec<u64> = idx.query(q).into_iter().map(|(id, _)| id).collect();
            v.sort();
            v
        };
        assert_eq!(ids("matrix"), vec![1, 2]);
        assert_eq!(ids("matrix reloaded"), vec![1]);
        assert_eq!(ids("park|reloaded"), vec![1, 3]);
        assert_eq!(ids("jura*"), vec![3]);
        assert!(ids("the").is_empty());
    }

    #[test]
    fn test_custom_stopwords_replace_language_list() {
        let idx = index(Some(vec!["matrix".into()]));
        idx.index_entity(1, &doc("The Matrix"));
        assert!(idx.query("matrix").is_empty());
        assert_eq!(idx.query("the").len(), 1);
    }

    #[test]
    fn test_reindex_replaces_terms() {
        let idx = index(None);
        idx.index_entity(1, &doc("alpha"));
        idx.index_entity(1, &doc("beta"));
        assert!(idx.query("alpha").is_empty());
        assert_eq!(idx.query("beta").len(), 1);
        idx.remove_entity(1);
        assert_eq!(idx.document_count(), 0);
    }
}
