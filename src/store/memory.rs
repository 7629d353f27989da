//! In-process triple source with subject and reference-object indexes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// Scalar literal value.
    Literal(String),
    /// Reference to another graph node (composite id, or compacted URI).
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn literal(subject: impl Into<String>, predicate: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: Term::Literal(value.into()),
        }
    }

    pub fn reference(subject: impl Into<String>, predicate: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: Term::Reference(target.into()),
        }
    }
}

/// Rows returned by one query, cut at the caller's limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub rows: Vec<Triple>,
    pub truncated: bool,
}

/// The graph-query primitive the adapter is built on.
///
/// Both queries are the equivalent of a `VALUES`-bound basic graph pattern:
/// `outgoing` matches `?s ?p ?o` for `?s` in `subjects`, `incoming` matches
/// `?o ?p ?s` for `?s` in `objects` (references only).
pub trait TripleSource {
    fn outgoing(&self, subjects: &[String], limit: usize) -> QueryRows;

    fn incoming(&self, objects: &[String], limit: usize) -> QueryRows;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Set semantics: inserting an existing triple is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Triple>", into = "Vec<Triple>")]
pub struct MemoryStore {
    triples: Vec<Triple>,
    by_subject: HashMap<String, Vec<usize>>,
    by_object: HashMap<String, Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the triple was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if let Some(positions) = self.by_subject.get(&triple.subject) {
            if positions.iter().any(|&pos| self.triples[pos] == triple) {
                return false;
            }
        }
        let pos = self.triples.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(pos);
        if let Term::Reference(target) = &triple.object {
            self.by_object.entry(target.clone()).or_default().push(pos);
        }
        self.triples.push(triple);
        true
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    fn collect(&self, index: &HashMap<String, Vec<usize>>, keys: &[String], limit: usize) -> QueryRows {
        let mut result = QueryRows::default();
        for key in keys {
            let Some(positions) = index.get(key) else {
                continue;
            };
            for &pos in positions {
                if result.rows.len() >= limit {
                    result.truncated = true;
                    return result;
                }
                result.rows.push(self.triples[pos].clone());
            }
        }
        result
    }
}

impl TripleSource for MemoryStore {
    fn outgoing(&self, subjects: &[String], limit: usize) -> QueryRows {
        self.collect(&self.by_subject, subjects, limit)
    }

    fn incoming(&self, objects: &[String], limit: usize) -> QueryRows {
        self.collect(&self.by_object, objects, limit)
    }

    fn len(&self) -> usize {
        self.triples.len()
    }
}

impl From<Vec<Triple>> for MemoryStore {
    fn from(triples: Vec<Triple>) -> Self {
        let mut store = MemoryStore::new();
        for triple in triples {
            store.insert(triple);
        }
        store
    }
}

impl From<MemoryStore> for Vec<Triple> {
    fn from(store: MemoryStore) -> Self {
        store.triples
    }
}
