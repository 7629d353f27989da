//! Triple store adapter: property lookup and one-hop neighbor queries keyed
//! by composite identifiers.
//!
//! Every query fans out over all file-qualified variants of the local id, so
//! facts spread across several source documents present as one entity.

pub mod cache;
pub mod loader;
mod memory;

pub use memory::{MemoryStore, QueryRows, Term, Triple, TripleSource};

use std::collections::BTreeMap;

use crate::ident::{CompositeId, FileRegistry};

/// Predicate carrying the entity's class.
pub const RDF_TYPE: &str = "rdf:type";

/// Result-count bounds for the three adapter queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub children: usize,
    pub parents: usize,
    pub properties: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            children: 1000,
            parents: 10000,
            properties: 1000,
        }
    }
}

/// Raw facts about one logical entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// The variant that carried the type, else the queried id.
    pub id: CompositeId,
    pub type_tag: Option<String>,
    pub properties: BTreeMap<String, String>,
    /// `(relation, target)` in store order; not deduplicated.
    pub children: Vec<(String, String)>,
    pub truncated: bool,
}

impl EntityRecord {
    pub fn new(id: CompositeId) -> Self {
        Self {
            id,
            type_tag: None,
            properties: BTreeMap::new(),
            children: Vec::new(),
            truncated: false,
        }
    }

    /// No facts at all were found for the entity.
    pub fn is_empty(&self) -> bool {
        self.type_tag.is_none() && self.properties.is_empty() && self.children.is_empty()
    }
}

/// `(relation, neighbor)` pairs from a one-hop query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub edges: Vec<(String, String)>,
    pub truncated: bool,
}

/// A loaded dataset: file registry plus the triple source it indexes.
#[derive(Debug, Clone)]
pub struct GraphStore<S = MemoryStore> {
    registry: FileRegistry,
    source: S,
    limits: QueryLimits,
}

impl<S: TripleSource> GraphStore<S> {
    pub fn new(registry: FileRegistry, source: S) -> Self {
        Self {
            registry,
            source,
            limits: QueryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    fn variant_keys(&self, local_id: &str) -> Vec<String> {
        self.registry
            .variants(local_id)
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    /// Union of every fact about `id`'s local part across all files.
    pub fn properties_of(&self, id: &CompositeId) -> EntityRecord {
        let keys = self.variant_keys(id.local_id());
        let rows = self.source.outgoing(&keys, self.limits.properties);

        let mut record = EntityRecord::new(id.clone());
        record.truncated = rows.truncated;
        for triple in rows.rows {
            let Triple { subject, predicate, object } = triple;
            if predicate == RDF_TYPE {
                if let Ok(typed) = CompositeId::parse(&subject) {
                    record.id = typed;
                }
                let tag = match object {
                    Term::Reference(tag) | Term::Literal(tag) => tag,
                };
                record.type_tag = Some(tag);
                continue;
            }
            match object {
                Term::Literal(value) => {
                    record.properties.insert(predicate, value);
                }
                Term::Reference(target) => record.children.push((predicate, target)),
            }
        }

        if record.truncated {
            log::warn!("Properties of {} truncated at {} facts", id, self.limits.properties);
        }
        record
    }

    /// Outgoing references of `id` (its child edges).
    pub fn one_hop_children(&self, id: &CompositeId) -> Neighbors {
        let keys = self.variant_keys(id.local_id());
        let rows = self.source.outgoing(&keys, self.limits.children);
        let edges = rows
            .rows
            .into_iter()
            .filter(|t| t.predicate != RDF_TYPE)
            .filter_map(|t| match t.object {
                Term::Reference(target) => Some((t.predicate, target)),
                Term::Literal(_) => None,
            })
            .collect();
        Neighbors {
            edges,
            truncated: rows.truncated,
        }
    }

    /// Subjects holding a reference to `id`.
    pub fn one_hop_parents(&self, id: &CompositeId) -> Neighbors {
        let keys = self.variant_keys(id.local_id());
        let rows = self.source.incoming(&keys, self.limits.parents);
        let edges = rows
            .rows
            .into_iter()
            .map(|t| (t.predicate, t.subject))
            .collect();
        Neighbors {
            edges,
            truncated: rows.truncated,
        }
    }

    /// First file-qualified variant of `local_id` that has facts.
    pub fn resolve_local(&self, local_id: &str) -> Option<CompositeId> {
        self.registry.variants(local_id).into_iter().find(|variant| {
            !self
                .source
                .outgoing(&[variant.to_string()], 1)
                .rows
                .is_empty()
        })
    }

    pub fn contains_entity(&self, id: &CompositeId) -> bool {
        self.resolve_local(id.local_id()).is_some()
    }
}
