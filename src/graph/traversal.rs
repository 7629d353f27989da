//! Bounded depth-first walks over the merged graph.

use std::collections::HashSet;

use crate::ident::{has_marker, CompositeId};
use crate::store::{GraphStore, Neighbors, TripleSource};

/// Which one-hop query a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Incoming references: who points at the node.
    Ascendants,
    /// Outgoing references: what the node points at.
    Descendants,
}

/// Identifiers discovered by one walk, seed excluded, in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traversal {
    pub ids: Vec<CompositeId>,
    /// A bound was hit; the result may be incomplete. Filling the visited
    /// set exactly also counts, even when nothing was left to explore.
    pub truncated: bool,
}

/// Call-scoped visited set. Keyed by local id so one logical entity reached
/// through several file prefixes is expanded once.
struct Visited {
    seen: HashSet<String>,
    order: Vec<CompositeId>,
    max: usize,
}

impl Visited {
    fn new(max: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: Vec::new(),
            max,
        }
    }

    fn contains(&self, id: &CompositeId) -> bool {
        self.seen.contains(id.local_id())
    }

    fn is_full(&self) -> bool {
        self.order.len() >= self.max
    }

    fn insert(&mut self, id: &CompositeId) {
        self.seen.insert(id.local_id().to_string());
        self.order.push(id.clone());
    }
}

pub fn ascendants<S: TripleSource>(
    store: &GraphStore<S>,
    seed: &CompositeId,
    depth: usize,
    max_visited: usize,
) -> Traversal {
    walk(store, seed, Direction::Ascendants, depth, max_visited)
}

pub fn descendants<S: TripleSource>(
    store: &GraphStore<S>,
    seed: &CompositeId,
    depth: usize,
    max_visited: usize,
) -> Traversal {
    walk(store, seed, Direction::Descendants, depth, max_visited)
}

/// Walk one direction from `seed`. The visited set (seed included) never
/// exceeds `max_visited`.
pub fn walk<S: TripleSource>(
    store: &GraphStore<S>,
    seed: &CompositeId,
    direction: Direction,
    depth: usize,
    max_visited: usize,
) -> Traversal {
    let mut visited = Visited::new(max_visited);
    let mut truncated = false;
    visit(store, seed, direction, depth, &mut visited, &mut truncated);

    log::debug!(
        "{:?} of {}: {} nodes visited (depth {}, max {})",
        direction,
        seed,
        visited.order.len(),
        depth,
        max_visited
    );
    Traversal {
        ids: visited.order.into_iter().skip(1).collect(),
        truncated,
    }
}

fn visit<S: TripleSource>(
    store: &GraphStore<S>,
    id: &CompositeId,
    direction: Direction,
    depth: usize,
    visited: &mut Visited,
    truncated: &mut bool,
) {
    if depth == 0 || visited.contains(id) || visited.is_full() {
        return;
    }
    visited.insert(id);

    let neighbors: Neighbors = match direction {
        Direction::Ascendants => store.one_hop_parents(id),
        Direction::Descendants => store.one_hop_children(id),
    };
    if neighbors.truncated {
        log::warn!("One-hop {:?} query of {} truncated", direction, id);
        *truncated = true;
    }

    for (_, raw) in neighbors.edges {
        if !has_marker(&raw) {
            continue;
        }
        let Ok(next) = CompositeId::parse(&raw) else {
            continue;
        };
        visit(store, &next, direction, depth - 1, visited, truncated);
        if visited.is_full() {
            log::warn!("Max nodes ({}) reached, results will be truncated", visited.max);
            *truncated = true;
            return;
        }
    }
}

/// Both directions from `seed`, each with its own visited set, merged with
/// the seed first and duplicates (by local id) removed.
pub fn neighborhood<S: TripleSource>(
    store: &GraphStore<S>,
    seed: &CompositeId,
    depth: usize,
    max_visited: usize,
) -> Traversal {
    let down = descendants(store, seed, depth, max_visited);
    let up = ascendants(store, seed, depth, max_visited);

    let mut seen = HashSet::new();
    let ids = std::iter::once(seed.clone())
        .chain(down.ids)
        .chain(up.ids)
        .filter(|id| seen.insert(id.local_id().to_string()))
        .collect();
    Traversal {
        ids,
        truncated: down.truncated || up.truncated,
    }
}
