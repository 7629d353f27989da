//! Exploration session: the stateful side of the viewer.
//!
//! A session is seeded around one entity, then grows as nodes are clicked.
//! Each expansion only emits what the client does not already render, and
//! type filtering is recomputed from the authoritative element list without
//! touching it.

pub mod clicks;
pub mod elements;

pub use clicks::{should_trigger_expand, ClickTracker, InFlight, InFlightGuard, CLICK_WINDOW};
pub use elements::{filter_by_type, Element, Position};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{CimscopeError, Result};
use crate::graph::{neighborhood, project, ProjectedNode};
use crate::ident::{has_marker, CompositeId};
use crate::store::{GraphStore, MemoryStore, TripleSource};

/// Traversal bounds used by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExploreSettings {
    /// Depth of the initial seed walk.
    pub max_depth: usize,
    /// Visited budget of each direction.
    pub max_nodes_one_way: usize,
    /// Depth of a click expansion.
    pub expand_depth: usize,
}

impl Default for ExploreSettings {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_nodes_one_way: 1000,
            expand_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Seeded,
    /// Number of non-empty expansions merged since the last seed.
    Expanded(usize),
}

/// Elements produced by one seed or expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElementDelta {
    pub elements: Vec<Element>,
    pub truncated: bool,
}

impl ElementDelta {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// New displayed view after a filter change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewChange {
    pub elements: Vec<Element>,
    /// Membership changed, so the renderer has to lay out again.
    pub relayout: bool,
}

pub struct ExplorationSession<S = MemoryStore> {
    store: Arc<GraphStore<S>>,
    settings: ExploreSettings,
    state: SessionState,
    origin: Option<CompositeId>,
    current_seed: Option<CompositeId>,
    all: Vec<Element>,
    displayed: Vec<Element>,
    hidden_types: BTreeSet<String>,
}

impl<S: TripleSource> ExplorationSession<S> {
    pub fn new(store: Arc<GraphStore<S>>, settings: ExploreSettings) -> Self {
        Self {
            store,
            settings,
            state: SessionState::Empty,
            origin: None,
            current_seed: None,
            all: Vec::new(),
            displayed: Vec::new(),
            hidden_types: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &GraphStore<S> {
        &self.store
    }

    pub fn settings(&self) -> ExploreSettings {
        self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_seed(&self) -> Option<&CompositeId> {
        self.current_seed.as_ref()
    }

    /// Currently displayed view.
    pub fn elements(&self) -> &[Element] {
        &self.displayed
    }

    /// Every element rendered since the last seed, hidden or not.
    pub fn all_elements(&self) -> &[Element] {
        &self.all
    }

    pub fn hidden_types(&self) -> &BTreeSet<String> {
        &self.hidden_types
    }

    /// Node types present in the session, for filter toggles.
    pub fn types(&self) -> BTreeSet<String> {
        self.all
            .iter()
            .filter_map(Element::node_type)
            .map(str::to_string)
            .collect()
    }

    pub fn node_ids(&self) -> HashSet<String> {
        self.all
            .iter()
            .filter_map(Element::node_id)
            .map(str::to_string)
            .collect()
    }

    /// Replace the view with the bounded neighborhood of `id`.
    pub fn seed(&mut self, id: &CompositeId) -> Result<ElementDelta> {
        self.store.registry().file_for(id)?;
        if !self.store.contains_entity(id) {
            return Err(CimscopeError::UnresolvableSeed(id.to_string()));
        }

        let traversal = neighborhood(
            &self.store,
            id,
            self.settings.max_depth,
            self.settings.max_nodes_one_way,
        );
        log::info!(
            "Seeded {} with {} nodes{}",
            id,
            traversal.ids.len(),
            if traversal.truncated { " (truncated)" } else { "" }
        );

        let delta = ElementDelta {
            elements: self.assemble(&traversal.ids, &HashSet::new()),
            truncated: traversal.truncated,
        };

        self.all = delta.elements.clone();
        self.displayed = filter_by_type(&self.hidden_types, &self.all);
        self.state = SessionState::Seeded;
        self.current_seed = Some(id.clone());
        if self.origin.is_none() {
            self.origin = Some(id.clone());
        }
        Ok(delta)
    }

    /// Elements around `id` the client does not render yet. Nodes already in
    /// `already_present` are skipped; an edge is suppressed only when both
    /// of its endpoints are already present. Does not touch session state.
    pub fn expand(&self, id: &CompositeId, already_present: &HashSet<String>, depth: usize) -> ElementDelta {
        let traversal = neighborhood(&self.store, id, depth, self.settings.max_nodes_one_way);
        let elements = self.assemble(&traversal.ids, already_present);
        log::info!(
            "Expanded {}: {} nodes reached, {} new elements",
            id,
            traversal.ids.len(),
            elements.len()
        );
        ElementDelta {
            elements,
            truncated: traversal.truncated,
        }
    }

    /// Prepend an expansion onto the session and refresh the displayed view.
    pub fn merge(&mut self, delta: &ElementDelta) {
        if delta.is_empty() {
            return;
        }
        let mut merged = delta.elements.clone();
        merged.append(&mut self.all);
        self.all = merged;
        self.displayed = filter_by_type(&self.hidden_types, &self.all);
        self.state = match self.state {
            SessionState::Expanded(n) => SessionState::Expanded(n + 1),
            _ => SessionState::Expanded(1),
        };
    }

    /// Click path: expand from a rendered node and merge the result.
    pub fn expand_node(&mut self, local_id: &str) -> Result<ElementDelta> {
        if self.state == SessionState::Empty {
            return Err(CimscopeError::InvalidInput("session has not been seeded".to_string()));
        }
        let id = self.resolve_local(local_id)?;
        let delta = self.expand(&id, &self.node_ids(), self.settings.expand_depth);
        self.merge(&delta);
        Ok(delta)
    }

    /// Re-seed from user input: a composite id or a bare local id. On failure
    /// the current view is left untouched.
    pub fn go_to(&mut self, raw: &str) -> Result<ElementDelta> {
        let raw = raw.trim();
        let id = if has_marker(raw) {
            self.store.registry().decode(raw)?
        } else {
            self.store
                .resolve_local(raw)
                .ok_or_else(|| CimscopeError::UnresolvableSeed(raw.to_string()))?
        };
        self.seed(&id)
    }

    /// Back to the first seed of the session.
    pub fn reset(&mut self) -> Result<ElementDelta> {
        let origin = self
            .origin
            .clone()
            .ok_or_else(|| CimscopeError::InvalidInput("session has not been seeded".to_string()))?;
        self.seed(&origin)
    }

    pub fn set_hidden_types(&mut self, hidden_types: BTreeSet<String>) -> ViewChange {
        let filtered = filter_by_type(&hidden_types, &self.all);
        let relayout = elements::membership(&filtered) != elements::membership(&self.displayed);
        self.hidden_types = hidden_types;
        self.displayed = filtered.clone();
        ViewChange {
            elements: filtered,
            relayout,
        }
    }

    pub fn toggle_type(&mut self, node_type: &str) -> ViewChange {
        let mut hidden = self.hidden_types.clone();
        if !hidden.remove(node_type) {
            hidden.insert(node_type.to_string());
        }
        self.set_hidden_types(hidden)
    }

    /// Keep renderer positions so later refilters do not reset the layout.
    pub fn record_positions(&mut self, positions: &HashMap<String, Position>) {
        for element in self.all.iter_mut().chain(self.displayed.iter_mut()) {
            if let Element::Node { data, position } = element {
                if let Some(p) = positions.get(&data.id) {
                    *position = Some(*p);
                }
            }
        }
    }

    pub fn node_details(&self, local_id: &str) -> Result<ProjectedNode> {
        let id = self
            .store
            .resolve_local(local_id)
            .ok_or_else(|| CimscopeError::UnresolvableSeed(local_id.to_string()))?;
        project(&self.store.properties_of(&id), self.store.registry())
    }

    /// Rendered nodes may only be known as reference targets, so fall back to
    /// the first variant when no file holds facts about them.
    fn resolve_local(&self, local_id: &str) -> Result<CompositeId> {
        self.store
            .resolve_local(local_id)
            .or_else(|| self.store.registry().variants(local_id).into_iter().next())
            .ok_or_else(|| CimscopeError::UnresolvableSeed(local_id.to_string()))
    }

    /// Project `ids` into nodes and the edges between nodes in scope, where
    /// scope is `ids` plus `present`. An edge is emitted unless both of its
    /// endpoints are in `present`.
    fn assemble(&self, ids: &[CompositeId], present: &HashSet<String>) -> Vec<Element> {
        let registry = self.store.registry();
        let projected: Vec<(&CompositeId, ProjectedNode)> = ids
            .iter()
            .filter_map(|id| match project(&self.store.properties_of(id), registry) {
                Ok(node) => Some((id, node)),
                Err(e) => {
                    log::warn!("Skipping {}: {}", id, e);
                    None
                }
            })
            .collect();

        let mut in_scope: HashSet<&str> = present.iter().map(String::as_str).collect();
        in_scope.extend(projected.iter().map(|(_, n)| n.id.as_str()));

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut emitted_nodes = HashSet::new();
        let mut emitted_edges = HashSet::new();
        let mut push_edge = |source: &str, target: &str, relation: &str| {
            if present.contains(source) && present.contains(target) {
                return;
            }
            if emitted_edges.insert((source.to_string(), target.to_string())) {
                edges.push(Element::edge(source, target, relation));
            }
        };

        for (id, node) in &projected {
            let source = node.id.as_str();
            for (relation, target) in &node.children {
                let Ok(target) = CompositeId::parse(target) else {
                    continue;
                };
                if in_scope.contains(target.local_id()) {
                    push_edge(source, target.local_id(), relation);
                }
            }

            if present.contains(source) || !emitted_nodes.insert(source) {
                continue;
            }
            nodes.push(Element::node(node));

            // Present nodes outside this traversal may still point at a new one.
            if !present.is_empty() {
                for (relation, parent) in self.store.one_hop_parents(id).edges {
                    let Ok(parent) = CompositeId::parse(&parent) else {
                        continue;
                    };
                    if present.contains(parent.local_id()) {
                        push_edge(parent.local_id(), source, &relation);
                    }
                }
            }
        }
        nodes.extend(edges);
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::FileRegistry;
    use crate::store::{Triple, RDF_TYPE};

    const NAME: &str = "cim:IdentifiedObject.name";

    /// sub <- vl <- bay <- brk ; vl also in SSH.xml.
    fn store() -> Arc<GraphStore> {
        let mut registry = FileRegistry::new();
        registry.prefix_for("EQ.xml");
        registry.prefix_for("SSH.xml");
        let source = MemoryStore::from(vec![
            Triple::reference("NSFILE_0:sub", RDF_TYPE, "cim:Substation"),
            Triple::literal("NSFILE_0:sub", NAME, "Sub"),
            Triple::reference("NSFILE_0:vl", RDF_TYPE, "cim:VoltageLevel"),
            Triple::literal("NSFILE_0:vl", NAME, "VL"),
            Triple::reference("NSFILE_0:vl", "cim:VoltageLevel.Substation", "NSFILE_0:sub"),
            Triple::literal("NSFILE_1:vl", "cim:VoltageLevel.highVoltageLimit", "420"),
            Triple::reference("NSFILE_0:bay", RDF_TYPE, "cim:Bay"),
            Triple::reference("NSFILE_0:bay", "cim:Bay.VoltageLevel", "NSFILE_0:vl"),
            Triple::reference("NSFILE_0:brk", RDF_TYPE, "cim:Breaker"),
            Triple::reference("NSFILE_0:brk", "cim:Equipment.EquipmentContainer", "NSFILE_0:bay"),
        ]);
        Arc::new(GraphStore::new(registry, source))
    }

    fn session() -> ExplorationSession {
        ExplorationSession::new(store(), ExploreSettings::default())
    }

    fn node_ids(elements: &[Element]) -> Vec<&str> {
        elements.iter().filter_map(Element::node_id).collect()
    }

    fn edges(elements: &[Element]) -> Vec<(&str, &str)> {
        elements.iter().filter_map(Element::endpoints).collect()
    }

    #[test]
    fn test_seed_emits_neighborhood() {
        let mut session = session();
        let delta = session.seed(&CompositeId::new("0", "vl")).unwrap();
        let ids = node_ids(&delta.elements);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], "vl");
        assert_eq!(edges(&delta.elements).len(), 3);
        assert_eq!(session.state(), SessionState::Seeded);
        assert_eq!(session.elements(), delta.elements.as_slice());
    }

    #[test]
    fn test_seed_merges_properties_across_files() {
        let mut session = session();
        session.seed(&CompositeId::new("1", "vl")).unwrap();
        let details = session.node_details("vl").unwrap();
        assert_eq!(details.name, "VL");
        assert_eq!(details.file, "EQ.xml");
        assert!(details.properties.contains_key("cim:VoltageLevel.highVoltageLimit"));
    }

    #[test]
    fn test_seed_bounded_budget_drops_dangling_edges() {
        let mut session = ExplorationSession::new(
            store(),
            ExploreSettings {
                max_depth: 1000,
                max_nodes_one_way: 2,
                expand_depth: 2,
            },
        );
        let delta = session.seed(&CompositeId::new("0", "brk")).unwrap();
        assert!(delta.truncated);
        assert_eq!(node_ids(&delta.elements), vec!["brk", "bay"]);
        // bay -> vl is out of scope.
        assert_eq!(edges(&delta.elements), vec![("brk", "bay")]);
    }

    #[test]
    fn test_expand_skips_present_nodes_and_edges() {
        let mut session = ExplorationSession::new(
            store(),
            ExploreSettings {
                max_depth: 2,
                ..ExploreSettings::default()
            },
        );
        session.seed(&CompositeId::new("0", "sub")).unwrap();
        assert_eq!(node_ids(session.elements()), vec!["sub", "vl"]);

        let delta = session.expand_node("vl").unwrap();
        assert_eq!(node_ids(&delta.elements), vec!["bay"]);
        assert_eq!(edges(&delta.elements), vec![("bay", "vl")]);
        assert_eq!(session.state(), SessionState::Expanded(1));

        // Prepended onto the existing view.
        assert_eq!(node_ids(session.all_elements()), vec!["bay", "sub", "vl"]);
    }

    #[test]
    fn test_expand_with_everything_present_is_empty() {
        let session = session();
        let present: HashSet<String> = ["sub", "vl"].iter().map(|s| s.to_string()).collect();
        let delta = session.expand(&CompositeId::new("0", "sub"), &present, 2);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_expand_links_new_node_to_present_parent() {
        let mut registry = FileRegistry::new();
        registry.prefix_for("EQ.xml");
        let source = MemoryStore::from(vec![
            Triple::reference("NSFILE_0:c", RDF_TYPE, "cim:Bay"),
            Triple::reference("NSFILE_0:p", RDF_TYPE, "cim:Bay"),
            Triple::reference("NSFILE_0:n", RDF_TYPE, "cim:Breaker"),
            Triple::reference("NSFILE_0:c", "cim:rel", "NSFILE_0:n"),
            Triple::reference("NSFILE_0:p", "cim:rel", "NSFILE_0:n"),
        ]);
        let session = ExplorationSession::new(
            Arc::new(GraphStore::new(registry, source)),
            ExploreSettings::default(),
        );
        let present: HashSet<String> = ["c", "p"].iter().map(|s| s.to_string()).collect();

        let delta = session.expand(&CompositeId::new("0", "c"), &present, 2);
        assert_eq!(node_ids(&delta.elements), vec!["n"]);
        let mut found = edges(&delta.elements);
        found.sort();
        assert_eq!(found, vec![("c", "n"), ("p", "n")]);
    }

    #[test]
    fn test_empty_expansion_keeps_state() {
        let mut session = session();
        session.seed(&CompositeId::new("0", "vl")).unwrap();
        let before = session.all_elements().to_vec();
        let delta = session.expand_node("sub").unwrap();
        assert!(delta.is_empty());
        assert_eq!(session.state(), SessionState::Seeded);
        assert_eq!(session.all_elements(), before.as_slice());
    }

    #[test]
    fn test_expand_before_seed_rejected() {
        let mut session = session();
        assert!(matches!(session.expand_node("vl"), Err(CimscopeError::InvalidInput(_))));
    }

    #[test]
    fn test_go_to_failures_keep_view() {
        let mut session = session();
        session.seed(&CompositeId::new("0", "vl")).unwrap();
        let before = session.elements().to_vec();

        assert!(matches!(session.go_to("garbage"), Err(CimscopeError::UnresolvableSeed(_))));
        assert!(matches!(session.go_to("NSFILE_99:foo"), Err(CimscopeError::UnknownPrefix(_))));
        assert!(matches!(session.go_to("NSFILE_0:nothing"), Err(CimscopeError::UnresolvableSeed(_))));
        assert_eq!(session.elements(), before.as_slice());
        assert_eq!(session.current_seed(), Some(&CompositeId::new("0", "vl")));
    }

    #[test]
    fn test_seed_with_unregistered_prefix_rejected() {
        let mut session = session();
        let err = session.seed(&CompositeId::new("99", "vl")).unwrap_err();
        assert!(matches!(err, CimscopeError::UnknownPrefix(_)));
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.current_seed().is_none());
    }

    #[test]
    fn test_go_to_and_reset() {
        let mut session = session();
        session.seed(&CompositeId::new("0", "sub")).unwrap();
        session.go_to(" brk ").unwrap();
        assert_eq!(session.current_seed(), Some(&CompositeId::new("0", "brk")));
        session.reset().unwrap();
        assert_eq!(session.current_seed(), Some(&CompositeId::new("0", "sub")));
    }

    #[test]
    fn test_hidden_types_survive_expansion() {
        let mut session = session();
        session.seed(&CompositeId::new("0", "sub")).unwrap();
        let change = session.toggle_type("Bay");
        assert!(change.relayout);
        assert!(!node_ids(&change.elements).contains(&"bay"));
        assert!(session.all_elements().iter().any(|e| e.node_id() == Some("bay")));
        assert!(session.types().contains("Bay"));

        let change = session.toggle_type("Transformer");
        assert!(!change.relayout);

        let change = session.set_hidden_types(BTreeSet::new());
        assert!(change.relayout);
        assert_eq!(change.elements, session.all_elements());
    }

    #[test]
    fn test_positions_kept_across_filters() {
        let mut session = session();
        session.seed(&CompositeId::new("0", "sub")).unwrap();
        let mut positions = HashMap::new();
        positions.insert("sub".to_string(), Position { x: 10.0, y: 20.0 });
        session.record_positions(&positions);

        session.toggle_type("Breaker");
        let sub = session
            .elements()
            .iter()
            .find(|e| e.node_id() == Some("sub"))
            .unwrap();
        assert!(matches!(sub, Element::Node { position: Some(p), .. } if p.x == 10.0));
    }
}
