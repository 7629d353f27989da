//! End-to-end exploration over RDF/XML fixtures written to a temp dir.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use cimscope::store::cache::{load_or_parse, SnapshotCache};
use cimscope::store::loader::load_folder;
use cimscope::session::{Element, SessionState};
use cimscope::{CimscopeError, ExplorationSession, ExploreSettings, FileRegistry};
use tempfile::TempDir;

const A_XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:cim="http://iec.ch/TC57/2013/CIM-schema-cim16#">
  <T rdf:ID="x1">
    <cim:IdentifiedObject.name>Bus1</cim:IdentifiedObject.name>
    <conn rdf:resource="#x2"/>
  </T>
</rdf:RDF>"##;

const B_XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:cim="http://iec.ch/TC57/2013/CIM-schema-cim16#">
  <U rdf:ID="x2">
    <cim:IdentifiedObject.name>Bus2</cim:IdentifiedObject.name>
  </U>
</rdf:RDF>"##;

fn dataset() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("A.xml"), A_XML).unwrap();
    fs::write(temp_dir.path().join("B.xml"), B_XML).unwrap();
    temp_dir
}

fn session(dir: &TempDir) -> ExplorationSession {
    let store = load_folder(dir.path()).unwrap();
    ExplorationSession::new(Arc::new(store), ExploreSettings::default())
}

fn node<'a>(elements: &'a [Element], id: &str) -> &'a Element {
    elements
        .iter()
        .find(|e| e.node_id() == Some(id))
        .unwrap_or_else(|| panic!("no node {}", id))
}

#[test]
fn seed_spans_both_files() {
    let dir = dataset();
    let mut session = session(&dir);
    let mut registry = session.store().registry().clone();
    let seed = registry.encode("A.xml", "x1");

    let delta = session.seed(&seed).unwrap();
    let nodes: Vec<&str> = delta.elements.iter().filter_map(Element::node_id).collect();
    assert_eq!(nodes, vec!["x1", "x2"]);

    match node(&delta.elements, "x1") {
        Element::Node { data, .. } => {
            assert_eq!(data.label, "Bus1 [T]");
            assert_eq!(data.node_type, "T");
        }
        other => panic!("expected node, got {:?}", other),
    }
    match node(&delta.elements, "x2") {
        Element::Node { data, .. } => {
            assert_eq!(data.label, "Bus2 [U]");
            assert!(data.description.contains("(in B.xml)"));
        }
        other => panic!("expected node, got {:?}", other),
    }

    let edges: Vec<&Element> = delta.elements.iter().filter(|e| e.endpoints().is_some()).collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0], &Element::edge("x1", "x2", "conn"));
    assert!(!delta.truncated);
}

#[test]
fn expand_with_everything_present_is_empty() {
    let dir = dataset();
    let session = session(&dir);
    let present: HashSet<String> = ["x1", "x2"].iter().map(|s| s.to_string()).collect();
    let delta = session.expand(&cimscope::CompositeId::new("0", "x2"), &present, 2);
    assert!(delta.elements.is_empty());
}

#[test]
fn click_on_leaf_keeps_view() {
    let dir = dataset();
    let mut session = session(&dir);
    session.go_to("x1").unwrap();
    let before = session.elements().to_vec();

    let delta = session.expand_node("x2").unwrap();
    assert!(delta.is_empty());
    assert_eq!(session.elements(), before.as_slice());
    assert_eq!(session.state(), SessionState::Seeded);
}

#[test]
fn decoding_errors() {
    let dir = dataset();
    let session = session(&dir);
    let registry: &FileRegistry = session.store().registry();
    assert!(matches!(registry.decode("garbage"), Err(CimscopeError::MalformedIdentifier(_))));
    assert!(matches!(registry.decode("NSFILE_99:foo"), Err(CimscopeError::UnknownPrefix(_))));
}

#[test]
fn snapshot_restores_same_exploration() {
    let dir = dataset();
    let cache_dir = TempDir::new().unwrap();
    let cache = SnapshotCache::new(cache_dir.path());

    let fresh = load_or_parse(dir.path(), "scenario", Some(&cache)).unwrap();
    assert!(cache.path_for("scenario").exists());
    let restored = load_or_parse(dir.path(), "scenario", Some(&cache)).unwrap();
    assert_eq!(fresh.registry(), restored.registry());

    let seed = cimscope::CompositeId::new("0", "x1");
    let mut a = ExplorationSession::new(Arc::new(fresh), ExploreSettings::default());
    let mut b = ExplorationSession::new(Arc::new(restored), ExploreSettings::default());
    assert_eq!(a.seed(&seed).unwrap(), b.seed(&seed).unwrap());
}
