//! Render-ready elements in the `{"data": {...}}` shape graph widgets consume.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::graph::ProjectedNode;

/// Layout position reported back by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    pub label: String,
    pub description: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Element {
    Node {
        data: NodeData,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },
    Edge {
        data: EdgeData,
    },
}

impl Element {
    pub fn node(node: &ProjectedNode) -> Self {
        Element::Node {
            data: NodeData {
                id: node.id.clone(),
                label: node.label(),
                description: node.to_string(),
                node_type: node.node_type.clone(),
            },
            position: None,
        }
    }

    pub fn edge(source: &str, target: &str, label: &str) -> Self {
        Element::Edge {
            data: EdgeData {
                source: source.to_string(),
                target: target.to_string(),
                label: label.to_string(),
            },
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Element::Node { data, .. } => Some(&data.id),
            Element::Edge { .. } => None,
        }
    }

    pub fn node_type(&self) -> Option<&str> {
        match self {
            Element::Node { data, .. } => Some(&data.node_type),
            Element::Edge { .. } => None,
        }
    }

    pub fn endpoints(&self) -> Option<(&str, &str)> {
        match self {
            Element::Edge { data } => Some((&data.source, &data.target)),
            Element::Node { .. } => None,
        }
    }

    /// Identity used to compare view membership.
    pub fn key(&self) -> String {
        match self {
            Element::Node { data, .. } => format!("node:{}", data.id),
            Element::Edge { data } => format!("edge:{}->{}", data.source, data.target),
        }
    }
}

/// Drop nodes whose type is hidden and every edge touching them. Order and
/// positions of the surviving elements are kept as-is.
pub fn filter_by_type(hidden_types: &BTreeSet<String>, all: &[Element]) -> Vec<Element> {
    if hidden_types.is_empty() {
        return all.to_vec();
    }

    let removed: HashSet<&str> = all
        .iter()
        .filter_map(|e| match (e.node_id(), e.node_type()) {
            (Some(id), Some(t)) if hidden_types.contains(t) => Some(id),
            _ => None,
        })
        .collect();

    all.iter()
        .filter(|e| match e {
            Element::Node { data, .. } => !removed.contains(data.id.as_str()),
            Element::Edge { data } => {
                !removed.contains(data.source.as_str()) && !removed.contains(data.target.as_str())
            }
        })
        .cloned()
        .collect()
}

/// Membership of a view, for deciding whether a relayout is needed.
pub fn membership(elements: &[Element]) -> HashSet<String> {
    elements.iter().map(Element::key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: &str) -> Element {
        Element::Node {
            data: NodeData {
                id: id.to_string(),
                label: id.to_string(),
                description: String::new(),
                node_type: node_type.to_string(),
            },
            position: None,
        }
    }

    fn sample() -> Vec<Element> {
        vec![
            node("sub", "Substation"),
            node("vl", "VoltageLevel"),
            node("t1", "Terminal"),
            Element::edge("vl", "sub", "cim:VoltageLevel.Substation"),
            Element::edge("t1", "vl", "cim:Terminal.ConnectivityNode"),
        ]
    }

    #[test]
    fn test_empty_hide_set_is_identity() {
        let all = sample();
        assert_eq!(filter_by_type(&BTreeSet::new(), &all), all);
    }

    #[test]
    fn test_hiding_type_removes_nodes_and_touching_edges() {
        let all = sample();
        let hidden: BTreeSet<String> = ["VoltageLevel".to_string()].into_iter().collect();
        let filtered = filter_by_type(&hidden, &all);
        let keys: Vec<String> = filtered.iter().map(Element::key).collect();
        assert_eq!(keys, vec!["node:sub", "node:t1"]);
    }

    #[test]
    fn test_hiding_absent_type_changes_nothing() {
        let all = sample();
        let hidden: BTreeSet<String> = ["Breaker".to_string()].into_iter().collect();
        assert_eq!(filter_by_type(&hidden, &all), all);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Element::edge("a", "b", "rel")).unwrap();
        assert_eq!(json, serde_json::json!({"data": {"source": "a", "target": "b", "label": "rel"}}));

        let json = serde_json::to_value(node("a", "Breaker")).unwrap();
        assert_eq!(json["data"]["type"], "Breaker");
        assert!(json.get("position").is_none());
    }

    #[test]
    fn test_deserialize_both_variants() {
        let edge: Element = serde_json::from_str(r#"{"data":{"source":"a","target":"b","label":"r"}}"#).unwrap();
        assert_eq!(edge.endpoints(), Some(("a", "b")));
        let node: Element = serde_json::from_str(
            r#"{"data":{"id":"a","label":"A","description":"","type":"T"},"position":{"x":1.0,"y":2.0}}"#,
        )
        .unwrap();
        assert_eq!(node.node_id(), Some("a"));
    }
}
