use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::session::{Element, Position};

/// Body of `/click` and `/goto`.
#[derive(Debug, Deserialize)]
pub struct NodeRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub hidden: BTreeSet<String>,
}

/// Body of `/positions`: node id to layout position.
pub type PositionsRequest = HashMap<String, Position>;

/// Full view returned after any state change.
#[derive(Debug, Clone, Serialize)]
pub struct ElementsResponse {
    pub elements: Vec<Element>,
    /// Every node type in the session, hidden ones included.
    pub types: BTreeSet<String>,
    pub hidden: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    pub truncated: bool,
    /// Renderer should lay out again; false when only data changed.
    pub relayout: bool,
}

/// Reply to a click.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClickResponse {
    Skipped { skipped: bool },
    Expanded {
        added: Vec<Element>,
        #[serde(flatten)]
        view: ElementsResponse,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
