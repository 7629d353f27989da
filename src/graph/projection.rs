//! Display-ready view of an [`EntityRecord`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::ident::FileRegistry;
use crate::store::{EntityRecord, RDF_TYPE};

/// Schema namespace stripped from type tags.
pub const SCHEMA_PREFIX: &str = "cim:";
/// Property holding the human readable name.
pub const NAME_KEY: &str = "cim:IdentifiedObject.name";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedNode {
    /// Local id, file prefix stripped.
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub file: String,
    pub properties: BTreeMap<String, String>,
    pub children: Vec<(String, String)>,
}

impl ProjectedNode {
    pub fn title(&self) -> String {
        format!("{} - {}", self.node_type, self.name)
    }

    pub fn label(&self) -> String {
        format!("{} [{}]", self.name, self.node_type)
    }
}

impl fmt::Display for ProjectedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (in {}):", self.id, self.file)?;
        writeln!(f, "- type = {}", self.node_type)?;
        writeln!(f, "- name = {}", self.name)?;
        if !self.properties.is_empty() {
            writeln!(f, "  Properties:")?;
            for (key, value) in &self.properties {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        if !self.children.is_empty() {
            writeln!(f, "  Children:")?;
            let mut children: Vec<_> = self.children.iter().collect();
            children.sort();
            for (relation, target) in children {
                writeln!(f, "    {}: {}", relation, target)?;
            }
        }
        Ok(())
    }
}

/// Pure projection; fails only when the record's prefix is unregistered.
pub fn project(record: &EntityRecord, registry: &FileRegistry) -> Result<ProjectedNode> {
    let file = registry.file_for(&record.id)?.to_string();

    let node_type = record
        .type_tag
        .as_deref()
        .map(|t| t.strip_prefix(SCHEMA_PREFIX).unwrap_or(t).to_string())
        .unwrap_or_default();
    let name = record
        .properties
        .get(NAME_KEY)
        .cloned()
        .unwrap_or_else(|| record.id.to_string());
    let properties = record
        .properties
        .iter()
        .filter(|(k, _)| k.as_str() != NAME_KEY && k.as_str() != RDF_TYPE)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ProjectedNode {
        id: record.id.local_id().to_string(),
        node_type,
        name,
        file,
        properties,
        children: record.children.clone(),
    })
}
