//! Composite identifiers: a per-file prefix plus the document-local id.
//!
//! The same local id (e.g. `_17086487-56ba`) can appear in several CGMES
//! documents. Qualifying it with a short per-file prefix keeps each physical
//! node distinct while the local part still names the logical entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CimscopeError, Result};

/// Marker every composite identifier starts with.
pub const FILE_NS: &str = "NSFILE_";

/// `(prefix, local_id)`, serialized as `NSFILE_<prefix>:<local_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeId {
    prefix: String,
    local_id: String,
}

impl CompositeId {
    pub fn new(prefix: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            local_id: local_id.into(),
        }
    }

    /// Syntactic decode. Does not check that the prefix is registered;
    /// use [`FileRegistry::decode`] for that.
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix(FILE_NS)
            .ok_or_else(|| CimscopeError::MalformedIdentifier(raw.to_string()))?;
        let (prefix, local_id) = rest
            .split_once(':')
            .ok_or_else(|| CimscopeError::MalformedIdentifier(raw.to_string()))?;
        if prefix.is_empty() || local_id.is_empty() {
            return Err(CimscopeError::MalformedIdentifier(raw.to_string()));
        }
        Ok(Self::new(prefix, local_id))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", FILE_NS, self.prefix, self.local_id)
    }
}

impl std::str::FromStr for CompositeId {
    type Err = CimscopeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// True when `raw` points into the known graph namespace.
pub fn has_marker(raw: &str) -> bool {
    raw.starts_with(FILE_NS) && raw.contains(':')
}

/// One registered source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePrefix {
    pub filename: String,
    pub prefix: String,
    /// `file://...#` namespace the loader bound for this file, already escaped.
    pub namespace: Option<String>,
}

/// Filename <-> prefix bijection owned by one store.
///
/// Prefixes are allocated lazily in first-seen order and never reassigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRegistry {
    files: Vec<FilePrefix>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing prefix for `filename`, or a freshly allocated one.
    pub fn prefix_for(&mut self, filename: &str) -> String {
        if let Some(entry) = self.files.iter().find(|f| f.filename == filename) {
            return entry.prefix.clone();
        }
        let prefix = self.files.len().to_string();
        log::debug!("Registered file {} as prefix {}", filename, prefix);
        self.files.push(FilePrefix {
            filename: filename.to_string(),
            prefix: prefix.clone(),
            namespace: None,
        });
        prefix
    }

    pub fn filename_for(&self, prefix: &str) -> Result<&str> {
        self.files
            .iter()
            .find(|f| f.prefix == prefix)
            .map(|f| f.filename.as_str())
            .ok_or_else(|| CimscopeError::UnknownPrefix(prefix.to_string()))
    }

    pub fn encode(&mut self, filename: &str, local_id: &str) -> CompositeId {
        let prefix = self.prefix_for(filename);
        CompositeId::new(prefix, local_id)
    }

    /// Decode and check the prefix belongs to this registry.
    pub fn decode(&self, raw: &str) -> Result<CompositeId> {
        let id = CompositeId::parse(raw)?;
        self.filename_for(id.prefix())?;
        Ok(id)
    }

    /// Source filename of a composite identifier.
    pub fn file_for(&self, id: &CompositeId) -> Result<&str> {
        self.filename_for(id.prefix())
    }

    /// Every file-qualified variant of `local_id`, in registration order.
    pub fn variants(&self, local_id: &str) -> Vec<CompositeId> {
        self.files
            .iter()
            .map(|f| CompositeId::new(f.prefix.clone(), local_id))
            .collect()
    }

    pub fn bind_namespace(&mut self, filename: &str, namespace: String) -> String {
        let prefix = self.prefix_for(filename);
        if let Some(entry) = self.files.iter_mut().find(|f| f.prefix == prefix) {
            entry.namespace = Some(namespace);
        }
        prefix
    }

    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.prefix == prefix)
            .and_then(|f| f.namespace.as_deref())
    }

    pub fn files(&self) -> &[FilePrefix] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
