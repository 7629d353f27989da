//! Loads a folder of CGMES RDF/XML documents into a [`GraphStore`].
//!
//! Only the RDF/XML shape CGMES profiles use is understood: top-level typed
//! nodes carrying `rdf:ID`/`rdf:about`, whose children are either literal
//! properties or `rdf:resource` references.

use std::path::{Path, PathBuf};
use std::time::Instant;

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use walkdir::WalkDir;

use super::{GraphStore, MemoryStore, Triple, TripleSource, RDF_TYPE};
use crate::error::{CimscopeError, Result};
use crate::ident::{CompositeId, FileRegistry};

/// Characters the store's own namespace handling chokes on.
const NAMESPACE_ESCAPES: [(&str, &str); 2] = [("(", "%28"), (")", "%29")];

/// `*.xml` files directly inside `folder`, sorted by file name.
pub fn discover_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(CimscopeError::InvalidInput(format!(
            "dataset folder is not a directory: {}",
            folder.display()
        )));
    }

    let files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("xml"))
                .unwrap_or(false)
        })
        .collect();

    log::info!("Discovered {} files in {}", files.len(), folder.display());
    Ok(files)
}

/// `file://<absolute path>#`, with parentheses percent-escaped.
pub fn file_namespace(path: &Path) -> String {
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut namespace = absolute.to_string_lossy().replace('\\', "/");
    for (from, to) in NAMESPACE_ESCAPES {
        namespace = namespace.replace(from, to);
    }
    if namespace.starts_with('/') {
        format!("file://{}#", namespace)
    } else {
        format!("file:///{}#", namespace)
    }
}

/// Register, then parse, every document of `folder`.
pub fn load_folder(folder: &Path) -> Result<GraphStore> {
    let started = Instant::now();
    let paths = discover_files(folder)?;

    // All namespaces are bound before parsing so absolute cross-file
    // references resolve regardless of load order.
    let mut registry = FileRegistry::new();
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let prefix = registry.bind_namespace(&filename, file_namespace(&path));
        documents.push((path, filename, prefix));
    }

    let mut source = MemoryStore::new();
    for (path, filename, prefix) in &documents {
        let content = std::fs::read_to_string(path)?;
        let triples = parse_rdf_xml(&content, filename, prefix, &registry)?;
        let mut inserted = 0;
        for triple in triples {
            if source.insert(triple) {
                inserted += 1;
            }
        }
        log::info!("Loaded {} as prefix {} ({} triples)", filename, prefix, inserted);
    }

    log::info!(
        "Graph loaded in {:?}: {} files, {} triples",
        started.elapsed(),
        registry.len(),
        source.len()
    );
    Ok(GraphStore::new(registry, source))
}

/// Per-document resolution context.
struct Document<'a> {
    prefix: &'a str,
    registry: &'a FileRegistry,
    /// `xmlns:` declarations of the root element, as `(prefix, uri)`.
    namespaces: Vec<(String, String)>,
}

impl Document<'_> {
    fn local(&self, local_id: &str) -> String {
        CompositeId::new(self.prefix, local_id).to_string()
    }

    fn resolve(&self, reference: &str) -> String {
        match reference.strip_prefix('#') {
            Some(local_id) => self.local(local_id),
            None => self.compact(reference),
        }
    }

    fn compact(&self, uri: &str) -> String {
        for file in self.registry.files() {
            if let Some(local_id) = file.namespace.as_deref().and_then(|ns| uri.strip_prefix(ns)) {
                return CompositeId::new(file.prefix.clone(), local_id).to_string();
            }
        }
        self.namespaces
            .iter()
            .filter(|(_, ns)| uri.len() > ns.len() && uri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(p, ns)| format!("{}:{}", p, &uri[ns.len()..]))
            .unwrap_or_else(|| uri.to_string())
    }

    fn subject_of(&self, e: &BytesStart) -> Option<String> {
        let mut subject = None;
        for (key, value) in attributes(e) {
            match key.as_str() {
                "rdf:ID" => subject = Some(self.local(&value)),
                "rdf:about" => subject = Some(self.resolve(&value)),
                _ => {}
            }
        }
        subject
    }

    fn resource_of(&self, e: &BytesStart) -> Option<String> {
        attributes(e)
            .into_iter()
            .find(|(key, _)| key == "rdf:resource")
            .map(|(_, value)| self.resolve(&value))
    }
}

/// A property element whose closing tag has not been seen yet.
struct PendingProperty {
    predicate: String,
    resource: Option<String>,
    text: String,
}

/// Parse one RDF/XML document. Local ids resolve against `prefix`.
pub fn parse_rdf_xml(
    content: &str,
    filename: &str,
    prefix: &str,
    registry: &FileRegistry,
) -> Result<Vec<Triple>> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();

    let mut doc = Document {
        prefix,
        registry,
        namespaces: Vec::new(),
    };
    let mut triples = Vec::new();
    let mut open = 0usize;
    let mut subject: Option<String> = None;
    let mut pending: Option<PendingProperty> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                match open {
                    0 => doc.namespaces = namespace_declarations(&e),
                    1 => {
                        subject = doc.subject_of(&e);
                        match &subject {
                            Some(s) => push_type(&mut triples, s, &e),
                            None => log::debug!("Skipping anonymous node in {}", filename),
                        }
                    }
                    2 if subject.is_some() => {
                        pending = Some(PendingProperty {
                            predicate: qname(&e),
                            resource: doc.resource_of(&e),
                            text: String::new(),
                        });
                    }
                    _ => {}
                }
                open += 1;
            }
            Ok(Event::Empty(e)) => match open {
                1 => {
                    if let Some(s) = doc.subject_of(&e) {
                        push_type(&mut triples, &s, &e);
                    }
                }
                2 => {
                    if let Some(s) = &subject {
                        let predicate = qname(&e);
                        match doc.resource_of(&e) {
                            Some(target) => triples.push(Triple::reference(s.clone(), predicate, target)),
                            None => triples.push(Triple::literal(s.clone(), predicate, "")),
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let (3, Some(property)) = (open, pending.as_mut()) {
                    property.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if let (3, Some(property)) = (open, pending.as_mut()) {
                    property.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let (3, Some(property)) = (open, pending.as_mut()) {
                    let name = String::from_utf8_lossy(e.as_ref()).to_string();
                    if let Ok(Some(c)) = e.resolve_char_ref() {
                        property.text.push(c);
                    } else if let Some(value) = resolve_predefined_entity(&name) {
                        property.text.push_str(value);
                    } else {
                        property.text.push('&');
                        property.text.push_str(&name);
                        property.text.push(';');
                    }
                }
            }
            Ok(Event::End(_)) => {
                open = open.saturating_sub(1);
                match open {
                    2 => {
                        if let (Some(s), Some(property)) = (&subject, pending.take()) {
                            let triple = match property.resource {
                                Some(target) => Triple::reference(s.clone(), property.predicate, target),
                                None => Triple::literal(s.clone(), property.predicate, property.text.trim()),
                            };
                            triples.push(triple);
                        }
                    }
                    1 => subject = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CimscopeError::Parse(format!(
                    "RDF/XML parse error in {}: {}",
                    filename, e
                )));
            }
        }
        buf.clear();
    }

    Ok(triples)
}

fn push_type(triples: &mut Vec<Triple>, subject: &str, e: &BytesStart) {
    let class = qname(e);
    if class != "rdf:Description" {
        triples.push(Triple::reference(subject, RDF_TYPE, class));
    }
}

fn qname(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn attributes(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                attribute_value(&String::from_utf8_lossy(&a.value)),
            )
        })
        .collect()
}

fn namespace_declarations(e: &BytesStart) -> Vec<(String, String)> {
    attributes(e)
        .into_iter()
        .filter_map(|(key, uri)| key.strip_prefix("xmlns:").map(|p| (p.to_string(), uri)))
        .collect()
}

/// Attribute text with entity and character references resolved. Values
/// with unknown entities are kept as written.
fn attribute_value(raw: &str) -> String {
    match unescape(raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.to_string(),
    }
}
