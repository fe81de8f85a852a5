pub mod kinds;
pub mod parse;
pub mod resolve;

pub use kinds::SectionKind;
pub use parse::parse;
pub use resolve::{
    resolve, DepKind, Dependency, MacroDef, RefKind, Reference, ResolvedDocument,
};

use serde::{Deserialize, Serialize};

// --- Document model ---

/// A named block of a canon document, typed by inferred semantic kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub content: String,
    /// 1-based line of the `# <name>` heading in the source text.
    pub start_line: u32,
    /// 1-based line of the last content line (heading line for empty sections).
    pub end_line: u32,
}

/// A single `key: value` pair from the metadata header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

/// Ordered metadata map. Keys keep their first-seen position; assigning an
/// existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct Metadata {
    entries: Vec<MetaEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(MetaEntry {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed canon document: metadata header plus ordered named sections.
/// Immutable once constructed; every re-parse produces a new `Document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub path: String,
    pub raw_content: String,
    pub metadata: Metadata,
    /// Sections in source order. Names are unique: a duplicate heading keeps
    /// its first position but carries the last occurrence's content.
    pub sections: Vec<Section>,
}

impl Document {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Sections of a given inferred kind, in source order.
    pub fn sections_of_kind(&self, kind: SectionKind) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(move |s| s.kind == kind)
    }
}
