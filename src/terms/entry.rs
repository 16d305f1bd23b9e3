//! Term entries and dictionary snapshots
//!
//! A `Dictionary` is an ordered term → definition mapping. Keys are unique
//! by exact spelling; lookups are case-insensitive and return the stored
//! spelling for display.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// =============================================================================
// Types
// =============================================================================

/// Structured definition with authoring metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RichDefinition {
    pub full_title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub team: Option<String>,
}

/// Either a plain expansion ("Return on Investment") or a rich record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Definition {
    Plain(String),
    Rich(RichDefinition),
}

impl Definition {
    /// Text shown in tooltips and popups
    pub fn text(&self) -> &str {
        match self {
            Definition::Plain(text) => text,
            Definition::Rich(rich) => rich
                .description
                .as_deref()
                .or(rich.full_title.as_deref())
                .unwrap_or(""),
        }
    }

    /// Display summary with fallbacks for missing metadata
    pub fn summary(&self, term: &str) -> DefinitionSummary {
        match self {
            Definition::Plain(text) => DefinitionSummary {
                full_title: term.to_string(),
                description: text.clone(),
                team: "General".to_string(),
                author: "Unknown".to_string(),
                date: None,
            },
            Definition::Rich(rich) => DefinitionSummary {
                full_title: rich.full_title.clone().unwrap_or_else(|| term.to_string()),
                description: rich.description.clone().unwrap_or_default(),
                team: rich.team.clone().unwrap_or_else(|| "General".to_string()),
                author: rich.author.clone().unwrap_or_else(|| "Unknown".to_string()),
                date: rich.date.clone(),
            },
        }
    }
}

impl From<&str> for Definition {
    fn from(text: &str) -> Self {
        Definition::Plain(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSummary {
    pub full_title: String,
    pub description: String,
    pub team: String,
    pub author: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub definition: Definition,
}

impl TermEntry {
    pub fn new(term: impl Into<String>, definition: impl Into<Definition>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
        }
    }
}

// =============================================================================
// Dictionary
// =============================================================================

/// Ordered, exact-key-unique term mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<TermEntry>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terms seeded on first install
    pub fn seed() -> Self {
        let mut dict = Self::new();
        dict.insert("ROI", "Return on Investment");
        dict.insert("KPI", "Key Performance Indicator");
        dict.insert("B2B", "Business to Business");
        dict
    }

    /// Insert or replace. A replaced term keeps its position.
    pub fn insert(&mut self, term: impl Into<String>, definition: impl Into<Definition>) {
        let entry = TermEntry::new(term, definition);
        if entry.term.trim().is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|e| e.term == entry.term) {
            Some(existing) => existing.definition = entry.definition,
            None => self.entries.push(entry),
        }
    }

    /// Remove by exact spelling
    pub fn remove(&mut self, term: &str) -> Option<TermEntry> {
        let idx = self.entries.iter().position(|e| e.term == term)?;
        Some(self.entries.remove(idx))
    }

    /// Case-insensitive lookup; returns the stored spelling
    pub fn get(&self, term: &str) -> Option<&TermEntry> {
        let needle = term.to_lowercase();
        self.entries.iter().find(|e| e.term.to_lowercase() == needle)
    }

    /// Exact-spelling lookup
    pub fn get_exact(&self, term: &str) -> Option<&TermEntry> {
        self.entries.iter().find(|e| e.term == term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a storage value. Non-object values are rejected.
    pub fn from_value(value: serde_json::Value) -> crate::error::Result<Self> {
        match value {
            serde_json::Value::Object(_) => Ok(serde_json::from_value(value)?),
            serde_json::Value::Null => Ok(Self::new()),
            other => Err(crate::error::GlossaryError::DictionaryLoad(format!(
                "expected an object of terms, got {}",
                other
            ))),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<TermEntry> for Dictionary {
    fn from_iter<I: IntoIterator<Item = TermEntry>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for entry in iter {
            dict.insert(entry.term, entry.definition);
        }
        dict
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.term, &entry.definition)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DictionaryVisitor;

        impl<'de> Visitor<'de> for DictionaryVisitor {
            type Value = Dictionary;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of term to definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut dict = Dictionary::new();
                while let Some((term, definition)) = access.next_entry::<String, Definition>()? {
                    dict.insert(term, definition);
                }
                Ok(dict)
            }
        }

        deserializer.deserialize_map(DictionaryVisitor)
    }
}

// =============================================================================
// Tests
// =============================================================================
