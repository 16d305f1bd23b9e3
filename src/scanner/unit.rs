//! Scan units: the smallest text-bearing chunks the scanner processes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::terms::MatchSpan;

/// Handle to a node in a `TextHost`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identity of a scan unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UnitId {
    /// A text node owned by the page
    Node { node: NodeId },
    /// A text run of a fetched document
    #[serde(rename_all = "camelCase")]
    Run { paragraph: usize, start_index: usize },
}

impl UnitId {
    pub fn node(id: NodeId) -> Self {
        UnitId::Node { node: id }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            UnitId::Node { node } => Some(*node),
            UnitId::Run { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanUnit {
    pub id: UnitId,
    pub text: String,
}

impl ScanUnit {
    pub fn new(id: UnitId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

// =============================================================================
// Offset conversion
// =============================================================================

/// Byte offset -> UTF-16 code unit offset (what DOM ranges use)
pub fn utf16_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset.min(text.len())]
        .chars()
        .map(char::len_utf16)
        .sum()
}

/// A span re-expressed in UTF-16 offsets for JavaScript hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utf16Span {
    pub term: String,
    pub start: usize,
    pub end: usize,
}

pub fn to_utf16_spans(text: &str, spans: &[MatchSpan]) -> Vec<Utf16Span> {
    spans
        .iter()
        .map(|s| Utf16Span {
            term: s.term.clone(),
            start: utf16_offset(text, s.start),
            end: utf16_offset(text, s.end),
        })
        .collect()
}

/// Keep a left-to-right, non-overlapping subset (longer wins on equal start)
pub fn non_overlapping(spans: &[MatchSpan]) -> Vec<MatchSpan> {
    let mut sorted: Vec<&MatchSpan> = spans.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.len().cmp(&a.len())));

    let mut result = Vec::new();
    let mut last_end = 0;
    for span in sorted {
        if span.start >= last_end {
            last_end = span.end;
            result.push(span.clone());
        }
    }
    result
}
