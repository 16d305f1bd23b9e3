//! InlineRenderer: marker elements inside the page's own text flow
//!
//! Each highlighted text node is swapped for one container holding plain
//! text and marker elements. Records are keyed by the unit id the node had
//! when first scanned, so a container keeps reporting that id on later
//! walks and the change tracker can recognize it.

use std::collections::HashMap;

use crate::error::{GlossaryError, Result};
use crate::render::host::{NodeKind, Segment, TextHost, CONTAINER_CLASS, ENGINE_CLASSES, SKIP_TAGS};
use crate::scanner::unit::{non_overlapping, NodeId, ScanUnit, UnitId};
use crate::terms::MatchSpan;

#[derive(Debug, Clone)]
struct InlineRecord {
    container: NodeId,
    markers: Vec<NodeId>,
}

/// Split `text` into plain and marker segments. Overlapping spans are
/// reduced to a non-overlapping subset first; spans that fall outside the
/// text or off a char boundary are dropped.
pub fn build_segments(text: &str, spans: &[MatchSpan]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for span in non_overlapping(spans) {
        let valid = !span.is_empty()
            && span.start >= cursor
            && span.end <= text.len()
            && text.is_char_boundary(span.start)
            && text.is_char_boundary(span.end);
        if !valid {
            log::warn!("dropping span {}..{} for '{}'", span.start, span.end, span.term);
            continue;
        }
        if span.start > cursor {
            segments.push(Segment::Plain(text[cursor..span.start].to_string()));
        }
        segments.push(Segment::Marker {
            text: text[span.start..span.end].to_string(),
            term: span.term,
        });
        cursor = span.end;
    }

    if cursor < text.len() {
        segments.push(Segment::Plain(text[cursor..].to_string()));
    }
    segments
}

#[derive(Debug)]
pub struct InlineRenderer<H: TextHost> {
    host: H,
    records: HashMap<UnitId, InlineRecord>,
    containers: HashMap<NodeId, UnitId>,
    markers: HashMap<NodeId, String>,
}

impl<H: TextHost> InlineRenderer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            records: HashMap::new(),
            containers: HashMap::new(),
            markers: HashMap::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Every live marker and its term
    pub fn markers(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.markers.iter().map(|(node, term)| (*node, term.as_str()))
    }

    fn should_skip(&self, node: NodeId, tag: &str) -> bool {
        SKIP_TAGS.contains(&tag) || ENGINE_CLASSES.iter().any(|c| self.host.has_class(node, c))
    }

    fn walk(&self, node: NodeId, out: &mut Vec<ScanUnit>) {
        match self.host.kind(node) {
            Some(NodeKind::Text(text)) => {
                if !text.trim().is_empty() {
                    out.push(ScanUnit::new(UnitId::node(node), text));
                }
            }
            Some(NodeKind::Element { tag }) => {
                if self.host.has_class(node, CONTAINER_CLASS) {
                    // Our own container: report the unit it stands for
                    if let Some(unit) = self.containers.get(&node) {
                        out.push(ScanUnit::new(*unit, self.host.text_content(node)));
                    }
                    return;
                }
                if self.should_skip(node, &tag.to_ascii_lowercase()) {
                    return;
                }
                for child in self.host.children(node) {
                    self.walk(child, out);
                }
            }
            None => {}
        }
    }

    pub fn collect_units(&self) -> Vec<ScanUnit> {
        let mut units = Vec::new();
        if let Some(root) = self.host.root() {
            self.walk(root, &mut units);
        }
        units
    }

    /// Text a unit holds in the host right now. A highlighted unit reads
    /// through its container so page edits inside it are seen.
    pub fn current_text(&self, unit: &UnitId) -> Option<String> {
        if let Some(record) = self.records.get(unit) {
            return self
                .host
                .is_attached(record.container)
                .then(|| self.host.text_content(record.container));
        }
        let node = unit.as_node()?;
        if !self.host.is_attached(node) {
            return None;
        }
        match self.host.kind(node) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Drop bookkeeping for a record without touching the host
    fn forget(&mut self, record: &InlineRecord) {
        self.containers.remove(&record.container);
        for marker in &record.markers {
            self.markers.remove(marker);
        }
    }

    pub fn apply_highlights(&mut self, unit: &ScanUnit, spans: &[MatchSpan]) -> Result<usize> {
        let node = match self.records.remove(&unit.id) {
            Some(prior) => {
                self.forget(&prior);
                if !self.host.is_attached(prior.container) {
                    return Err(GlossaryError::StaleNode(prior.container.0));
                }
                let current = self.host.text_content(prior.container);
                self.host.replace_with_text(prior.container, &current)?
            }
            None => unit.id.as_node().ok_or_else(|| {
                GlossaryError::RenderTargetMissing(format!(
                    "inline renderer cannot place unit {:?}",
                    unit.id
                ))
            })?,
        };

        if !self.host.is_attached(node) {
            return Err(GlossaryError::StaleNode(node.0));
        }
        if let Some(NodeKind::Text(current)) = self.host.kind(node) {
            if current != unit.text {
                // Spans were found in text the page has since replaced
                log::debug!("text of {:?} changed after it was read", unit.id);
                return Ok(0);
            }
        }

        let segments = build_segments(&unit.text, spans);
        let marker_total = segments
            .iter()
            .filter(|s| matches!(s, Segment::Marker { .. }))
            .count();
        if marker_total == 0 {
            return Ok(0);
        }

        let rendered = self.host.replace_with_markup(node, &segments)?;
        let mut marker_nodes = Vec::with_capacity(rendered.markers.len());
        for (marker, term) in rendered.markers {
            self.markers.insert(marker, term);
            marker_nodes.push(marker);
        }
        self.containers.insert(rendered.container, unit.id);
        self.records.insert(
            unit.id,
            InlineRecord {
                container: rendered.container,
                markers: marker_nodes,
            },
        );

        log::debug!("marked {} term(s) in {:?}", marker_total, unit.id);
        Ok(marker_total)
    }

    pub fn remove_highlights(&mut self, unit: &UnitId) -> bool {
        let Some(record) = self.records.remove(unit) else {
            return false;
        };
        self.forget(&record);

        if self.host.is_attached(record.container) {
            // Keep whatever the page wrote inside the container
            let text = self.host.text_content(record.container);
            if let Err(e) = self.host.replace_with_text(record.container, &text) {
                log::warn!("could not restore text for {:?}: {}", unit, e);
            }
        }
        true
    }

    pub fn is_highlighted(&self, unit: &UnitId) -> bool {
        self.records.contains_key(unit)
    }

    pub fn highlighted_units(&self) -> Vec<UnitId> {
        self.records.keys().copied().collect()
    }

    pub fn clear_all(&mut self) -> usize {
        let units = self.highlighted_units();
        for unit in &units {
            self.remove_highlights(unit);
        }
        units.len()
    }

    pub fn mark_count(&self) -> usize {
        self.markers.len()
    }
}
