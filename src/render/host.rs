//! TextHost: the DOM capabilities the inline renderer needs
//!
//! `NodeTree` is an arena implementation used natively and in tests; the
//! browser implementation lives in `wasm.rs`.

use crate::error::{GlossaryError, Result};
use crate::scanner::unit::NodeId;

/// Class on the element that replaces a highlighted text node
pub const CONTAINER_CLASS: &str = "glossarly-container";
/// Class on each marker element
pub const MARKER_CLASS: &str = "glossarly-highlight";
/// Attribute carrying the dictionary spelling on a marker
pub const TERM_ATTR: &str = "data-term";

/// Elements whose text is never scanned
pub const SKIP_TAGS: &[&str] = &[
    "script", "style", "textarea", "input", "noscript", "select", "option", "template",
];

/// Engine-owned chrome that must never be scanned
pub const ENGINE_CLASSES: &[&str] = &[
    CONTAINER_CLASS,
    MARKER_CLASS,
    "glossarly-tooltip",
    "glossarly-widget",
    "glossarly-selection-widget",
    "glossarly-selection-popup",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text(String),
    Element { tag: String },
}

/// A piece of replacement content for one text node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    Marker { term: String, text: String },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain(text) => text,
            Segment::Marker { text, .. } => text,
        }
    }
}

/// What `replace_with_markup` created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMarkup {
    pub container: NodeId,
    /// Marker element and the term it carries
    pub markers: Vec<(NodeId, String)>,
}

pub trait TextHost {
    fn root(&self) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn kind(&self, node: NodeId) -> Option<NodeKind>;
    fn has_class(&self, node: NodeId, class: &str) -> bool;
    fn is_attached(&self, node: NodeId) -> bool;

    /// Swap a single text node for a container holding `segments`.
    /// Siblings and ancestors are left untouched.
    fn replace_with_markup(&mut self, node: NodeId, segments: &[Segment]) -> Result<RenderedMarkup>;

    /// Swap a container back for one flat text node
    fn replace_with_text(&mut self, node: NodeId, text: &str) -> Result<NodeId>;

    fn text_content(&self, node: NodeId) -> String {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => text,
            Some(NodeKind::Element { .. }) => self
                .children(node)
                .into_iter()
                .map(|child| self.text_content(child))
                .collect(),
            None => String::new(),
        }
    }
}

// =============================================================================
// NodeTree
// =============================================================================

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
}

/// Arena-backed node tree with a `body` root
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    pub fn new() -> Self {
        let body = NodeData {
            kind: NodeKind::Element {
                tag: "body".to_string(),
            },
            parent: None,
            children: Vec::new(),
            classes: Vec::new(),
            attrs: Vec::new(),
        };
        Self {
            nodes: vec![body],
            root: NodeId(0),
        }
    }

    pub fn body(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            classes: Vec::new(),
            attrs: Vec::new(),
        });
        id
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0)
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.alloc(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
        });
        self.attach(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.alloc(NodeKind::Text(text.to_string()));
        self.attach(parent, id);
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            if !data.classes.iter().any(|c| c == class) {
                data.classes.push(class.to_string());
            }
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            match data.attrs.iter_mut().find(|(n, _)| n == name) {
                Some(attr) => attr.1 = value.to_string(),
                None => data.attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.data(node)?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node)?.parent
    }

    /// Simulate a characterData mutation
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            if let NodeKind::Text(existing) = &mut data.kind {
                *existing = text.to_string();
            }
        }
    }

    /// Detach a node from its parent
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.nodes[parent.0].children.retain(|c| *c != node);
            self.nodes[node.0].parent = None;
        }
    }

    fn swap_in_parent(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let parent = self.parent(old).ok_or(GlossaryError::StaleNode(old.0))?;
        let slot = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == old)
            .ok_or(GlossaryError::StaleNode(old.0))?;
        self.nodes[parent.0].children[slot] = new;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
        Ok(())
    }

    /// Serialize a subtree as HTML-ish markup (for assertions and debugging)
    pub fn to_markup(&self, node: NodeId) -> String {
        let Some(data) = self.data(node) else {
            return String::new();
        };
        match &data.kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element { tag } => {
                let mut out = format!("<{}", tag);
                if !data.classes.is_empty() {
                    out.push_str(&format!(" class=\"{}\"", data.classes.join(" ")));
                }
                for (name, value) in &data.attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, value));
                }
                out.push('>');
                for child in &data.children {
                    out.push_str(&self.to_markup(*child));
                }
                out.push_str(&format!("</{}>", tag));
                out
            }
        }
    }
}

impl TextHost for NodeTree {
    fn root(&self) -> Option<NodeId> {
        Some(self.root)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.data(node).map(|d| d.children.clone()).unwrap_or_default()
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.data(node).map(|d| d.kind.clone())
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.data(node)
            .map(|d| d.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn replace_with_markup(&mut self, node: NodeId, segments: &[Segment]) -> Result<RenderedMarkup> {
        if !matches!(self.kind(node), Some(NodeKind::Text(_))) {
            return Err(GlossaryError::StaleNode(node.0));
        }

        let container = self.alloc(NodeKind::Element {
            tag: "span".to_string(),
        });
        self.add_class(container, CONTAINER_CLASS);
        self.swap_in_parent(node, container)?;

        let mut markers = Vec::new();
        for segment in segments {
            match segment {
                Segment::Plain(text) => {
                    self.append_text(container, text);
                }
                Segment::Marker { term, text } => {
                    let marker = self.append_element(container, "span");
                    self.add_class(marker, MARKER_CLASS);
                    self.set_attr(marker, TERM_ATTR, term);
                    self.append_text(marker, text);
                    markers.push((marker, term.clone()));
                }
            }
        }

        Ok(RenderedMarkup { container, markers })
    }

    fn replace_with_text(&mut self, node: NodeId, text: &str) -> Result<NodeId> {
        let replacement = self.alloc(NodeKind::Text(text.to_string()));
        self.swap_in_parent(node, replacement)?;
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_siblings() {
        let mut tree = NodeTree::new();
        let body = tree.body();
        let p = tree.append_element(body, "p");
        let before = tree.append_element(p, "b");
        tree.append_text(before, "bold");
        let text = tree.append_text(p, "The ROI");
        tree.append_text(p, " tail");

        let rendered = tree
            .replace_with_markup(
                text,
                &[
                    Segment::Plain("The ".to_string()),
                    Segment::Marker {
                        term: "ROI".to_string(),
                        text: "ROI".to_string(),
                    },
                ],
            )
            .unwrap();

        assert_eq!(
            tree.to_markup(p),
            "<p><b>bold</b><span class=\"glossarly-container\">The <span class=\"glossarly-highlight\" data-term=\"ROI\">ROI</span></span> tail</p>"
        );
        assert!(!tree.is_attached(text));
        assert!(tree.is_attached(rendered.container));
        assert_eq!(rendered.markers.len(), 1);

        let restored = tree.replace_with_text(rendered.container, "The ROI").unwrap();
        assert_eq!(tree.to_markup(p), "<p><b>bold</b>The ROI tail</p>");
        assert!(tree.is_attached(restored));
    }

    #[test]
    fn test_replace_detached_node_fails() {
        let mut tree = NodeTree::new();
        let body = tree.body();
        let text = tree.append_text(body, "ROI");
        tree.remove(text);
        assert!(tree.replace_with_markup(text, &[]).is_err());
    }

    #[test]
    fn test_text_content_concatenates() {
        let mut tree = NodeTree::new();
        let body = tree.body();
        let div = tree.append_element(body, "div");
        tree.append_text(div, "a");
        let span = tree.append_element(div, "span");
        tree.append_text(span, "b");
        assert_eq!(tree.text_content(body), "ab");
    }
}
