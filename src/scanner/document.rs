//! Structured document model
//!
//! Read-only view of a fetched document: `body.content[]` blocks, each
//! optionally a paragraph of text runs, plus page size and margins in
//! points. Each text run becomes one scan unit.

use serde::{Deserialize, Serialize};

use crate::config::OverlayConfig;
use crate::scanner::unit::UnitId;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentModel {
    pub document_id: Option<String>,
    pub title: Option<String>,
    pub body: Body,
    pub document_style: Option<DocumentStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub content: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Block {
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub paragraph: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Paragraph {
    pub elements: Vec<ParagraphElement>,
    pub paragraph_style: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParagraphElement {
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextRun {
    pub content: String,
    pub start_index: Option<usize>,
    pub text_style: Option<TextStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub font_size: Option<Dimension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimension {
    pub magnitude: f64,
    pub unit: Option<String>,
}

impl Dimension {
    pub fn to_points(&self) -> f64 {
        match self.unit.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("IN") => self.magnitude * 72.0,
            Some("MM") => self.magnitude * 72.0 / 25.4,
            Some("CM") => self.magnitude * 72.0 / 2.54,
            _ => self.magnitude,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentStyle {
    pub page_size: Option<Size>,
    pub margin_top: Option<Dimension>,
    pub margin_bottom: Option<Dimension>,
    pub margin_left: Option<Dimension>,
    pub margin_right: Option<Dimension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Size {
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
}

// =============================================================================
// Derived views
// =============================================================================

/// One text run with its position in the document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRun {
    /// Index among paragraph blocks (non-paragraph blocks are not counted)
    pub paragraph: usize,
    pub start_index: usize,
    pub text: String,
    pub font_size_pt: Option<f64>,
}

impl DocumentRun {
    pub fn unit_id(&self) -> UnitId {
        UnitId::Run {
            paragraph: self.paragraph,
            start_index: self.start_index,
        }
    }
}

/// Page geometry in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub width_pt: f64,
    pub height_pt: f64,
    pub margin_top_pt: f64,
    pub margin_bottom_pt: f64,
    pub margin_left_pt: f64,
    pub margin_right_pt: f64,
}

impl PageLayout {
    pub fn content_width_pt(&self) -> f64 {
        (self.width_pt - self.margin_left_pt - self.margin_right_pt).max(1.0)
    }

    pub fn content_height_pt(&self) -> f64 {
        (self.height_pt - self.margin_top_pt - self.margin_bottom_pt).max(1.0)
    }
}

impl DocumentModel {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Text runs in document order. Runs without an index are placed right
    /// after the previous run.
    pub fn runs(&self) -> Vec<DocumentRun> {
        let mut runs = Vec::new();
        let mut cursor = 1usize;
        let mut paragraph_idx = 0usize;

        for block in &self.body.content {
            let paragraph = match &block.paragraph {
                Some(p) => p,
                None => {
                    if let Some(end) = block.end_index {
                        cursor = cursor.max(end);
                    }
                    continue;
                }
            };

            let paragraph_start = block.start_index.unwrap_or(cursor);
            cursor = cursor.max(paragraph_start);

            for element in &paragraph.elements {
                let Some(run) = &element.text_run else {
                    if let Some(end) = element.end_index {
                        cursor = cursor.max(end);
                    }
                    continue;
                };
                let start_index = run.start_index.or(element.start_index).unwrap_or(cursor);
                cursor = start_index + run.content.encode_utf16().count();

                runs.push(DocumentRun {
                    paragraph: paragraph_idx,
                    start_index,
                    text: run.content.clone(),
                    font_size_pt: run
                        .text_style
                        .as_ref()
                        .and_then(|s| s.font_size.as_ref())
                        .map(Dimension::to_points),
                });
            }
            paragraph_idx += 1;
        }

        runs
    }

    /// Page geometry, falling back to configured defaults
    pub fn layout(&self, config: &OverlayConfig) -> PageLayout {
        let style = self.document_style.clone().unwrap_or_default();
        let size = style.page_size.unwrap_or_default();
        let pt = |d: Option<Dimension>, fallback: f64| d.map(|d| d.to_points()).unwrap_or(fallback);

        PageLayout {
            width_pt: pt(size.width, config.default_page_width_pt),
            height_pt: pt(size.height, config.default_page_height_pt),
            margin_top_pt: pt(style.margin_top, config.default_margin_pt),
            margin_bottom_pt: pt(style.margin_bottom, config.default_margin_pt),
            margin_left_pt: pt(style.margin_left, config.default_margin_pt),
            margin_right_pt: pt(style.margin_right, config.default_margin_pt),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "documentId": "doc-1",
        "body": {"content": [
            {"sectionBreak": {}, "endIndex": 1},
            {"startIndex": 1, "endIndex": 28, "paragraph": {
                "elements": [
                    {"startIndex": 1, "endIndex": 9, "textRun": {"content": "We sell "}},
                    {"startIndex": 9, "endIndex": 28, "textRun": {"content": "B2B and B2C goods\n",
                        "textStyle": {"fontSize": {"magnitude": 14, "unit": "PT"}}}}
                ],
                "paragraphStyle": {"namedStyleType": "NORMAL_TEXT"}
            }},
            {"startIndex": 28, "endIndex": 29, "paragraph": {
                "elements": [{"startIndex": 28, "textRun": {"content": "\n"}}]
            }},
            {"startIndex": 29, "paragraph": {
                "elements": [{"textRun": {"content": "ROI matters\n", "startIndex": 29}}]
            }}
        ]},
        "documentStyle": {
            "pageSize": {"width": {"magnitude": 612, "unit": "PT"}, "height": {"magnitude": 792, "unit": "PT"}},
            "marginLeft": {"magnitude": 1, "unit": "IN"}
        }
    }"#;

    #[test]
    fn test_runs_carry_positions() {
        let doc = DocumentModel::from_json(DOC).unwrap();
        let runs = doc.runs();
        assert_eq!(runs.len(), 4);

        assert_eq!(runs[1].paragraph, 0);
        assert_eq!(runs[1].start_index, 9);
        assert_eq!(runs[1].font_size_pt, Some(14.0));

        // startIndex may live on the textRun itself
        assert_eq!(runs[3].paragraph, 2);
        assert_eq!(runs[3].start_index, 29);
    }

    #[test]
    fn test_layout_defaults_and_units() {
        let doc = DocumentModel::from_json(DOC).unwrap();
        let layout = doc.layout(&OverlayConfig::default());
        assert_eq!(layout.width_pt, 612.0);
        assert_eq!(layout.margin_left_pt, 72.0);
        assert_eq!(layout.margin_right_pt, 72.0);
        assert_eq!(layout.content_width_pt(), 468.0);

        let empty = DocumentModel::default();
        assert_eq!(empty.layout(&OverlayConfig::default()).height_pt, 792.0);
        assert!(empty.runs().is_empty());
    }

    #[test]
    fn test_missing_indices_follow_cursor() {
        let doc = DocumentModel::from_json(
            r#"{"body": {"content": [{"paragraph": {"elements": [
                {"textRun": {"content": "ab"}},
                {"textRun": {"content": "cd"}}
            ]}}]}}"#,
        )
        .unwrap();
        let runs = doc.runs();
        assert_eq!(runs[0].start_index, 1);
        assert_eq!(runs[1].start_index, 3);
    }
}
