//! Floating widgets
//!
//! - `SelectionWidget` - indicator next to a user selection, listing the
//!   glossary terms inside it or offering to add a new one. At most one
//!   exists at a time.
//! - `IndicatorWidget` - corner badge with the terms-found count, the
//!   dictionary size, and the enable toggle.
//!
//! Plus the geometry helpers hosts use to turn a selection into text.

use instant::Instant;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::WidgetConfig;
use crate::error::GlossaryError;
use crate::protocol::Message;
use crate::render::tooltip::HoverCard;
use crate::terms::{DefinitionSummary, TermEntry};

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Inclusive overlap; rectangles sharing only an edge still intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() < other.left
            || self.left > other.right()
            || self.bottom() < other.top
            || self.top > other.bottom())
    }
}

/// A painted paragraph and the accessible text it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphBox {
    pub rect: Rect,
    pub text: String,
}

/// Text of every paragraph the selection touches, joined with single spaces
pub fn assemble_selection_text(paragraphs: &[ParagraphBox], selection: &Rect) -> String {
    paragraphs
        .iter()
        .filter(|p| p.rect.intersects(selection) && !p.text.is_empty())
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keys whose release may have changed the selection
pub fn is_selection_key(key: &str) -> bool {
    key.starts_with("Arrow") || key == "Shift"
}

// =============================================================================
// Selection widget
// =============================================================================

/// What the user selected and which terms it contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionContext {
    pub selected_text: String,
    pub bounding_rect: Rect,
    pub matched_terms: Vec<TermEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPlacement {
    pub left: f64,
    pub top: f64,
    pub popup_left: f64,
    pub popup_top: f64,
}

/// Where the selection widget goes. `page_margin` is the measured left
/// margin of the page; when it cannot be measured the configured default
/// is used.
pub fn place_widget(rect: &Rect, page_margin: Option<f64>, scroll_y: f64, config: &WidgetConfig) -> WidgetPlacement {
    let margin = page_margin.unwrap_or_else(|| {
        let missing = GlossaryError::RenderTargetMissing("page margin anchor".to_string());
        log::warn!("{}; using {}px", missing, config.default_page_margin_px);
        config.default_page_margin_px
    });

    let left = margin - config.widget_offset_px;
    let top = (rect.top + scroll_y - 4.0).max(config.min_top_px);
    WidgetPlacement {
        left,
        top,
        popup_left: left + config.popup_offset_px,
        popup_top: top,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WidgetView {
    #[serde(rename_all = "camelCase")]
    TermsFound { entries: Vec<TermSummary> },
    #[serde(rename_all = "camelCase")]
    NoTerms { selected_text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSummary {
    pub term: String,
    pub summary: DefinitionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWidget {
    pub id: u64,
    pub placement: WidgetPlacement,
    pub view: WidgetView,
}

#[derive(Debug)]
pub struct SelectionWidget {
    config: WidgetConfig,
    current: Option<ActiveWidget>,
    popup: HoverCard<u64>,
    next_id: u64,
}

impl SelectionWidget {
    pub fn new(config: WidgetConfig, grace: Duration) -> Self {
        Self {
            config,
            current: None,
            popup: HoverCard::new(grace),
            next_id: 1,
        }
    }

    /// Replace any existing widget with one for `context`
    pub fn show_selection_widget(
        &mut self,
        context: &SelectionContext,
        page_margin: Option<f64>,
        scroll_y: f64,
    ) -> &ActiveWidget {
        self.dismiss();

        let view = if context.matched_terms.is_empty() {
            WidgetView::NoTerms {
                selected_text: context.selected_text.trim().to_string(),
            }
        } else {
            WidgetView::TermsFound {
                entries: context
                    .matched_terms
                    .iter()
                    .map(|e| TermSummary {
                        term: e.term.clone(),
                        summary: e.definition.summary(&e.term),
                    })
                    .collect(),
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        log::debug!("selection widget #{} for {:?}", id, context.selected_text);
        self.current.insert(ActiveWidget {
            id,
            placement: place_widget(&context.bounding_rect, page_margin, scroll_y, &self.config),
            view,
        })
    }

    pub fn current(&self) -> Option<&ActiveWidget> {
        self.current.as_ref()
    }

    /// Tear down the widget and its popup. Returns the removed widget id.
    pub fn dismiss(&mut self) -> Option<u64> {
        self.popup.hide();
        self.current.take().map(|w| w.id)
    }

    /// "Add as new term": only offered when nothing matched
    pub fn add_term(&mut self) -> Option<Message> {
        let prefilled_text = match &self.current.as_ref()?.view {
            WidgetView::NoTerms { selected_text } => selected_text.clone(),
            WidgetView::TermsFound { .. } => return None,
        };
        self.dismiss();
        Some(Message::OpenPopup { prefilled_text })
    }

    pub fn pointer_enter_widget(&mut self) {
        if let Some(widget) = &self.current {
            self.popup.enter_anchor(widget.id);
        }
    }

    pub fn pointer_leave_widget(&mut self, now: Instant) {
        self.popup.leave_anchor(now);
    }

    pub fn pointer_enter_popup(&mut self) {
        self.popup.enter_card();
    }

    pub fn pointer_leave_popup(&mut self, now: Instant) {
        self.popup.leave_card(now);
    }

    pub fn popup_visible(&self) -> bool {
        self.popup.is_visible()
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.popup.poll(now)
    }
}

// =============================================================================
// Indicator widget
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorWidget {
    pub enabled: bool,
    pub matches_found: usize,
    pub term_count: usize,
    pub panel_open: bool,
}

impl Default for IndicatorWidget {
    fn default() -> Self {
        Self {
            enabled: true,
            matches_found: 0,
            term_count: 0,
            panel_open: false,
        }
    }
}

impl IndicatorWidget {
    pub fn set_counts(&mut self, matches_found: usize, term_count: usize) {
        self.matches_found = matches_found;
        self.term_count = term_count;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.matches_found = 0;
        }
    }

    pub fn label(&self) -> String {
        if !self.enabled {
            return "Highlighting off".to_string();
        }
        match self.matches_found {
            1 => "1 term found".to_string(),
            n => format!("{} terms found", n),
        }
    }

    /// Flip the side panel and return the message that does it
    pub fn toggle_panel(&mut self) -> Message {
        self.panel_open = !self.panel_open;
        if self.panel_open {
            Message::OpenSidePanel
        } else {
            Message::CloseSidePanel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(text: &str, terms: &[(&str, &str)]) -> SelectionContext {
        SelectionContext {
            selected_text: text.to_string(),
            bounding_rect: Rect::new(300.0, 250.0, 120.0, 18.0),
            matched_terms: terms.iter().map(|(t, d)| TermEntry::new(*t, *d)).collect(),
        }
    }

    // =========================================================================
    // Requirement 1: placement
    // =========================================================================

    #[test]
    fn test_placement_formula() {
        let config = WidgetConfig::default();
        let placement = place_widget(&Rect::new(0.0, 250.0, 10.0, 10.0), Some(96.0), 40.0, &config);
        assert_eq!(placement.left, 56.0);
        assert_eq!(placement.top, 286.0);
        assert_eq!(placement.popup_left, 92.0);

        // Clamped near the top, default margin when the anchor is missing
        let placement = place_widget(&Rect::new(0.0, 20.0, 10.0, 10.0), None, 0.0, &config);
        assert_eq!(placement.left, 32.0);
        assert_eq!(placement.top, 100.0);
    }

    // =========================================================================
    // Requirement 2: one widget at a time, two presentation states
    // =========================================================================

    #[test]
    fn test_single_instance() {
        let mut widget = SelectionWidget::new(WidgetConfig::default(), Duration::from_millis(100));
        let first = widget
            .show_selection_widget(&context("our KPIs", &[("KPI", "Key Performance Indicator")]), None, 0.0)
            .id;
        let second = widget.show_selection_widget(&context("hello", &[]), None, 0.0).id;

        assert_ne!(first, second);
        assert_eq!(widget.current().map(|w| w.id), Some(second));
        assert!(matches!(
            widget.current().unwrap().view,
            WidgetView::NoTerms { .. }
        ));
        assert_eq!(widget.dismiss(), Some(second));
        assert!(widget.current().is_none());
    }

    #[test]
    fn test_terms_found_view() {
        let mut widget = SelectionWidget::new(WidgetConfig::default(), Duration::from_millis(100));
        let active = widget.show_selection_widget(
            &context("ROI and KPI", &[("ROI", "Return on Investment"), ("KPI", "Key Performance Indicator")]),
            Some(72.0),
            0.0,
        );
        match &active.view {
            WidgetView::TermsFound { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].term, "ROI");
                assert_eq!(entries[1].summary.description, "Key Performance Indicator");
            }
            other => panic!("unexpected {:?}", other),
        }
        // No add-term affordance when terms were found
        assert!(widget.add_term().is_none());
    }

    #[test]
    fn test_add_term_prefills_selection() {
        let mut widget = SelectionWidget::new(WidgetConfig::default(), Duration::from_millis(100));
        widget.show_selection_widget(&context("  EBITDA ", &[]), None, 0.0);
        assert_eq!(
            widget.add_term(),
            Some(Message::OpenPopup {
                prefilled_text: "EBITDA".to_string()
            })
        );
        assert!(widget.current().is_none());
    }

    #[test]
    fn test_popup_grace() {
        let t0 = Instant::now();
        let mut widget = SelectionWidget::new(WidgetConfig::default(), Duration::from_millis(100));
        widget.show_selection_widget(&context("x", &[]), None, 0.0);
        widget.pointer_enter_widget();
        widget.pointer_leave_widget(t0);
        widget.pointer_enter_popup();
        assert!(!widget.poll(t0 + Duration::from_millis(300)));
        assert!(widget.popup_visible());
        widget.pointer_leave_popup(t0 + Duration::from_millis(300));
        assert!(widget.poll(t0 + Duration::from_millis(400)));
    }

    // =========================================================================
    // Requirement 3: selection helpers
    // =========================================================================

    #[test]
    fn test_assemble_selection_text() {
        let paragraphs = vec![
            ParagraphBox {
                rect: Rect::new(72.0, 100.0, 468.0, 20.0),
                text: "Our ROI grew.".to_string(),
            },
            ParagraphBox {
                rect: Rect::new(72.0, 130.0, 468.0, 20.0),
                text: "KPI targets met.".to_string(),
            },
            ParagraphBox {
                rect: Rect::new(72.0, 400.0, 468.0, 20.0),
                text: "Far away.".to_string(),
            },
        ];
        let selection = Rect::new(100.0, 110.0, 50.0, 30.0);
        assert_eq!(
            assemble_selection_text(&paragraphs, &selection),
            "Our ROI grew. KPI targets met."
        );
        assert_eq!(assemble_selection_text(&paragraphs, &Rect::new(0.0, 0.0, 1.0, 1.0)), "");
    }

    #[test]
    fn test_touching_rects_intersect() {
        let line = Rect::new(72.0, 100.0, 468.0, 20.0);
        assert!(line.intersects(&Rect::new(72.0, 120.0, 10.0, 5.0)));
        assert!(line.intersects(&Rect::new(540.0, 100.0, 10.0, 5.0)));
        assert!(!line.intersects(&Rect::new(72.0, 120.5, 10.0, 5.0)));
        assert!(!line.intersects(&Rect::new(0.0, 100.0, 71.0, 5.0)));
    }

    #[test]
    fn test_selection_keys() {
        assert!(is_selection_key("ArrowLeft"));
        assert!(is_selection_key("Shift"));
        assert!(!is_selection_key("a"));
        assert!(!is_selection_key("Enter"));
    }

    // =========================================================================
    // Requirement 4: indicator
    // =========================================================================

    #[test]
    fn test_indicator_counts_and_toggle() {
        let mut indicator = IndicatorWidget::default();
        indicator.set_counts(3, 10);
        assert_eq!(indicator.label(), "3 terms found");
        indicator.set_counts(1, 10);
        assert_eq!(indicator.label(), "1 term found");

        indicator.set_enabled(false);
        assert_eq!(indicator.matches_found, 0);
        assert_eq!(indicator.label(), "Highlighting off");

        assert_eq!(indicator.toggle_panel(), Message::OpenSidePanel);
        assert_eq!(indicator.toggle_panel(), Message::CloseSidePanel);
    }
}
