//! Configuration types and defaults for the highlighting engine
//!
//! Every field has a default so hosts can pass a partial JSON object.

use serde::{Deserialize, Serialize};

// =============================================================================
// Overlay geometry
// =============================================================================

/// Parameters for the heuristic offset-to-pixel mapping on painted surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Paragraphs assumed to fit on one surface. Empirically tuned (2 and 9
    /// both observed); treat as a knob, not a law. Default: 9
    pub paragraphs_per_surface: usize,
    /// Body font size in points when the document does not say. Default: 11
    pub font_size_pt: f64,
    /// Glyph advance as a fraction of font size (monospace assumption). Default: 0.5
    pub char_width_ratio: f64,
    /// Line box height as a fraction of font size. Default: 1.15
    pub line_height_ratio: f64,
    /// Page margins in points when the document omits them. Default: 72
    pub default_margin_pt: f64,
    /// Page width in points when the document omits it (US Letter). Default: 612
    pub default_page_width_pt: f64,
    /// Page height in points when the document omits it. Default: 792
    pub default_page_height_pt: f64,
    pub stroke_color: String,
    pub stroke_width: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            paragraphs_per_surface: 9,
            font_size_pt: 11.0,
            char_width_ratio: 0.5,
            line_height_ratio: 1.15,
            default_margin_pt: 72.0,
            default_page_width_pt: 612.0,
            default_page_height_pt: 792.0,
            stroke_color: "#1a73e8".to_string(),
            stroke_width: 2.0,
        }
    }
}

// =============================================================================
// Widget placement
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Used when the ruler indent anchor cannot be found. Default: 72
    pub default_page_margin_px: f64,
    /// Widget sits this far left of the page margin. Default: 40
    pub widget_offset_px: f64,
    /// Widget never goes above this y. Default: 100
    pub min_top_px: f64,
    /// Popup opens this far right of the widget. Default: 36
    pub popup_offset_px: f64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            default_page_margin_px: 72.0,
            widget_offset_px: 40.0,
            min_top_px: 100.0,
            popup_offset_px: 36.0,
        }
    }
}

// =============================================================================
// Readiness polling
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            interval_ms: 100,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Coalescing window for high-churn sources. Default: 500
    pub debounce_ms: u64,
    /// Static pages rescan on every mutation. Default: true
    pub immediate_static_pages: bool,
    /// Hard timeout on structured document fetches. Default: 30000
    pub fetch_timeout_ms: u64,
    /// Units processed per scan step before yielding. Default: 200
    pub scan_chunk_size: usize,
    /// Hover grace period for tooltips and popups. Default: 100
    pub tooltip_grace_ms: u64,
    /// Delay between a selection gesture and reading the selection. Default: 50
    pub selection_settle_ms: u64,
    pub overlay: OverlayConfig,
    pub widget: WidgetConfig,
    pub readiness: ReadinessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            immediate_static_pages: true,
            fetch_timeout_ms: 30_000,
            scan_chunk_size: 200,
            tooltip_grace_ms: 100,
            selection_settle_ms: 50,
            overlay: OverlayConfig::default(),
            widget: WidgetConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Ordinary web pages: low churn, react to each mutation
    pub fn static_page() -> Self {
        Self::default()
    }

    /// Paginated editors: collapse mutation bursts, sparser paragraph density
    pub fn structured_document() -> Self {
        Self {
            immediate_static_pages: false,
            overlay: OverlayConfig {
                paragraphs_per_surface: 2,
                ..OverlayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
