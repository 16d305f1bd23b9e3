//! OverlayRenderer: strokes painted on transparent surfaces
//!
//! Used for content painted onto canvas tiles, where there is no text node
//! to wrap. One overlay surface mirrors each source surface (size, position,
//! transform). Matches are turned into underline strokes from character
//! offsets.
//!
//! # Known limitation
//! Glyph metrics are not available from painted content, so the mapping
//! assumes monospace glyphs (`font_size * char_width_ratio`) and a fixed
//! number of paragraphs per surface, each given an equal vertical slot.
//! Strokes are approximate; wrapped lines and proportional fonts will drift.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{OverlayConfig, ReadinessConfig};
use crate::error::{GlossaryError, Result};
use crate::scanner::document::{DocumentModel, DocumentRun, PageLayout};
use crate::scanner::unit::{non_overlapping, ScanUnit, UnitId};
use crate::terms::MatchSpan;

// =============================================================================
// Types
// =============================================================================

/// Position and size of a source surface in page pixels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurfaceGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    /// CSS transform copied from the source, if any
    pub transform: Option<String>,
}

/// One underline on a surface, in surface-local pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub term: String,
    pub x1: f64,
    pub x2: f64,
    pub y: f64,
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Surface {
    geometry: SurfaceGeometry,
    painted: Vec<(UnitId, Stroke)>,
}

impl Surface {
    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.painted.iter().map(|(_, stroke)| stroke)
    }

    pub fn stroke_count(&self) -> usize {
        self.painted.len()
    }
}

#[derive(Debug, Clone)]
struct PlacedRun {
    run: DocumentRun,
    /// Graphemes in the same paragraph before this run
    column_base: usize,
}

#[derive(Debug, Clone)]
struct OverlayRecord {
    surface: usize,
    spans: Vec<MatchSpan>,
}

// =============================================================================
// OverlayRenderer
// =============================================================================

#[derive(Debug)]
pub struct OverlayRenderer {
    config: OverlayConfig,
    layout: PageLayout,
    runs: Vec<PlacedRun>,
    loaded: bool,
    surfaces: Vec<Surface>,
    records: HashMap<UnitId, OverlayRecord>,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        let layout = DocumentModel::default().layout(&config);
        Self {
            config,
            layout,
            runs: Vec::new(),
            loaded: false,
            surfaces: Vec::new(),
            records: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Replace the document being rendered. Everything painted for the
    /// previous document is erased. Returns how many units were cleared.
    pub fn set_document(&mut self, document: &DocumentModel) -> usize {
        let cleared = self.clear_all();
        self.layout = document.layout(&self.config);

        let mut runs = Vec::new();
        let mut paragraph = usize::MAX;
        let mut column = 0;
        for run in document.runs() {
            if run.paragraph != paragraph {
                paragraph = run.paragraph;
                column = 0;
            }
            let width = run.text.graphemes(true).count();
            runs.push(PlacedRun {
                run,
                column_base: column,
            });
            column += width;
        }
        self.runs = runs;
        self.loaded = true;
        cleared
    }

    pub fn has_document(&self) -> bool {
        self.loaded
    }

    // -------------------------------------------------------------------------
    // Surfaces
    // -------------------------------------------------------------------------

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surface(&self, index: usize) -> Option<&Surface> {
        self.surfaces.get(index)
    }

    /// Mirror the current set of source surfaces. Overlays for surfaces that
    /// disappeared are dropped with their records. Returns true when the
    /// number of surfaces changed.
    pub fn set_surfaces(&mut self, geometries: Vec<SurfaceGeometry>) -> bool {
        let before = self.surfaces.len();
        if geometries.len() < before {
            let cut = geometries.len();
            self.records.retain(|_, record| record.surface < cut);
            self.surfaces.truncate(cut);
        }

        for (index, geometry) in geometries.into_iter().enumerate() {
            if index < self.surfaces.len() {
                self.synchronize(index, geometry);
            } else {
                self.surfaces.push(Surface {
                    geometry,
                    painted: Vec::new(),
                });
            }
        }
        self.surfaces.len() != before
    }

    /// Keep one overlay matched to its source. A size change repaints the
    /// surface since stroke positions scale with it.
    pub fn synchronize(&mut self, index: usize, geometry: SurfaceGeometry) -> bool {
        let Some(surface) = self.surfaces.get_mut(index) else {
            return false;
        };
        let resized =
            surface.geometry.width != geometry.width || surface.geometry.height != geometry.height;
        surface.geometry = geometry;
        if resized {
            self.repaint(index);
        }
        true
    }

    fn repaint(&mut self, index: usize) {
        let units: Vec<(UnitId, Vec<MatchSpan>)> = self
            .records
            .iter()
            .filter(|(_, r)| r.surface == index)
            .map(|(unit, r)| (*unit, r.spans.clone()))
            .collect();

        let mut painted = Vec::new();
        for (unit, spans) in units {
            if let Some(run) = self.find_run(&unit) {
                if let Some(surface) = self.surfaces.get(index) {
                    for span in &spans {
                        for stroke in self.strokes_for(run, span, &surface.geometry) {
                            painted.push((unit, stroke));
                        }
                    }
                }
            }
        }
        if let Some(surface) = self.surfaces.get_mut(index) {
            surface.painted = painted;
        }
    }

    /// Erase every mark on one surface; other surfaces are untouched
    pub fn clear(&mut self, index: usize) -> usize {
        let Some(surface) = self.surfaces.get_mut(index) else {
            return 0;
        };
        let erased = surface.painted.len();
        surface.painted.clear();
        self.records.retain(|_, record| record.surface != index);
        erased
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    fn find_run(&self, unit: &UnitId) -> Option<&PlacedRun> {
        self.runs.iter().find(|p| p.run.unit_id() == *unit)
    }

    /// Surface a paragraph is assumed to be painted on
    pub fn surface_for_paragraph(&self, paragraph: usize) -> usize {
        paragraph / self.config.paragraphs_per_surface.max(1)
    }

    fn strokes_for(&self, placed: &PlacedRun, span: &MatchSpan, surface: &SurfaceGeometry) -> Vec<Stroke> {
        let text = &placed.run.text;
        if span.end > text.len() || !text.is_char_boundary(span.start) || !text.is_char_boundary(span.end) {
            return Vec::new();
        }

        let per_surface = self.config.paragraphs_per_surface.max(1);
        let scale_x = surface.width / self.layout.width_pt.max(1.0);
        let scale_y = surface.height / self.layout.height_pt.max(1.0);

        let font_pt = placed.run.font_size_pt.unwrap_or(self.config.font_size_pt);
        let char_w = (font_pt * self.config.char_width_ratio * scale_x).max(0.1);
        let line_h = font_pt * self.config.line_height_ratio * scale_y;
        let content_left = self.layout.margin_left_pt * scale_x;
        let content_w = self.layout.content_width_pt() * scale_x;
        let per_line = ((content_w / char_w).floor() as usize).max(1);

        let slot = placed.run.paragraph % per_surface;
        let slot_h = self.layout.content_height_pt() * scale_y / per_surface as f64;
        let slot_top = self.layout.margin_top_pt * scale_y + slot as f64 * slot_h;

        let start_col = placed.column_base + text[..span.start].graphemes(true).count();
        let end_col = start_col + text[span.start..span.end].graphemes(true).count();
        if end_col <= start_col {
            return Vec::new();
        }

        let mut strokes = Vec::new();
        let first_line = start_col / per_line;
        let last_line = (end_col - 1) / per_line;
        for line in first_line..=last_line {
            let line_start = line * per_line;
            let from = start_col.max(line_start) - line_start;
            let to = end_col.min(line_start + per_line) - line_start;
            let baseline = slot_top + line as f64 * line_h + font_pt * scale_y;
            strokes.push(Stroke {
                term: span.term.clone(),
                x1: content_left + from as f64 * char_w,
                x2: content_left + to as f64 * char_w,
                y: (baseline + self.config.stroke_width).min(surface.height),
                color: self.config.stroke_color.clone(),
                width: self.config.stroke_width,
            });
        }
        strokes
    }

    // -------------------------------------------------------------------------
    // RenderTarget surface
    // -------------------------------------------------------------------------

    pub fn collect_units(&self) -> Vec<ScanUnit> {
        self.runs
            .iter()
            .filter(|p| !p.run.text.trim().is_empty())
            .map(|p| ScanUnit::new(p.run.unit_id(), p.run.text.clone()))
            .collect()
    }

    pub fn current_text(&self, unit: &UnitId) -> Option<String> {
        self.find_run(unit).map(|p| p.run.text.clone())
    }

    pub fn apply_highlights(&mut self, unit: &ScanUnit, spans: &[MatchSpan]) -> Result<usize> {
        self.remove_highlights(&unit.id);

        let placed = self.find_run(&unit.id).cloned().ok_or_else(|| {
            GlossaryError::RenderTargetMissing(format!("no document run for {:?}", unit.id))
        })?;

        let kept = non_overlapping(spans);
        if kept.is_empty() {
            return Ok(0);
        }

        let index = self.surface_for_paragraph(placed.run.paragraph);
        let Some(surface) = self.surfaces.get(index) else {
            // Tile not painted yet; a surface change triggers a rescan
            log::debug!("surface {} not present for {:?}", index, unit.id);
            return Ok(0);
        };

        let mut painted = Vec::new();
        for span in &kept {
            for stroke in self.strokes_for(&placed, span, &surface.geometry) {
                painted.push((unit.id, stroke));
            }
        }

        if let Some(surface) = self.surfaces.get_mut(index) {
            surface.painted.extend(painted);
        }
        let placed_count = kept.len();
        self.records.insert(
            unit.id,
            OverlayRecord {
                surface: index,
                spans: kept,
            },
        );
        Ok(placed_count)
    }

    pub fn remove_highlights(&mut self, unit: &UnitId) -> bool {
        let Some(record) = self.records.remove(unit) else {
            return false;
        };
        if let Some(surface) = self.surfaces.get_mut(record.surface) {
            surface.painted.retain(|(owner, _)| owner != unit);
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
        let cleared = self.records.len();
        self.records.clear();
        for surface in &mut self.surfaces {
            surface.painted.clear();
        }
        cleared
    }

    pub fn mark_count(&self) -> usize {
        self.records.values().map(|r| r.spans.len()).sum()
    }
}

// =============================================================================
// Readiness
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready,
    /// Check again after this long
    Waiting(Duration),
    GaveUp,
}

/// Waits for a painted editor to show its container and at least one tile
#[derive(Debug)]
pub struct ReadinessProbe {
    max_attempts: u32,
    interval: Duration,
    attempts: u32,
}

impl ReadinessProbe {
    pub fn new(config: &ReadinessConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: Duration::from_millis(config.interval_ms),
            attempts: 0,
        }
    }

    pub fn check(&mut self, editor_present: bool, tile_count: usize) -> ProbeStatus {
        if editor_present && tile_count > 0 {
            log::info!("editor ready after {} attempt(s), {} tile(s)", self.attempts + 1, tile_count);
            return ProbeStatus::Ready;
        }
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            log::error!("editor not ready after {} attempts", self.attempts);
            return ProbeStatus::GaveUp;
        }
        ProbeStatus::Waiting(self.interval)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn gave_up_error(&self) -> GlossaryError {
        GlossaryError::RenderTargetMissing(format!(
            "editor canvas after {} attempts",
            self.attempts
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
