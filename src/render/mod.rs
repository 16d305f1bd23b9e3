//! Rendering: how matched spans become visible marks
//!
//! Two variants behind one interface, chosen once per content source:
//! - `inline.rs` - InlineRenderer: wraps matched text in marker elements
//! - `overlay.rs` - OverlayRenderer: paints strokes on transparent surfaces
//!   layered over read-only painted content
//!
//! Shared pieces:
//! - `host.rs` - TextHost: DOM capabilities + in-memory NodeTree
//! - `tooltip.rs` - hover tooltip with grace period
//! - `widget.rs` - selection widget and indicator widget

pub mod host;
pub mod inline;
pub mod overlay;
pub mod tooltip;
pub mod widget;

pub use host::*;
pub use inline::*;
pub use overlay::*;
pub use tooltip::*;
pub use widget::*;

use crate::error::Result;
use crate::scanner::unit::{ScanUnit, UnitId};
use crate::terms::MatchSpan;

/// What the scanner needs from a renderer
pub trait RenderTarget {
    /// Units currently available for scanning, in document order
    fn collect_units(&self) -> Vec<ScanUnit>;

    /// Text the unit holds right now, or None once it left the page
    fn current_text(&self, unit: &UnitId) -> Option<String>;

    /// Tear down any prior record for `unit`, then mark `spans`.
    /// Returns the number of marks placed.
    fn apply_highlights(&mut self, unit: &ScanUnit, spans: &[MatchSpan]) -> Result<usize>;

    /// Returns false when the unit had no record
    fn remove_highlights(&mut self, unit: &UnitId) -> bool;

    fn is_highlighted(&self, unit: &UnitId) -> bool;

    fn highlighted_units(&self) -> Vec<UnitId>;

    /// Remove every record. Returns how many units were cleared.
    fn clear_all(&mut self) -> usize;

    /// Marks currently visible
    fn mark_count(&self) -> usize;
}

/// Renderer variant for one content source
#[derive(Debug)]
pub enum Target<H: TextHost> {
    Inline(InlineRenderer<H>),
    Overlay(OverlayRenderer),
}

impl<H: TextHost> Target<H> {
    pub fn as_inline(&self) -> Option<&InlineRenderer<H>> {
        match self {
            Target::Inline(r) => Some(r),
            Target::Overlay(_) => None,
        }
    }

    pub fn as_inline_mut(&mut self) -> Option<&mut InlineRenderer<H>> {
        match self {
            Target::Inline(r) => Some(r),
            Target::Overlay(_) => None,
        }
    }

    pub fn as_overlay(&self) -> Option<&OverlayRenderer> {
        match self {
            Target::Overlay(r) => Some(r),
            Target::Inline(_) => None,
        }
    }

    pub fn as_overlay_mut(&mut self) -> Option<&mut OverlayRenderer> {
        match self {
            Target::Overlay(r) => Some(r),
            Target::Inline(_) => None,
        }
    }
}

impl<H: TextHost> RenderTarget for Target<H> {
    fn collect_units(&self) -> Vec<ScanUnit> {
        match self {
            Target::Inline(r) => r.collect_units(),
            Target::Overlay(r) => r.collect_units(),
        }
    }

    fn current_text(&self, unit: &UnitId) -> Option<String> {
        match self {
            Target::Inline(r) => r.current_text(unit),
            Target::Overlay(r) => r.current_text(unit),
        }
    }

    fn apply_highlights(&mut self, unit: &ScanUnit, spans: &[MatchSpan]) -> Result<usize> {
        match self {
            Target::Inline(r) => r.apply_highlights(unit, spans),
            Target::Overlay(r) => r.apply_highlights(unit, spans),
        }
    }

    fn remove_highlights(&mut self, unit: &UnitId) -> bool {
        match self {
            Target::Inline(r) => r.remove_highlights(unit),
            Target::Overlay(r) => r.remove_highlights(unit),
        }
    }

    fn is_highlighted(&self, unit: &UnitId) -> bool {
        match self {
            Target::Inline(r) => r.is_highlighted(unit),
            Target::Overlay(r) => r.is_highlighted(unit),
        }
    }

    fn highlighted_units(&self) -> Vec<UnitId> {
        match self {
            Target::Inline(r) => r.highlighted_units(),
            Target::Overlay(r) => r.highlighted_units(),
        }
    }

    fn clear_all(&mut self) -> usize {
        match self {
            Target::Inline(r) => r.clear_all(),
            Target::Overlay(r) => r.clear_all(),
        }
    }

    fn mark_count(&self) -> usize {
        match self {
            Target::Inline(r) => r.mark_count(),
            Target::Overlay(r) => r.mark_count(),
        }
    }
}
