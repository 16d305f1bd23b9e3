//! Hover cards: tooltips on markers and the selection widget popup
//!
//! Leaving the anchor does not hide the card at once. A hide is scheduled
//! `grace` later and is cancelled if the pointer reaches the card (or comes
//! back to the anchor) first, so moving from marker to panel never flickers.

use instant::Instant;
use std::collections::HashMap;
use std::time::Duration;

use crate::scanner::unit::NodeId;
use crate::terms::{Definition, DefinitionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverState<K> {
    Hidden,
    Visible { anchor: K },
    PendingHide { anchor: K, deadline: Instant },
}

/// Show/hide state for one floating card anchored at `K`
#[derive(Debug)]
pub struct HoverCard<K> {
    grace: Duration,
    state: HoverState<K>,
}

impl<K: Copy + PartialEq> HoverCard<K> {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            state: HoverState::Hidden,
        }
    }

    pub fn state(&self) -> HoverState<K> {
        self.state
    }

    pub fn anchor(&self) -> Option<K> {
        match self.state {
            HoverState::Hidden => None,
            HoverState::Visible { anchor } | HoverState::PendingHide { anchor, .. } => Some(anchor),
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self.state, HoverState::Hidden)
    }

    /// Pointer entered an anchor. Returns true if the card (re)opened on it.
    pub fn enter_anchor(&mut self, anchor: K) -> bool {
        let changed = self.anchor() != Some(anchor);
        self.state = HoverState::Visible { anchor };
        changed
    }

    pub fn leave_anchor(&mut self, now: Instant) {
        self.schedule_hide(now);
    }

    /// Pointer reached the card itself: cancel any pending hide
    pub fn enter_card(&mut self) {
        if let HoverState::PendingHide { anchor, .. } = self.state {
            self.state = HoverState::Visible { anchor };
        }
    }

    pub fn leave_card(&mut self, now: Instant) {
        self.schedule_hide(now);
    }

    fn schedule_hide(&mut self, now: Instant) {
        if let HoverState::Visible { anchor } = self.state {
            self.state = HoverState::PendingHide {
                anchor,
                deadline: now + self.grace,
            };
        }
    }

    /// Apply a due hide. Returns true when the card was hidden.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            HoverState::PendingHide { deadline, .. } if now >= deadline => {
                self.state = HoverState::Hidden;
                true
            }
            _ => false,
        }
    }

    pub fn hide(&mut self) {
        self.state = HoverState::Hidden;
    }
}

// =============================================================================
// Marker tooltips
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipContent {
    pub term: String,
    pub summary: DefinitionSummary,
}

/// Tooltips bound to marker elements
#[derive(Debug)]
pub struct TooltipManager {
    bindings: HashMap<NodeId, TooltipContent>,
    card: HoverCard<NodeId>,
}

impl TooltipManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            bindings: HashMap::new(),
            card: HoverCard::new(grace),
        }
    }

    pub fn attach_tooltip(&mut self, marker: NodeId, term: &str, definition: &Definition) {
        self.bindings.insert(
            marker,
            TooltipContent {
                term: term.to_string(),
                summary: definition.summary(term),
            },
        );
    }

    pub fn detach(&mut self, marker: NodeId) {
        self.bindings.remove(&marker);
        if self.card.anchor() == Some(marker) {
            self.card.hide();
        }
    }

    /// Bind every live marker and drop bindings for markers that are gone.
    /// `lookup` resolves a term to its current definition.
    pub fn sync<'a, F>(&mut self, markers: impl Iterator<Item = (NodeId, &'a str)>, lookup: F) -> usize
    where
        F: Fn(&str) -> Option<Definition>,
    {
        let live: HashMap<NodeId, &str> = markers.collect();
        let gone: Vec<NodeId> = self
            .bindings
            .keys()
            .filter(|m| !live.contains_key(m))
            .copied()
            .collect();
        for marker in gone {
            self.detach(marker);
        }

        let mut attached = 0;
        for (marker, term) in live {
            if self.bindings.contains_key(&marker) {
                continue;
            }
            if let Some(definition) = lookup(term) {
                self.attach_tooltip(marker, term, &definition);
                attached += 1;
            }
        }
        attached
    }

    pub fn content(&self, marker: NodeId) -> Option<&TooltipContent> {
        self.bindings.get(&marker)
    }

    /// Tooltip currently on screen
    pub fn visible(&self) -> Option<(NodeId, &TooltipContent)> {
        let marker = self.card.anchor()?;
        self.bindings.get(&marker).map(|c| (marker, c))
    }

    pub fn pointer_enter_marker(&mut self, marker: NodeId) -> Option<&TooltipContent> {
        if !self.bindings.contains_key(&marker) {
            return None;
        }
        self.card.enter_anchor(marker);
        self.bindings.get(&marker)
    }

    pub fn pointer_leave_marker(&mut self, now: Instant) {
        self.card.leave_anchor(now);
    }

    pub fn pointer_enter_panel(&mut self) {
        self.card.enter_card();
    }

    pub fn pointer_leave_panel(&mut self, now: Instant) {
        self.card.leave_card(now);
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.card.poll(now)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding and hide
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.card.hide();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn manager() -> TooltipManager {
        let mut tooltips = TooltipManager::new(ms(100));
        tooltips.attach_tooltip(NodeId(7), "ROI", &Definition::from("Return on Investment"));
        tooltips
    }

    #[test]
    fn test_hover_shows_definition() {
        let mut tooltips = manager();
        let content = tooltips.pointer_enter_marker(NodeId(7)).unwrap();
        assert_eq!(content.summary.description, "Return on Investment");
        assert_eq!(content.summary.full_title, "ROI");
        assert!(tooltips.pointer_enter_marker(NodeId(99)).is_none());
    }

    #[test]
    fn test_grace_period_hides_after_leave() {
        let t0 = Instant::now();
        let mut tooltips = manager();
        tooltips.pointer_enter_marker(NodeId(7));
        tooltips.pointer_leave_marker(t0);

        assert!(!tooltips.poll(t0 + ms(99)));
        assert!(tooltips.visible().is_some());
        assert!(tooltips.poll(t0 + ms(100)));
        assert!(tooltips.visible().is_none());
    }

    #[test]
    fn test_entering_panel_cancels_hide() {
        let t0 = Instant::now();
        let mut tooltips = manager();
        tooltips.pointer_enter_marker(NodeId(7));
        tooltips.pointer_leave_marker(t0);
        tooltips.pointer_enter_panel();

        assert!(!tooltips.poll(t0 + ms(500)));
        assert!(tooltips.visible().is_some());

        tooltips.pointer_leave_panel(t0 + ms(500));
        assert!(tooltips.poll(t0 + ms(600)));
    }

    #[test]
    fn test_sync_follows_markers() {
        let mut tooltips = manager();
        tooltips.pointer_enter_marker(NodeId(7));

        let markers = vec![(NodeId(8), "KPI"), (NodeId(9), "gone")];
        let attached = tooltips.sync(markers.into_iter(), |term| {
            (term == "KPI").then(|| Definition::from("Key Performance Indicator"))
        });

        assert_eq!(attached, 1);
        assert_eq!(tooltips.len(), 1);
        assert!(tooltips.content(NodeId(7)).is_none());
        // The visible tooltip's marker went away
        assert!(tooltips.visible().is_none());
    }

    #[test]
    fn test_card_reenter_anchor() {
        let t0 = Instant::now();
        let mut card: HoverCard<()> = HoverCard::new(ms(100));
        assert!(card.enter_anchor(()));
        card.leave_anchor(t0);
        assert!(!card.enter_anchor(()));
        assert!(!card.poll(t0 + ms(200)));
        assert_eq!(card.state(), HoverState::Visible { anchor: () });
    }
}
