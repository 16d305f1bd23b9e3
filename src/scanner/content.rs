//! ContentScanner: finds terms in a content source and hands them to a renderer
//!
//! # State machine
//! `Idle -> Scanning -> Idle`. A scan request that arrives while a job is
//! running is folded into it: one follow-up scan runs when the job ends,
//! however many requests came in.
//!
//! # Scheduling
//! Change events go through a `DebouncedScheduler`; the host drives time
//! with `tick(now, ..)`. Each tick processes at most `chunk_size` units so a
//! long document never blocks the thread for a whole scan.
//!
//! # Dictionary revisions
//! A job pins the `Snapshot` it started with. Before every chunk the job's
//! revision is compared with the index; on mismatch the job is dropped and
//! restarted against the new dictionary, so nothing computed from an old
//! revision is committed after a new one is active.

use instant::Instant;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::error::GlossaryError;
use crate::render::RenderTarget;
use crate::scanner::change::ChangeTracker;
use crate::scanner::debounce::{DebouncedScheduler, ScanPolicy};
use crate::scanner::unit::{ScanUnit, UnitId};
use crate::terms::{Snapshot, TermIndex};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub scans_started: u64,
    pub scans_completed: u64,
    /// Requests folded into a running job
    pub coalesced_requests: u64,
    /// Jobs dropped because the dictionary changed under them
    pub stale_discards: u64,
    pub units_checked: u64,
    pub units_skipped: u64,
    pub units_marked: u64,
    pub apply_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do
    Idle,
    /// Units still queued in the current job
    Progress(usize),
    Finished,
    /// Dictionary changed mid-scan; job restarted on the new revision
    Restarted,
}

struct ScanJob {
    snapshot: Rc<Snapshot>,
    queue: VecDeque<ScanUnit>,
}

enum ScanState {
    Idle,
    Scanning(ScanJob),
}

// =============================================================================
// ContentScanner
// =============================================================================

pub struct ContentScanner<T: RenderTarget> {
    target: T,
    tracker: ChangeTracker,
    scheduler: DebouncedScheduler,
    state: ScanState,
    rescan_requested: bool,
    chunk_size: usize,
    stats: ScanStats,
}

impl<T: RenderTarget> ContentScanner<T> {
    pub fn new(target: T, policy: ScanPolicy, chunk_size: usize) -> Self {
        Self {
            target,
            tracker: ChangeTracker::new(),
            scheduler: DebouncedScheduler::new(policy),
            state: ScanState::Idle,
            rescan_requested: false,
            chunk_size: chunk_size.max(1),
            stats: ScanStats::default(),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning(_))
    }

    /// Marks currently rendered by the target
    pub fn matches_found(&self) -> usize {
        self.target.mark_count()
    }

    // -------------------------------------------------------------------------
    // Triggers
    // -------------------------------------------------------------------------

    /// A content mutation was observed
    pub fn on_content_changed(&mut self, now: Instant) {
        if !self.scheduler.request(now) {
            self.stats.coalesced_requests += 1;
        }
    }

    /// Treat every rendered record as stale and schedule a full rescan
    pub fn invalidate(&mut self, now: Instant) {
        self.tracker.forget_all();
        if self.is_scanning() {
            self.rescan_requested = true;
        }
        self.on_content_changed(now);
    }

    pub fn is_scan_pending(&self) -> bool {
        self.scheduler.is_pending() || self.is_scanning()
    }

    pub fn time_until_due(&self, now: Instant) -> Option<std::time::Duration> {
        self.scheduler.time_until_due(now)
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    /// Start a job. Returns false when a job was already running, in which
    /// case one follow-up scan is queued instead.
    pub fn begin_scan(&mut self, index: &TermIndex) -> bool {
        if self.is_scanning() {
            self.rescan_requested = true;
            self.stats.coalesced_requests += 1;
            return false;
        }

        let units = self.target.collect_units();
        let live: Vec<UnitId> = units.iter().map(|u| u.id).collect();
        self.drop_vanished(&live);

        self.stats.scans_started += 1;
        log::debug!(
            "scan #{} started: {} unit(s), revision {}",
            self.stats.scans_started,
            units.len(),
            index.revision()
        );
        self.state = ScanState::Scanning(ScanJob {
            snapshot: index.snapshot(),
            queue: units.into(),
        });
        true
    }

    fn drop_vanished(&mut self, live: &[UnitId]) {
        self.tracker.retain_units(live);
        let live: HashSet<&UnitId> = live.iter().collect();
        for unit in self.target.highlighted_units() {
            if !live.contains(&unit) {
                self.target.remove_highlights(&unit);
            }
        }
    }

    /// Process one chunk of the current job
    pub fn step(&mut self, index: &TermIndex) -> StepOutcome {
        let ScanState::Scanning(job) = &mut self.state else {
            return StepOutcome::Idle;
        };

        if job.snapshot.revision() != index.revision() {
            log::debug!(
                "dictionary moved {} -> {} mid-scan, restarting",
                job.snapshot.revision(),
                index.revision()
            );
            self.stats.stale_discards += 1;
            self.state = ScanState::Idle;
            self.begin_scan(index);
            return StepOutcome::Restarted;
        }

        let snapshot = Rc::clone(&job.snapshot);
        let take = self.chunk_size.min(job.queue.len());
        let chunk: Vec<ScanUnit> = job.queue.drain(..take).collect();
        let remaining = job.queue.len();

        for unit in &chunk {
            self.scan_unit(unit, &snapshot);
        }

        if remaining > 0 {
            return StepOutcome::Progress(remaining);
        }

        self.state = ScanState::Idle;
        self.stats.scans_completed += 1;
        log::debug!(
            "scan #{} finished: {} mark(s)",
            self.stats.scans_completed,
            self.target.mark_count()
        );

        if self.rescan_requested {
            self.rescan_requested = false;
            self.begin_scan(index);
        }
        StepOutcome::Finished
    }

    fn scan_unit(&mut self, queued: &ScanUnit, snapshot: &Snapshot) {
        self.stats.units_checked += 1;
        // The queue holds text from when the job began; the page may have
        // moved on since
        let Some(text) = self.target.current_text(&queued.id) else {
            log::debug!("unit {:?} left the page before its chunk ran", queued.id);
            self.target.remove_highlights(&queued.id);
            self.tracker.forget(&queued.id);
            return;
        };
        let fresh;
        let unit = if text == queued.text {
            queued
        } else {
            fresh = ScanUnit::new(queued.id, text);
            &fresh
        };

        let change = self.tracker.check(&unit.id, &unit.text, snapshot.revision());
        if !change.has_changed {
            self.stats.units_skipped += 1;
            return;
        }

        let spans = snapshot.find_all(&unit.text);
        if spans.is_empty() {
            if self.target.is_highlighted(&unit.id) {
                self.target.remove_highlights(&unit.id);
            }
            self.tracker
                .record(unit.id, change.content_hash, snapshot.revision());
            return;
        }

        match self.target.apply_highlights(unit, &spans) {
            Ok(placed) => {
                if placed > 0 {
                    self.stats.units_marked += 1;
                }
                self.tracker
                    .record(unit.id, change.content_hash, snapshot.revision());
            }
            Err(GlossaryError::StaleNode(node)) => {
                // Node went away between discovery and render
                log::debug!("unit {:?} vanished (node {})", unit.id, node);
                self.stats.apply_failures += 1;
                self.tracker.forget(&unit.id);
            }
            Err(e) => {
                log::warn!("could not highlight {:?}: {}", unit.id, e);
                self.stats.apply_failures += 1;
                self.tracker.forget(&unit.id);
            }
        }
    }

    /// Run a whole scan now (plus any follow-up it queues). Returns the
    /// number of marks rendered afterwards.
    pub fn scan(&mut self, index: &TermIndex) -> usize {
        self.begin_scan(index);
        while self.step(index) != StepOutcome::Idle {}
        self.target.mark_count()
    }

    /// Drive time: start a due scan and process one chunk
    pub fn tick(&mut self, now: Instant, index: &TermIndex) -> StepOutcome {
        if self.scheduler.poll(now) {
            self.begin_scan(index);
        }
        self.step(index)
    }

    /// Remove every mark and forget all tracking (used when disabled)
    pub fn clear(&mut self) -> usize {
        self.scheduler.cancel();
        self.state = ScanState::Idle;
        self.rescan_requested = false;
        self.tracker.forget_all();
        self.target.clear_all()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{InlineRenderer, NodeTree, Target, TextHost};
    use crate::scanner::unit::NodeId;
    use crate::terms::{Dictionary, TermEntry};
    use std::time::Duration;

    fn dict(pairs: &[(&str, &str)]) -> Dictionary {
        pairs.iter().map(|(t, d)| TermEntry::new(*t, *d)).collect()
    }

    fn index(pairs: &[(&str, &str)]) -> TermIndex {
        let mut index = TermIndex::new();
        index.load(dict(pairs));
        index
    }

    fn page(texts: &[&str]) -> (NodeTree, Vec<NodeId>) {
        let mut tree = NodeTree::new();
        let body = tree.body();
        let nodes = texts
            .iter()
            .map(|text| {
                let p = tree.append_element(body, "p");
                tree.append_text(p, text)
            })
            .collect();
        (tree, nodes)
    }

    fn scanner(tree: NodeTree, policy: ScanPolicy, chunk: usize) -> ContentScanner<Target<NodeTree>> {
        ContentScanner::new(Target::Inline(InlineRenderer::new(tree)), policy, chunk)
    }

    fn markup(scanner: &ContentScanner<Target<NodeTree>>) -> String {
        let host = scanner.target().as_inline().unwrap().host();
        host.to_markup(host.body())
    }

    // =========================================================================
    // Requirement 1: scan marks every unit with matches
    // =========================================================================

    #[test]
    fn test_scan_marks_matches() {
        let index = index(&[("ROI", "Return on Investment"), ("B2B", "Business to Business")]);
        let (tree, _) = page(&["The ROI was high", "We sell B2B and B2C products", "nothing"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);

        assert_eq!(scanner.scan(&index), 2);
        let html = markup(&scanner);
        assert!(html.contains("data-term=\"ROI\">ROI</span>"));
        assert!(html.contains("data-term=\"B2B\">B2B</span>"));
        assert!(!html.contains(">B2C</span>"));
        assert_eq!(scanner.stats().scans_completed, 1);
    }

    // =========================================================================
    // Requirement 2: idempotence
    // =========================================================================

    #[test]
    fn test_rescan_is_idempotent() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["The ROI was high", "ROI again"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);

        scanner.scan(&index);
        let first = markup(&scanner);
        scanner.scan(&index);
        scanner.scan(&index);

        assert_eq!(markup(&scanner), first);
        assert_eq!(scanner.matches_found(), 2);
        assert_eq!(scanner.stats().units_skipped, 4);
    }

    #[test]
    fn test_changed_text_is_rescanned() {
        let index = index(&[("ROI", "Return on Investment"), ("KPI", "Key Performance Indicator")]);
        let (tree, nodes) = page(&["plain text"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        assert_eq!(scanner.scan(&index), 0);

        scanner
            .target_mut()
            .as_inline_mut()
            .unwrap()
            .host_mut()
            .set_text(nodes[0], "now with KPI");
        assert_eq!(scanner.scan(&index), 1);
    }

    // =========================================================================
    // Requirement 3: debounce coalescing
    // =========================================================================

    #[test]
    fn test_burst_of_changes_yields_one_scan() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI"]);
        let mut scanner = scanner(tree, ScanPolicy::Debounced(Duration::from_millis(500)), 200);
        let t0 = Instant::now();

        for i in 0..10 {
            scanner.invalidate(t0 + Duration::from_millis(i * 20));
            assert_eq!(scanner.tick(t0 + Duration::from_millis(i * 20), &index), StepOutcome::Idle);
        }
        assert_eq!(scanner.stats().scans_started, 0);

        let due = t0 + Duration::from_millis(180 + 500);
        assert_eq!(scanner.tick(due, &index), StepOutcome::Finished);
        assert_eq!(scanner.tick(due + Duration::from_secs(5), &index), StepOutcome::Idle);
        assert_eq!(scanner.stats().scans_started, 1);
        assert_eq!(scanner.stats().coalesced_requests, 9);
    }

    #[test]
    fn test_request_during_scan_is_folded() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI a", "ROI b", "ROI c"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 1);

        assert!(scanner.begin_scan(&index));
        assert!(!scanner.begin_scan(&index));
        assert!(!scanner.begin_scan(&index));

        assert_eq!(scanner.step(&index), StepOutcome::Progress(2));
        assert_eq!(scanner.step(&index), StepOutcome::Progress(1));
        assert_eq!(scanner.step(&index), StepOutcome::Finished);
        // Exactly one follow-up job
        assert!(scanner.is_scanning());
        while scanner.step(&index) != StepOutcome::Idle {}
        assert_eq!(scanner.stats().scans_started, 2);
    }

    // =========================================================================
    // Requirement 4: dictionary swap atomicity
    // =========================================================================

    #[test]
    fn test_mid_scan_dictionary_change_restarts() {
        let mut index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI a", "ROI b", "KPI c"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 1);

        scanner.begin_scan(&index);
        assert_eq!(scanner.step(&index), StepOutcome::Progress(2));

        index.load(dict(&[("KPI", "Key Performance Indicator")]));
        assert_eq!(scanner.step(&index), StepOutcome::Restarted);
        while scanner.step(&index) != StepOutcome::Idle {}

        let html = markup(&scanner);
        assert!(!html.contains("data-term=\"ROI\""));
        assert!(html.contains("data-term=\"KPI\""));
        assert_eq!(scanner.stats().stale_discards, 1);
        assert_eq!(scanner.matches_found(), 1);
    }

    #[test]
    fn test_invalidate_after_load_replaces_marks() {
        let mut index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI and KPI"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        scanner.scan(&index);

        index.load(dict(&[("KPI", "Key Performance Indicator")]));
        let t0 = Instant::now();
        scanner.invalidate(t0);
        while scanner.tick(t0, &index) != StepOutcome::Idle {}

        let html = markup(&scanner);
        assert!(html.contains("data-term=\"KPI\""));
        assert!(!html.contains("data-term=\"ROI\""));
    }

    // =========================================================================
    // Requirement 5: vanished units and clearing
    // =========================================================================

    #[test]
    fn test_removed_nodes_are_forgotten() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI a", "ROI b"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        scanner.scan(&index);
        assert_eq!(scanner.matches_found(), 2);

        let host = scanner.target_mut().as_inline_mut().unwrap().host_mut();
        let first_p = host.children(host.body())[0];
        host.remove(first_p);

        assert_eq!(scanner.scan(&index), 1);
        assert_eq!(scanner.tracker().tracked(), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["The ROI"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        scanner.scan(&index);

        assert_eq!(scanner.clear(), 1);
        assert_eq!(scanner.matches_found(), 0);
        assert_eq!(markup(&scanner), "<body><p>The ROI</p></body>");

        // Scanning again brings the marks back
        assert_eq!(scanner.scan(&index), 1);
    }

    #[test]
    fn test_empty_dictionary_marks_nothing() {
        let index = TermIndex::new();
        let (tree, _) = page(&["The ROI"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        assert_eq!(scanner.scan(&index), 0);
        assert_eq!(scanner.stats().units_checked, 1);
    }

    // =========================================================================
    // Requirement 6: page edits made during or after a scan survive
    // =========================================================================

    #[test]
    fn test_edit_between_chunks_is_kept() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, nodes) = page(&["old ROI text", "old ROI text"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 1);

        assert!(scanner.begin_scan(&index));
        assert_eq!(scanner.step(&index), StepOutcome::Progress(1));
        scanner
            .target_mut()
            .as_inline_mut()
            .unwrap()
            .host_mut()
            .set_text(nodes[1], "NEW ROI content");
        while scanner.step(&index) != StepOutcome::Idle {}

        let html = markup(&scanner);
        assert!(html.contains("NEW "));
        assert!(html.contains(" content"));
        assert_eq!(html.matches("old ").count(), 1);
        assert_eq!(scanner.matches_found(), 2);
        assert_eq!(scanner.stats().apply_failures, 0);
    }

    #[test]
    fn test_node_removed_between_chunks() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["ROI a", "ROI b"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 1);

        scanner.begin_scan(&index);
        scanner.step(&index);
        let host = scanner.target_mut().as_inline_mut().unwrap().host_mut();
        let second_p = host.children(host.body())[1];
        host.remove(second_p);
        while scanner.step(&index) != StepOutcome::Idle {}

        assert_eq!(scanner.matches_found(), 1);
        assert_eq!(scanner.tracker().tracked(), 1);
        assert_eq!(scanner.stats().apply_failures, 0);
    }

    #[test]
    fn test_edit_inside_marker_is_kept_on_rescan() {
        let index = index(&[("ROI", "Return on Investment")]);
        let (tree, _) = page(&["The ROI was high"]);
        let mut scanner = scanner(tree, ScanPolicy::Immediate, 200);
        assert_eq!(scanner.scan(&index), 1);

        let renderer = scanner.target_mut().as_inline_mut().unwrap();
        let (marker, _) = renderer.markers().next().unwrap();
        let inner = renderer.host().children(marker)[0];
        renderer.host_mut().set_text(inner, "XYZ");

        assert_eq!(scanner.scan(&index), 0);
        assert_eq!(markup(&scanner), "<body><p>The XYZ was high</p></body>");
    }
}
