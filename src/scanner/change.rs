//! ChangeTracker: Content-Addressable Change Detection per unit
//!
//! Remembers the content hash and dictionary revision each unit was last
//! scanned at, so unchanged units are skipped on re-scan.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::scanner::unit::UnitId;

// =============================================================================
// Types
// =============================================================================

/// Result of change detection for one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResult {
    /// True if the unit needs (re)scanning
    pub has_changed: bool,
    pub content_hash: u64,
    pub previous_hash: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seen {
    hash: u64,
    revision: u64,
}

// =============================================================================
// ChangeTracker
// =============================================================================

#[derive(Debug, Default)]
pub struct ChangeTracker {
    seen: HashMap<UnitId, Seen>,
    check_count: u64,
    skip_count: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a unit's text against what was last recorded for it.
    /// A unit counts as changed if its text differs or it was scanned
    /// against another dictionary revision.
    pub fn check(&mut self, unit: &UnitId, text: &str, revision: u64) -> ChangeResult {
        self.check_count += 1;

        let content_hash = Self::compute_hash(text);
        let previous = self.seen.get(unit).copied();

        let has_changed = match previous {
            None => true,
            Some(prev) => prev.hash != content_hash || prev.revision != revision,
        };

        if !has_changed {
            self.skip_count += 1;
        }

        ChangeResult {
            has_changed,
            content_hash,
            previous_hash: previous.map(|p| p.hash),
        }
    }

    /// Record a unit as scanned. Called only once results are committed.
    pub fn record(&mut self, unit: UnitId, content_hash: u64, revision: u64) {
        self.seen.insert(
            unit,
            Seen {
                hash: content_hash,
                revision,
            },
        );
    }

    pub fn forget(&mut self, unit: &UnitId) {
        self.seen.remove(unit);
    }

    /// Force every unit to be rescanned; counters are kept
    pub fn forget_all(&mut self) {
        self.seen.clear();
    }

    /// Drop units that no longer exist in the source
    pub fn retain_units(&mut self, live: &[UnitId]) {
        let live: std::collections::HashSet<&UnitId> = live.iter().collect();
        self.seen.retain(|unit, _| live.contains(unit));
    }

    fn compute_hash(text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    /// Skip rate as percentage
    pub fn skip_rate(&self) -> f64 {
        if self.check_count == 0 {
            return 0.0;
        }
        (self.skip_count as f64 / self.check_count as f64) * 100.0
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    pub fn skip_count(&self) -> u64 {
        self.skip_count
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.check_count = 0;
        self.skip_count = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================
