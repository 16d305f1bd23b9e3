//! TermIndex: glossary term matching in plain text
//!
//! Two matching modes:
//! - `find_all` - case-insensitive, word-boundary-delimited, one regex per
//!   term behind a `RegexSet` prefilter. Different terms may overlap.
//! - `find_in_selection` - case-insensitive substring containment via
//!   Aho-Corasick over lowercased terms. Looser on purpose: the user already
//!   delimited the span by selecting it.
//!
//! The active dictionary is held as an immutable `Snapshot`. `load` swaps the
//! whole snapshot, so a reader holding the old `Rc` keeps a consistent view.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::terms::entry::{Definition, Dictionary, TermEntry};

// =============================================================================
// Types
// =============================================================================

/// A located occurrence of a term. Offsets are byte offsets into the scanned
/// text; `0 <= start < end <= text.len()`.
///
/// A span carries no unit of its own. It is only meaningful next to the
/// `ScanUnit` whose text produced it, and renderers receive the two together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchSpan {
    /// Dictionary spelling of the matched term
    pub term: String,
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &MatchSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Compiled word-boundary matchers, one per dictionary entry
struct BoundaryMatchers {
    /// Entry index for each compiled regex (uncompilable terms are skipped)
    entry_ids: Vec<usize>,
    regexes: Vec<Regex>,
    prefilter: Option<RegexSet>,
}

/// Substring automaton for selection lookups
struct SelectionMatcher {
    automaton: Option<AhoCorasick>,
    /// Lowercased pattern id -> entry indices sharing that spelling
    pattern_entries: Vec<Vec<usize>>,
}

// =============================================================================
// Pattern construction
// =============================================================================

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Escape the term and anchor it with `\b` only on edges that are word
/// characters, so "C++" and ".NET" still match literally.
pub(crate) fn boundary_pattern(term: &str) -> String {
    let starts_word = term.chars().next().map(is_word_char).unwrap_or(false);
    let ends_word = term.chars().last().map(is_word_char).unwrap_or(false);
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(term),
        if ends_word { r"\b" } else { "" },
    )
}

// =============================================================================
// Snapshot
// =============================================================================

/// Frozen dictionary at one revision with lazily compiled matchers
pub struct Snapshot {
    revision: u64,
    dictionary: Dictionary,
    boundary: OnceCell<BoundaryMatchers>,
    selection: OnceCell<SelectionMatcher>,
}

impl Snapshot {
    fn new(revision: u64, dictionary: Dictionary) -> Self {
        Self {
            revision,
            dictionary,
            boundary: OnceCell::new(),
            selection: OnceCell::new(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    fn boundary(&self) -> &BoundaryMatchers {
        self.boundary.get_or_init(|| {
            let mut entry_ids = Vec::new();
            let mut regexes = Vec::new();
            let mut patterns = Vec::new();

            for (idx, entry) in self.dictionary.iter().enumerate() {
                let pattern = boundary_pattern(&entry.term);
                match Regex::new(&pattern) {
                    Ok(regex) => {
                        entry_ids.push(idx);
                        regexes.push(regex);
                        patterns.push(pattern);
                    }
                    Err(e) => log::warn!("skipping term {:?}: {}", entry.term, e),
                }
            }

            let prefilter = match RegexSet::new(&patterns) {
                Ok(set) => Some(set),
                Err(e) => {
                    log::warn!("prefilter unavailable, scanning every term: {}", e);
                    None
                }
            };

            log::debug!(
                "compiled {} term matchers at revision {}",
                regexes.len(),
                self.revision
            );

            BoundaryMatchers {
                entry_ids,
                regexes,
                prefilter,
            }
        })
    }

    fn selection(&self) -> &SelectionMatcher {
        self.selection.get_or_init(|| {
            let mut patterns: Vec<String> = Vec::new();
            let mut pattern_entries: Vec<Vec<usize>> = Vec::new();

            for (idx, entry) in self.dictionary.iter().enumerate() {
                let lowered = entry.term.to_lowercase();
                match patterns.iter().position(|p| *p == lowered) {
                    Some(pid) => pattern_entries[pid].push(idx),
                    None => {
                        patterns.push(lowered);
                        pattern_entries.push(vec![idx]);
                    }
                }
            }

            let automaton = if patterns.is_empty() {
                None
            } else {
                AhoCorasickBuilder::new()
                    .match_kind(MatchKind::Standard)
                    .build(&patterns)
                    .map_err(|e| log::warn!("failed to build selection automaton: {}", e))
                    .ok()
            };

            SelectionMatcher {
                automaton,
                pattern_entries,
            }
        })
    }

    /// Every word-boundary occurrence of every term, sorted by `start`
    pub fn find_all(&self, text: &str) -> Vec<MatchSpan> {
        if self.dictionary.is_empty() || text.is_empty() {
            return Vec::new();
        }

        let matchers = self.boundary();
        let candidates: Vec<usize> = match &matchers.prefilter {
            Some(set) => set.matches(text).into_iter().collect(),
            None => (0..matchers.regexes.len()).collect(),
        };

        let entries: Vec<&TermEntry> = self.dictionary.iter().collect();
        let mut spans: Vec<(usize, MatchSpan)> = Vec::new();

        for cid in candidates {
            let entry_idx = matchers.entry_ids[cid];
            let term = &entries[entry_idx].term;
            for mat in matchers.regexes[cid].find_iter(text) {
                if mat.start() < mat.end() {
                    spans.push((
                        entry_idx,
                        MatchSpan {
                            term: term.clone(),
                            start: mat.start(),
                            end: mat.end(),
                        },
                    ));
                }
            }
        }

        // Left to right; ties keep dictionary order
        spans.sort_by(|(ia, a), (ib, b)| a.start.cmp(&b.start).then(a.end.cmp(&b.end)).then(ia.cmp(ib)));
        spans.into_iter().map(|(_, span)| span).collect()
    }

    /// Entries whose term occurs anywhere in `selected_text`, in dictionary order
    pub fn find_in_selection(&self, selected_text: &str) -> Vec<TermEntry> {
        if self.dictionary.is_empty() || selected_text.is_empty() {
            return Vec::new();
        }

        let matcher = self.selection();
        let automaton = match &matcher.automaton {
            Some(a) => a,
            None => return Vec::new(),
        };

        let haystack = selected_text.to_lowercase();
        let mut hits: BTreeSet<usize> = BTreeSet::new();
        for mat in automaton.find_overlapping_iter(&haystack) {
            hits.extend(matcher.pattern_entries[mat.pattern().as_usize()].iter().copied());
        }

        self.dictionary
            .iter()
            .enumerate()
            .filter(|(idx, _)| hits.contains(idx))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn definition(&self, term: &str) -> Option<&Definition> {
        self.dictionary.get(term).map(|e| &e.definition)
    }
}

// =============================================================================
// TermIndex
// =============================================================================

/// Owner of the active dictionary snapshot
pub struct TermIndex {
    active: Rc<Snapshot>,
}

impl Default for TermIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TermIndex {
    pub fn new() -> Self {
        Self {
            active: Rc::new(Snapshot::new(0, Dictionary::new())),
        }
    }

    /// Replace the active dictionary wholesale and bump the revision.
    /// Does not trigger a re-scan.
    pub fn load(&mut self, dictionary: Dictionary) -> u64 {
        let revision = self.active.revision + 1;
        log::info!("loaded {} terms (revision {})", dictionary.len(), revision);
        self.active = Rc::new(Snapshot::new(revision, dictionary));
        revision
    }

    pub fn revision(&self) -> u64 {
        self.active.revision
    }

    /// Shared handle to the current snapshot
    pub fn snapshot(&self) -> Rc<Snapshot> {
        Rc::clone(&self.active)
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.active.dictionary
    }

    pub fn term_count(&self) -> usize {
        self.active.dictionary.len()
    }

    pub fn find_all(&self, text: &str) -> Vec<MatchSpan> {
        self.active.find_all(text)
    }

    pub fn find_in_selection(&self, selected_text: &str) -> Vec<TermEntry> {
        self.active.find_in_selection(selected_text)
    }

    pub fn definition(&self, term: &str) -> Option<&Definition> {
        self.active.definition(term)
    }
}

// =============================================================================
// Tests
// =============================================================================
