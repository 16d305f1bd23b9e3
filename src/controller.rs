//! Controller: wires the engine to its collaborators
//!
//! Owns the `TermIndex` and the scanners for one content source, reads the
//! dictionary and settings from a key-value store, reacts to storage and
//! message events, and exposes the boundary commands (enable/disable, add
//! term, delete term) plus the selection path.
//!
//! # Content sources
//! - Static page: one inline scanner over the DOM.
//! - Structured document: an overlay scanner fed by a fetched document
//!   model. While no document is available (fetch failed or timed out) the
//!   inline scanner runs over whatever DOM text is visible instead.
//!
//! Time is passed in explicitly; the host calls `tick` from its timers.

use instant::Instant;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{FetchFailure, GlossaryError, Result};
use crate::protocol::{Message, Settings, SETTINGS_KEY, TERMS_KEY};
use crate::render::{
    ActiveWidget, IndicatorWidget, InlineRenderer, OverlayRenderer, Rect, SelectionContext,
    SelectionWidget, SurfaceGeometry, Target, TextHost, TooltipContent,
    TooltipManager,
};
use crate::scanner::content::{ContentScanner, StepOutcome};
use crate::scanner::debounce::{DebouncedScheduler, ScanPolicy};
use crate::scanner::fetch::{DocumentFetcher, FetchRequest};
use crate::scanner::unit::NodeId;
use crate::terms::{Definition, Dictionary, TermIndex};

// =============================================================================
// Collaborators
// =============================================================================

/// Persistent key-value storage holding `glossaryTerms` and `settings`
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// Cross-context message channel (outgoing side)
pub trait Notifier {
    fn send(&mut self, message: Message);
}

/// Outbox: messages are queued for the host to deliver
impl Notifier for Vec<Message> {
    fn send(&mut self, message: Message) {
        self.push(message);
    }
}

/// In-memory store. Writes are also queued so a host can persist them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    writes: Vec<(String, Value)>,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Make every read fail (simulates an unavailable storage area)
    pub fn set_failing(&mut self, failing: bool) {
        self.fail_reads = failing;
    }

    /// Store a value without queueing it as a write (external change)
    pub fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn take_writes(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.writes)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        if self.fail_reads {
            return Err(GlossaryError::DictionaryLoad(format!("storage read of '{}' failed", key)));
        }
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value.clone());
        self.writes.push((key.to_string(), value));
        Ok(())
    }
}

/// Write the seed dictionary and default settings if nothing is stored yet.
/// Returns true when defaults were written.
pub fn seed_defaults<S: KeyValueStore>(store: &mut S) -> Result<bool> {
    if store.get(TERMS_KEY)?.is_some() {
        return Ok(false);
    }
    store.set(TERMS_KEY, Dictionary::seed().to_value())?;
    if store.get(SETTINGS_KEY)?.is_none() {
        store.set(SETTINGS_KEY, serde_json::to_value(Settings::default())?)?;
    }
    log::info!("seeded default glossary");
    Ok(true)
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    StaticPage,
    StructuredDocument { document_id: String },
}

/// What the host should do after a tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// A fetch to deliver; hand the reply to `on_fetch_response`
    pub fetch: Option<FetchRequest>,
    /// The selection settle delay elapsed; read the selection and call
    /// `on_selection`
    pub read_selection: bool,
    /// A scan finished during this tick
    pub scan_finished: bool,
    /// Work is still pending; tick again soon
    pub busy: bool,
}

// =============================================================================
// Controller
// =============================================================================

pub struct Controller<H: TextHost, S: KeyValueStore, N: Notifier> {
    config: EngineConfig,
    source: ContentSource,
    index: TermIndex,
    settings: Settings,
    page: ContentScanner<Target<H>>,
    document: Option<ContentScanner<Target<H>>>,
    fetcher: DocumentFetcher,
    refetch: DebouncedScheduler,
    tooltips: TooltipManager,
    selection: SelectionWidget,
    indicator: IndicatorWidget,
    selection_due: Option<Instant>,
    store: S,
    notifier: N,
}

impl<H: TextHost, S: KeyValueStore, N: Notifier> Controller<H, S, N> {
    pub fn new(host: H, store: S, notifier: N, source: ContentSource, config: EngineConfig) -> Self {
        let debounced = ScanPolicy::Debounced(Duration::from_millis(config.debounce_ms));
        let page_policy = match source {
            ContentSource::StaticPage if config.immediate_static_pages => ScanPolicy::Immediate,
            _ => debounced,
        };
        let document = match source {
            ContentSource::StructuredDocument { .. } => Some(ContentScanner::new(
                Target::Overlay(OverlayRenderer::new(config.overlay.clone())),
                debounced,
                config.scan_chunk_size,
            )),
            ContentSource::StaticPage => None,
        };
        let grace = Duration::from_millis(config.tooltip_grace_ms);

        Self {
            page: ContentScanner::new(
                Target::Inline(InlineRenderer::new(host)),
                page_policy,
                config.scan_chunk_size,
            ),
            document,
            fetcher: DocumentFetcher::new(Duration::from_millis(config.fetch_timeout_ms)),
            refetch: DebouncedScheduler::new(debounced),
            tooltips: TooltipManager::new(grace),
            selection: SelectionWidget::new(config.widget.clone(), grace),
            indicator: IndicatorWidget::default(),
            selection_due: None,
            index: TermIndex::new(),
            settings: Settings::default(),
            source,
            config,
            store,
            notifier,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    pub fn index(&self) -> &TermIndex {
        &self.index
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn indicator(&self) -> &IndicatorWidget {
        &self.indicator
    }

    pub fn selection_widget(&self) -> Option<&ActiveWidget> {
        self.selection.current()
    }

    pub fn page_scanner(&self) -> &ContentScanner<Target<H>> {
        &self.page
    }

    pub fn document_scanner(&self) -> Option<&ContentScanner<Target<H>>> {
        self.document.as_ref()
    }

    pub fn host(&self) -> Option<&H> {
        self.page.target().as_inline().map(InlineRenderer::host)
    }

    pub fn host_mut(&mut self) -> Option<&mut H> {
        self.page.target_mut().as_inline_mut().map(InlineRenderer::host_mut)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// Highlighting is on for this source
    pub fn is_active(&self) -> bool {
        match self.source {
            ContentSource::StaticPage => self.settings.enabled,
            ContentSource::StructuredDocument { .. } => {
                self.settings.enabled && self.settings.google_docs_enabled
            }
        }
    }

    pub fn term_count(&self) -> usize {
        self.index.term_count()
    }

    pub fn matches_found(&self) -> usize {
        self.page.matches_found() + self.document.as_ref().map_or(0, |d| d.matches_found())
    }

    fn document_available(&self) -> bool {
        self.document
            .as_ref()
            .and_then(|d| d.target().as_overlay())
            .map_or(false, OverlayRenderer::has_document)
    }

    /// The inline scanner is used for static pages, and for structured
    /// sources only while no document content is available
    fn page_scanning_enabled(&self) -> bool {
        match self.source {
            ContentSource::StaticPage => true,
            ContentSource::StructuredDocument { .. } => !self.document_available(),
        }
    }

    // -------------------------------------------------------------------------
    // Startup and storage
    // -------------------------------------------------------------------------

    /// Read settings and the dictionary, then schedule the first scan (or
    /// fetch). Storage failures degrade to defaults and an empty dictionary.
    pub fn start(&mut self, now: Instant) -> Option<FetchRequest> {
        if let Err(e) = seed_defaults(&mut self.store) {
            log::warn!("could not seed defaults: {}", e);
        }

        self.settings = match self.store.get(SETTINGS_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("malformed settings, using defaults: {}", e);
                Settings::default()
            }),
            Ok(None) => Settings::default(),
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Settings::default()
            }
        };

        let terms = match self.store.get(TERMS_KEY) {
            Ok(value) => value.unwrap_or(Value::Null),
            Err(e) => {
                log::warn!("{}; starting with an empty dictionary", e);
                Value::Null
            }
        };
        self.load_dictionary_value(terms, now);
        self.indicator.set_enabled(self.is_active());

        log::info!(
            "started on {:?}: {} term(s), enabled={}",
            self.source,
            self.term_count(),
            self.is_active()
        );

        if !self.is_active() {
            return None;
        }
        self.request_content(now)
    }

    fn request_content(&mut self, now: Instant) -> Option<FetchRequest> {
        match &self.source {
            ContentSource::StaticPage => {
                self.page.invalidate(now);
                None
            }
            ContentSource::StructuredDocument { document_id } => {
                let document_id = document_id.clone();
                // Visible DOM text is scanned until the document arrives
                if !self.document_available() {
                    self.page.invalidate(now);
                }
                Some(self.fetcher.begin(&document_id, now))
            }
        }
    }

    /// Load a dictionary from its storage representation. Malformed data
    /// falls back to an empty dictionary.
    pub fn load_dictionary_value(&mut self, value: Value, now: Instant) -> u64 {
        let dictionary = Dictionary::from_value(value).unwrap_or_else(|e| {
            log::warn!("{}; falling back to an empty dictionary", e);
            Dictionary::new()
        });
        self.load_dictionary(dictionary, now)
    }

    /// Swap in a new dictionary and rescan everything
    pub fn load_dictionary(&mut self, dictionary: Dictionary, now: Instant) -> u64 {
        let revision = self.index.load(dictionary);
        self.indicator
            .set_counts(self.indicator.matches_found, self.index.term_count());
        if self.is_active() {
            if self.page_scanning_enabled() {
                self.page.invalidate(now);
            }
            if let Some(document) = &mut self.document {
                document.invalidate(now);
            }
        }
        revision
    }

    /// A storage key changed outside this context
    pub fn on_storage_changed(&mut self, key: &str, value: Value, now: Instant) -> Option<FetchRequest> {
        match key {
            TERMS_KEY => {
                self.load_dictionary_value(value, now);
                None
            }
            SETTINGS_KEY => match serde_json::from_value::<Settings>(value) {
                Ok(settings) => self.apply_settings(settings, now),
                Err(e) => {
                    log::warn!("ignoring malformed settings change: {}", e);
                    None
                }
            },
            _ => None,
        }
    }

    /// Handle an incoming message. Returns a reply when one is expected.
    pub fn on_message(&mut self, message: Message, now: Instant) -> Option<Value> {
        match message {
            Message::TermsUpdated { terms } => {
                self.load_dictionary(terms, now);
                None
            }
            Message::GetSettings => serde_json::to_value(&self.settings).ok(),
            other => {
                log::debug!("ignoring message {:?}", other);
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Boundary commands
    // -------------------------------------------------------------------------

    fn apply_settings(&mut self, settings: Settings, now: Instant) -> Option<FetchRequest> {
        let was_active = self.is_active();
        self.settings = settings;
        let active = self.is_active();
        self.indicator.set_enabled(active);

        match (was_active, active) {
            (true, false) => {
                self.clear_highlights();
                None
            }
            (false, true) => self.request_content(now),
            _ => None,
        }
    }

    fn clear_highlights(&mut self) {
        let cleared = self.page.clear() + self.document.as_mut().map_or(0, |d| d.clear());
        self.tooltips.clear();
        self.selection.dismiss();
        self.selection_due = None;
        self.indicator.set_counts(0, self.index.term_count());
        log::info!("highlighting disabled, {} unit(s) cleared", cleared);
    }

    /// Flip the enabled flag, persist it, and clear or rescan
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) -> Option<FetchRequest> {
        let settings = Settings {
            enabled,
            ..self.settings.clone()
        };
        match serde_json::to_value(&settings) {
            Ok(value) => {
                if let Err(e) = self.store.set(SETTINGS_KEY, value) {
                    log::warn!("could not persist settings: {}", e);
                }
            }
            Err(e) => log::warn!("could not encode settings: {}", e),
        }
        self.apply_settings(settings, now)
    }

    pub fn toggle(&mut self, now: Instant) -> Option<FetchRequest> {
        self.set_enabled(!self.settings.enabled, now)
    }

    fn publish(&mut self, dictionary: Dictionary, now: Instant) -> Result<()> {
        self.store.set(TERMS_KEY, dictionary.to_value())?;
        self.notifier.send(Message::TermsUpdated {
            terms: dictionary.clone(),
        });
        self.load_dictionary(dictionary, now);
        Ok(())
    }

    /// Add or replace a term, persist, and notify other contexts
    pub fn add_term(&mut self, term: &str, definition: impl Into<Definition>, now: Instant) -> Result<()> {
        let term = term.trim();
        if term.is_empty() {
            return Err(GlossaryError::DictionaryLoad("term must not be empty".to_string()));
        }
        let mut dictionary = self.index.dictionary().clone();
        dictionary.insert(term, definition);
        self.publish(dictionary, now)
    }

    /// Delete a term by exact spelling. Returns false if it was not present.
    pub fn delete_term(&mut self, term: &str, now: Instant) -> Result<bool> {
        let mut dictionary = self.index.dictionary().clone();
        if dictionary.remove(term).is_none() {
            return Ok(false);
        }
        self.publish(dictionary, now)?;
        Ok(true)
    }

    /// Open or close the side panel from the indicator
    pub fn toggle_side_panel(&mut self) {
        let message = self.indicator.toggle_panel();
        self.notifier.send(message);
    }

    // -------------------------------------------------------------------------
    // Content events
    // -------------------------------------------------------------------------

    /// The host observed a content mutation
    pub fn on_content_changed(&mut self, now: Instant) {
        if !self.is_active() {
            return;
        }
        if self.document.is_some() {
            self.refetch.request(now);
        }
        if self.page_scanning_enabled() {
            self.page.on_content_changed(now);
        }
    }

    /// Reply to a fetch issued by `start`/`tick`. On failure the engine keeps
    /// whatever content it already has and scans the visible DOM.
    pub fn on_fetch_response(&mut self, request_id: u64, response: Value, now: Instant) -> Result<()> {
        match self.fetcher.resolve_json(request_id, response, now) {
            Ok(model) => {
                if let Some(document) = &mut self.document {
                    if let Some(overlay) = document.target_mut().as_overlay_mut() {
                        overlay.set_document(&model);
                    }
                    document.invalidate(now);
                }
                // Document content takes over from the DOM fallback
                if self.page.clear() > 0 {
                    self.tooltips.clear();
                }
                log::debug!("document loaded for request #{}", request_id);
                Ok(())
            }
            Err(e) => {
                self.fetch_failed(&e, now);
                Err(e)
            }
        }
    }

    fn fetch_failed(&mut self, error: &GlossaryError, now: Instant) {
        if matches!(
            error,
            GlossaryError::ContentFetch {
                reason: FetchFailure::Superseded,
                ..
            }
        ) {
            log::debug!("{}", error);
            return;
        }
        log::warn!("{}; scanning visible content instead", error);
        if self.is_active() && self.page_scanning_enabled() {
            self.page.invalidate(now);
        }
    }

    /// Mirror the painted tiles of a structured editor
    pub fn set_surfaces(&mut self, surfaces: Vec<SurfaceGeometry>, now: Instant) {
        let active = self.is_active();
        let Some(document) = &mut self.document else {
            return;
        };
        let changed = document
            .target_mut()
            .as_overlay_mut()
            .map_or(false, |overlay| overlay.set_surfaces(surfaces));
        if changed && active {
            document.invalidate(now);
        }
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Pointer released: read the selection once it settles
    pub fn on_pointer_up(&mut self, now: Instant) {
        self.selection_due = Some(now + Duration::from_millis(self.config.selection_settle_ms));
    }

    /// Key released: only arrows and Shift can change the selection
    pub fn on_key_up(&mut self, key: &str, now: Instant) {
        if crate::render::is_selection_key(key) {
            self.on_pointer_up(now);
        }
    }

    /// Look up terms in the user's selection and show the widget.
    /// An empty selection dismisses the widget.
    pub fn on_selection(
        &mut self,
        selected_text: &str,
        rect: Rect,
        page_margin: Option<f64>,
        scroll_y: f64,
    ) -> Option<&ActiveWidget> {
        if !self.is_active() || selected_text.trim().is_empty() {
            self.selection.dismiss();
            return None;
        }
        let context = SelectionContext {
            selected_text: selected_text.to_string(),
            bounding_rect: rect,
            matched_terms: self.index.find_in_selection(selected_text),
        };
        Some(self.selection.show_selection_widget(&context, page_margin, scroll_y))
    }

    pub fn dismiss_selection(&mut self) {
        self.selection.dismiss();
    }

    /// "Add as new term" in the selection widget
    pub fn selection_add_term(&mut self) -> bool {
        match self.selection.add_term() {
            Some(message) => {
                self.notifier.send(message);
                true
            }
            None => false,
        }
    }

    pub fn pointer_enter_selection_widget(&mut self) {
        self.selection.pointer_enter_widget();
    }

    pub fn pointer_leave_selection_widget(&mut self, now: Instant) {
        self.selection.pointer_leave_widget(now);
    }

    pub fn pointer_enter_selection_popup(&mut self) {
        self.selection.pointer_enter_popup();
    }

    pub fn pointer_leave_selection_popup(&mut self, now: Instant) {
        self.selection.pointer_leave_popup(now);
    }

    pub fn selection_popup_visible(&self) -> bool {
        self.selection.popup_visible()
    }

    // -------------------------------------------------------------------------
    // Tooltips
    // -------------------------------------------------------------------------

    pub fn pointer_enter_marker(&mut self, marker: NodeId) -> Option<&TooltipContent> {
        self.tooltips.pointer_enter_marker(marker)
    }

    pub fn pointer_leave_marker(&mut self, now: Instant) {
        self.tooltips.pointer_leave_marker(now);
    }

    pub fn pointer_enter_tooltip(&mut self) {
        self.tooltips.pointer_enter_panel();
    }

    pub fn pointer_leave_tooltip(&mut self, now: Instant) {
        self.tooltips.pointer_leave_panel(now);
    }

    pub fn visible_tooltip(&self) -> Option<(NodeId, &TooltipContent)> {
        self.tooltips.visible()
    }

    fn sync_tooltips(&mut self) {
        let Some(inline) = self.page.target().as_inline() else {
            return;
        };
        let index = &self.index;
        self.tooltips
            .sync(inline.markers(), |term| index.definition(term).cloned());
    }

    // -------------------------------------------------------------------------
    // Time
    // -------------------------------------------------------------------------

    /// Advance timers: fetch deadline, refetch debounce, scans, hover grace
    /// periods and the selection settle delay
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        if let Some(error) = self.fetcher.poll(now) {
            self.fetch_failed(&error, now);
        }

        if self.refetch.poll(now) && self.is_active() {
            if let ContentSource::StructuredDocument { document_id } = &self.source {
                let document_id = document_id.clone();
                report.fetch = Some(self.fetcher.begin(&document_id, now));
            }
        }

        if self.is_active() {
            if self.page.tick(now, &self.index) == StepOutcome::Finished {
                report.scan_finished = true;
            }
            if let Some(document) = &mut self.document {
                if document.tick(now, &self.index) == StepOutcome::Finished {
                    report.scan_finished = true;
                }
            }
        }

        if report.scan_finished {
            self.sync_tooltips();
            self.indicator
                .set_counts(self.matches_found(), self.index.term_count());
        }

        self.tooltips.poll(now);
        self.selection.poll(now);

        if let Some(due) = self.selection_due {
            if now >= due {
                self.selection_due = None;
                report.read_selection = true;
            }
        }

        report.busy = self.page.is_scan_pending()
            || self.document.as_ref().map_or(false, |d| d.is_scan_pending())
            || self.fetcher.is_pending()
            || self.refetch.is_pending()
            || self.selection_due.is_some();
        report
    }

    /// Time until the next timer is due, for hosts that sleep between ticks
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        [
            self.page.time_until_due(now),
            self.document.as_ref().and_then(|d| d.time_until_due(now)),
            self.fetcher.time_until_deadline(now),
            self.refetch.time_until_due(now),
            self.selection_due
                .map(|due| if due > now { due - now } else { Duration::ZERO }),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Tick until no scan work remains at `now`
    pub fn settle(&mut self, now: Instant) -> TickReport {
        let mut last = self.tick(now);
        while self.page.is_scanning() || self.document.as_ref().map_or(false, |d| d.is_scanning()) {
            let next = self.tick(now);
            last.scan_finished |= next.scan_finished;
            last.fetch = last.fetch.or(next.fetch);
            last.read_selection |= next.read_selection;
            last.busy = next.busy;
        }
        last
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NodeTree;
    use serde_json::json;

    type TestController = Controller<NodeTree, MemoryStore, Vec<Message>>;

    fn page(texts: &[&str]) -> NodeTree {
        let mut tree = NodeTree::new();
        let body = tree.body();
        for text in texts {
            let p = tree.append_element(body, "p");
            tree.append_text(p, text);
        }
        tree
    }

    fn static_controller(texts: &[&str], store: MemoryStore) -> TestController {
        Controller::new(
            page(texts),
            store,
            Vec::new(),
            ContentSource::StaticPage,
            EngineConfig::static_page(),
        )
    }

    fn markup(controller: &TestController) -> String {
        let host = controller.host().unwrap();
        host.to_markup(host.body())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // =========================================================================
    // Requirement 1: startup
    // =========================================================================

    #[test]
    fn test_first_start_seeds_and_scans() {
        let t0 = Instant::now();
        let mut controller = static_controller(&["Our ROI and KPI", "B2B sales"], MemoryStore::new());
        assert!(controller.start(t0).is_none());
        controller.settle(t0);

        assert_eq!(controller.term_count(), 3);
        assert_eq!(controller.matches_found(), 3);
        assert_eq!(controller.indicator().matches_found, 3);
        assert_eq!(controller.indicator().term_count, 3);
        assert!(controller.store().get(TERMS_KEY).unwrap().is_some());
    }

    #[test]
    fn test_storage_failure_falls_back_to_empty() {
        let t0 = Instant::now();
        let mut store = MemoryStore::new();
        store.set_failing(true);
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);

        assert_eq!(controller.term_count(), 0);
        assert_eq!(controller.matches_found(), 0);
        assert!(controller.is_active());
    }

    #[test]
    fn test_malformed_terms_fall_back_to_empty() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!(["not", "a", "map"]));
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);
        assert_eq!(controller.term_count(), 0);
    }

    #[test]
    fn test_disabled_at_start_does_nothing() {
        let t0 = Instant::now();
        let store = MemoryStore::new()
            .with(TERMS_KEY, json!({"ROI": "Return on Investment"}))
            .with(SETTINGS_KEY, json!({"enabled": false}));
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 0);
        assert_eq!(controller.indicator().label(), "Highlighting off");
    }

    // =========================================================================
    // Requirement 2: enable / disable
    // =========================================================================

    #[test]
    fn test_disable_clears_and_enable_rescans() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!({"ROI": "Return on Investment"}));
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 1);

        controller.set_enabled(false, t0);
        assert_eq!(controller.matches_found(), 0);
        assert_eq!(controller.indicator().matches_found, 0);
        assert_eq!(markup(&controller), "<body><p>Our ROI</p></body>");
        let saved = controller.store().get(SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(saved["enabled"], json!(false));

        // Mutations while disabled are ignored
        controller.on_content_changed(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 0);

        controller.toggle(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 1);
    }

    #[test]
    fn test_settings_change_from_storage() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!({"ROI": "Return on Investment"}));
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);

        controller.on_storage_changed(SETTINGS_KEY, json!({"enabled": false, "googleDocsEnabled": true}), t0);
        assert_eq!(controller.matches_found(), 0);
        assert!(!controller.is_active());
    }

    // =========================================================================
    // Requirement 3: dictionary changes
    // =========================================================================

    #[test]
    fn test_add_and_delete_term() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!({"ROI": "Return on Investment"}));
        let mut controller = static_controller(&["EBITDA and ROI"], store);
        controller.start(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 1);

        controller
            .add_term("EBITDA", "Earnings before interest, taxes, depreciation, and amortization", t0)
            .unwrap();
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 2);
        assert_eq!(controller.indicator().term_count, 2);
        assert!(matches!(
            controller.notifier().last(),
            Some(Message::TermsUpdated { terms }) if terms.len() == 2
        ));

        assert!(controller.delete_term("ROI", t0).unwrap());
        assert!(!controller.delete_term("ROI", t0).unwrap());
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 1);
        assert!(!markup(&controller).contains("data-term=\"ROI\""));

        let stored = controller.store().get(TERMS_KEY).unwrap().unwrap();
        assert_eq!(stored, json!({"EBITDA": "Earnings before interest, taxes, depreciation, and amortization"}));
        assert!(controller.add_term("  ", "x", t0).is_err());
    }

    #[test]
    fn test_terms_updated_message() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!({"ROI": "Return on Investment"}));
        let mut controller = static_controller(&["KPI review"], store);
        controller.start(t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 0);

        let message: Message =
            serde_json::from_value(json!({"type": "termsUpdated", "terms": {"KPI": "Key Performance Indicator"}}))
                .unwrap();
        controller.on_message(message, t0);
        controller.settle(t0);
        assert_eq!(controller.matches_found(), 1);

        let reply = controller.on_message(Message::GetSettings, t0).unwrap();
        assert_eq!(reply["enabled"], json!(true));
    }

    // =========================================================================
    // Requirement 4: selection
    // =========================================================================

    #[test]
    fn test_selection_lookup_is_substring() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(TERMS_KEY, json!({"KPI": "Key Performance Indicator"}));
        let mut controller = static_controller(&[], store);
        controller.start(t0);

        controller.on_key_up("a", t0);
        assert!(!controller.tick(t0 + ms(100)).read_selection);

        controller.on_pointer_up(t0);
        assert!(!controller.tick(t0 + ms(49)).read_selection);
        assert!(controller.tick(t0 + ms(50)).read_selection);

        let widget = controller
            .on_selection("our KPIs are great", Rect::new(100.0, 300.0, 80.0, 16.0), None, 0.0)
            .unwrap();
        match &widget.view {
            crate::render::WidgetView::TermsFound { entries } => assert_eq!(entries[0].term, "KPI"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(widget.placement.left, 32.0);
    }

    #[test]
    fn test_add_term_from_selection() {
        let t0 = Instant::now();
        let mut controller = static_controller(&[], MemoryStore::new());
        controller.start(t0);

        controller.on_selection("EBITDA", Rect::default(), Some(96.0), 0.0);
        assert!(controller.selection_add_term());
        assert_eq!(
            controller.notifier().last(),
            Some(&Message::OpenPopup {
                prefilled_text: "EBITDA".to_string()
            })
        );
        assert!(controller.selection_widget().is_none());

        assert!(controller.on_selection("   ", Rect::default(), None, 0.0).is_none());
    }

    // =========================================================================
    // Requirement 5: tooltips
    // =========================================================================

    #[test]
    fn test_markers_get_tooltips() {
        let t0 = Instant::now();
        let store = MemoryStore::new().with(
            TERMS_KEY,
            json!({"ROI": {"fullTitle": "Return on Investment", "description": "Gain relative to cost", "team": "Finance"}}),
        );
        let mut controller = static_controller(&["Our ROI"], store);
        controller.start(t0);
        controller.settle(t0);

        let inline = controller.page_scanner().target().as_inline().unwrap();
        let (marker, _) = inline.markers().next().unwrap();

        let content = controller.pointer_enter_marker(marker).unwrap();
        assert_eq!(content.summary.full_title, "Return on Investment");
        assert_eq!(content.summary.team, "Finance");
        assert_eq!(content.summary.author, "Unknown");

        controller.pointer_leave_marker(t0);
        controller.pointer_enter_tooltip();
        controller.tick(t0 + ms(500));
        assert!(controller.visible_tooltip().is_some());
        controller.pointer_leave_tooltip(t0 + ms(500));
        controller.tick(t0 + ms(600));
        assert!(controller.visible_tooltip().is_none());
    }

    // =========================================================================
    // Requirement 6: structured documents
    // =========================================================================

    fn structured(texts: &[&str]) -> TestController {
        let store = MemoryStore::new().with(TERMS_KEY, json!({"B2B": "Business to Business"}));
        Controller::new(
            page(texts),
            store,
            Vec::new(),
            ContentSource::StructuredDocument {
                document_id: "doc-1".to_string(),
            },
            EngineConfig::structured_document(),
        )
    }

    fn letter() -> SurfaceGeometry {
        SurfaceGeometry {
            width: 612.0,
            height: 792.0,
            ..SurfaceGeometry::default()
        }
    }

    #[test]
    fn test_structured_fetch_renders_overlay() {
        let t0 = Instant::now();
        let mut controller = structured(&["We sell B2B"]);
        let request = controller.start(t0).unwrap();
        assert_eq!(
            request.message,
            Message::GetDocumentContent {
                document_id: "doc-1".to_string()
            }
        );
        controller.set_surfaces(vec![letter()], t0);

        let reply = json!({"content": {"body": {"content": [
            {"paragraph": {"elements": [{"textRun": {"content": "We sell B2B and B2C products\n", "startIndex": 1}}]}}
        ]}}});
        controller.on_fetch_response(request.request_id, reply, t0).unwrap();

        let later = t0 + ms(600);
        controller.settle(later);
        let document = controller.document_scanner().unwrap();
        assert_eq!(document.matches_found(), 1);
        let overlay = document.target().as_overlay().unwrap();
        assert_eq!(overlay.surface(0).unwrap().stroke_count(), 1);
        // DOM fallback was cleared once the document arrived
        assert_eq!(controller.page_scanner().matches_found(), 0);
    }

    #[test]
    fn test_surface_change_ignored_when_documents_disabled() {
        let t0 = Instant::now();
        let mut controller = structured(&["We sell B2B"]);
        let request = controller.start(t0).unwrap();
        controller.set_surfaces(vec![letter()], t0);
        let reply = json!({"content": {"body": {"content": [
            {"paragraph": {"elements": [{"textRun": {"content": "We sell B2B\n", "startIndex": 1}}]}}
        ]}}});
        controller.on_fetch_response(request.request_id, reply, t0).unwrap();
        controller.settle(t0 + ms(600));
        assert_eq!(controller.document_scanner().unwrap().matches_found(), 1);

        let later = t0 + ms(700);
        controller.on_storage_changed(SETTINGS_KEY, json!({"enabled": true, "googleDocsEnabled": false}), later);
        controller.set_surfaces(vec![letter(), letter()], later);

        let document = controller.document_scanner().unwrap();
        assert!(!document.is_scan_pending());
        controller.settle(later + ms(600));
        assert_eq!(controller.document_scanner().unwrap().matches_found(), 0);
    }

    #[test]
    fn test_fetch_timeout_falls_back_to_dom() {
        let t0 = Instant::now();
        let mut controller = structured(&["We sell B2B"]);
        controller.start(t0).unwrap();

        // Debounced DOM scan runs while the fetch is outstanding
        controller.settle(t0 + ms(500));
        assert_eq!(controller.page_scanner().matches_found(), 1);

        let report = controller.tick(t0 + Duration::from_secs(30));
        assert!(report.fetch.is_none());
        controller.settle(t0 + Duration::from_secs(31));
        assert_eq!(controller.matches_found(), 1);
        assert!(!controller.document_scanner().unwrap().target().as_overlay().unwrap().has_document());
    }

    #[test]
    fn test_remote_error_is_reported() {
        let t0 = Instant::now();
        let mut controller = structured(&["We sell B2B"]);
        let request = controller.start(t0).unwrap();
        let err = controller
            .on_fetch_response(request.request_id, json!({"error": "not signed in"}), t0)
            .unwrap_err();
        assert_eq!(err.code(), "CONTENT_FETCH_FAILURE");
        controller.settle(t0 + ms(500));
        assert_eq!(controller.matches_found(), 1);
    }

    #[test]
    fn test_mutations_debounce_refetch() {
        let t0 = Instant::now();
        let mut controller = structured(&[]);
        let request = controller.start(t0).unwrap();
        controller
            .on_fetch_response(request.request_id, json!({"content": {"body": {"content": []}}}), t0)
            .unwrap();

        let mut fetches = 0;
        for i in 0..10 {
            controller.on_content_changed(t0 + ms(i * 30));
            if controller.tick(t0 + ms(i * 30)).fetch.is_some() {
                fetches += 1;
            }
        }
        if controller.tick(t0 + ms(270 + 500)).fetch.is_some() {
            fetches += 1;
        }
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_indicator_side_panel() {
        let mut controller = static_controller(&[], MemoryStore::new());
        controller.toggle_side_panel();
        controller.toggle_side_panel();
        assert_eq!(
            controller.notifier().as_slice(),
            &[Message::OpenSidePanel, Message::CloseSidePanel]
        );
    }
}
