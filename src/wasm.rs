//! Browser bindings
//!
//! - `WebTextHost`: `TextHost` over the live DOM
//! - `GlossaryEngine`: the controller exposed to JavaScript
//! - `withTimeout`: races a promise against a timer
//!
//! Storage and messaging stay on the JavaScript side. The engine is handed
//! the stored values at `start`, queues writes and outgoing messages, and
//! the host drains them with `takeWrites` / `takeMessages`.

use instant::Instant;
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::config::EngineConfig;
use crate::controller::{ContentSource, Controller, MemoryStore, TickReport};
use crate::error::{GlossaryError, Result};
use crate::protocol::{Message, SETTINGS_KEY, TERMS_KEY};
use crate::render::{
    assemble_selection_text, NodeKind, ParagraphBox, ProbeStatus, ReadinessProbe, Rect, RenderedMarkup, Segment, Stroke, SurfaceGeometry,
    TextHost, CONTAINER_CLASS, MARKER_CLASS, TERM_ATTR,
};
use crate::scanner::fetch::FetchRequest;
use crate::scanner::unit::{to_utf16_spans, NodeId};
use crate::terms::{Definition, Dictionary, TermIndex};

/// Property stamped on DOM nodes so the same node keeps its id
const ID_PROPERTY: &str = "__glossarlyId";

// =============================================================================
// WebTextHost
// =============================================================================

pub struct WebTextHost {
    document: web_sys::Document,
    nodes: RefCell<HashMap<usize, web_sys::Node>>,
    next_id: Cell<usize>,
}

impl WebTextHost {
    pub fn new() -> Result<Self> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| GlossaryError::RenderTargetMissing("window.document".to_string()))?;
        Ok(Self {
            document,
            nodes: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        })
    }

    /// Id for `node`, registering it on first sight
    pub fn id_of(&self, node: &web_sys::Node) -> NodeId {
        if let Some(id) = js_sys::Reflect::get(node, &ID_PROPERTY.into())
            .ok()
            .and_then(|v| v.as_f64())
        {
            let id = id as usize;
            if self.nodes.borrow().get(&id).map_or(false, |known| known == node) {
                return NodeId(id);
            }
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.nodes.borrow_mut().insert(id, node.clone());
        js_sys::Reflect::set(node, &ID_PROPERTY.into(), &JsValue::from_f64(id as f64)).ok();
        NodeId(id)
    }

    pub fn node(&self, id: NodeId) -> Option<web_sys::Node> {
        self.nodes.borrow().get(&id.0).cloned()
    }

    /// Number of DOM nodes currently holding an id
    pub fn registered(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Release every node the page has taken out of the document.
    /// Returns how many slots were freed.
    pub fn prune_detached(&self) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|_, node| node.is_connected());
        before - nodes.len()
    }

    fn release(&self, id: NodeId) {
        self.nodes.borrow_mut().remove(&id.0);
    }

    fn attached(&self, id: NodeId) -> Result<web_sys::Node> {
        match self.node(id) {
            Some(node) if node.is_connected() => Ok(node),
            _ => Err(GlossaryError::StaleNode(id.0)),
        }
    }

    fn span(&self, class: &str) -> Result<web_sys::Element> {
        let element = self.document.create_element("span").map_err(js_failure)?;
        element.set_class_name(class);
        Ok(element)
    }
}

fn js_failure(err: JsValue) -> GlossaryError {
    GlossaryError::RenderTargetMissing(format!("{:?}", err))
}

impl TextHost for WebTextHost {
    fn root(&self) -> Option<NodeId> {
        // Every walk starts here
        let freed = self.prune_detached();
        if freed > 0 {
            log::debug!("released {} detached node(s)", freed);
        }
        let body: web_sys::Node = self.document.body()?.into();
        Some(self.id_of(&body))
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        let list = node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|child| self.id_of(&child))
            .collect()
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        let node = self.node(node)?;
        match node.node_type() {
            web_sys::Node::TEXT_NODE => Some(NodeKind::Text(node.text_content().unwrap_or_default())),
            web_sys::Node::ELEMENT_NODE => {
                let element = node.dyn_ref::<web_sys::Element>()?;
                Some(NodeKind::Element {
                    tag: element.tag_name().to_lowercase(),
                })
            }
            _ => None,
        }
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.node(node)
            .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
            .map_or(false, |e| e.class_list().contains(class))
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.node(node).map_or(false, |n| n.is_connected())
    }

    fn replace_with_markup(&mut self, node: NodeId, segments: &[Segment]) -> Result<RenderedMarkup> {
        let old = self.attached(node)?;
        let parent = old.parent_node().ok_or(GlossaryError::StaleNode(node.0))?;

        let container = self.span(CONTAINER_CLASS)?;
        let mut markers = Vec::new();
        for segment in segments {
            let child: web_sys::Node = match segment {
                Segment::Plain(text) => self.document.create_text_node(text).into(),
                Segment::Marker { term, text } => {
                    let marker = self.span(MARKER_CLASS)?;
                    marker.set_attribute(TERM_ATTR, term).map_err(js_failure)?;
                    marker.set_text_content(Some(text));
                    let marker: web_sys::Node = marker.into();
                    markers.push((self.id_of(&marker), term.clone()));
                    marker
                }
            };
            container.append_child(&child).map_err(js_failure)?;
        }

        let container: web_sys::Node = container.into();
        parent.replace_child(&container, &old).map_err(js_failure)?;
        self.release(node);
        Ok(RenderedMarkup {
            container: self.id_of(&container),
            markers,
        })
    }

    fn replace_with_text(&mut self, node: NodeId, text: &str) -> Result<NodeId> {
        let old = self.attached(node)?;
        let parent = old.parent_node().ok_or(GlossaryError::StaleNode(node.0))?;
        let restored: web_sys::Node = self.document.create_text_node(text).into();
        parent.replace_child(&restored, &old).map_err(js_failure)?;
        self.release(node);
        Ok(self.id_of(&restored))
    }
}

// =============================================================================
// Timed fetch
// =============================================================================

/// Resolve with `promise`, or reject with a timeout error after `timeout_ms`
#[wasm_bindgen(js_name = "withTimeout")]
pub async fn with_timeout(promise: js_sys::Promise, timeout_ms: u32) -> std::result::Result<JsValue, JsValue> {
    let timer = js_sys::Promise::new(&mut |_resolve, reject| {
        let fire = Closure::once_into_js(move || {
            let err = js_sys::Error::new(&format!("timed out after {}ms", timeout_ms));
            js_sys::Reflect::set(&err, &"code".into(), &"CONTENT_FETCH_FAILURE".into()).ok();
            reject.call1(&JsValue::NULL, &err).ok();
        });
        if let Some(window) = web_sys::window() {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(fire.unchecked_ref(), timeout_ms as i32)
                .ok();
        }
    });
    let race = js_sys::Promise::race(&js_sys::Array::of2(&promise, &timer));
    JsFuture::from(race).await
}

// =============================================================================
// Boundary helpers
// =============================================================================

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    // Plain objects rather than Maps for JSON values
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer)?)
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T> {
    Ok(serde_wasm_bindgen::from_value(value)?)
}

/// Log a failure instead of throwing into the host page
fn or_null(operation: &str, result: Result<JsValue>) -> JsValue {
    result.unwrap_or_else(|e| {
        log::warn!("{} failed: {}", operation, e);
        JsValue::NULL
    })
}

fn or_false(operation: &str, result: Result<bool>) -> bool {
    result.unwrap_or_else(|e| {
        log::warn!("{} failed: {}", operation, e);
        false
    })
}

fn fetch_to_js(request: Option<FetchRequest>) -> JsValue {
    match request {
        Some(request) => or_null("fetch request", to_js(&request)),
        None => JsValue::NULL,
    }
}

// =============================================================================
// One-shot matching
// =============================================================================

/// Match `text` against a `{ term: definition }` object. Offsets are UTF-16
/// code units, ready for DOM ranges.
#[wasm_bindgen(js_name = "findTerms")]
pub fn find_terms(terms: JsValue, text: &str) -> JsValue {
    let spans = from_js(terms).and_then(Dictionary::from_value).and_then(|dictionary| {
        let mut index = TermIndex::new();
        index.load(dictionary);
        to_js(&to_utf16_spans(text, &index.find_all(text)))
    });
    or_null("findTerms", spans)
}

// =============================================================================
// GlossaryEngine
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsTickReport {
    fetch: Option<FetchRequest>,
    read_selection: bool,
    scan_finished: bool,
    busy: bool,
    next_deadline_ms: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsSurface<'a> {
    geometry: &'a SurfaceGeometry,
    strokes: Vec<&'a Stroke>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsTooltip<'a> {
    term: &'a str,
    full_title: &'a str,
    description: &'a str,
    team: &'a str,
    author: &'a str,
    date: Option<&'a str>,
}

/// The engine for one page. Methods never throw; failures are logged and
/// reported as `null` / `false`.
#[wasm_bindgen]
pub struct GlossaryEngine {
    controller: Controller<WebTextHost, MemoryStore, Vec<Message>>,
    probe: ReadinessProbe,
}

#[wasm_bindgen]
impl GlossaryEngine {
    /// `documentId` selects the structured-document source; omit it for
    /// ordinary pages. `config` may be null for defaults. Throws only when
    /// there is no document to attach to.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, document_id: Option<String>) -> std::result::Result<GlossaryEngine, JsValue> {
        let (source, defaults) = match document_id {
            Some(document_id) => (
                ContentSource::StructuredDocument { document_id },
                EngineConfig::structured_document(),
            ),
            None => (ContentSource::StaticPage, EngineConfig::static_page()),
        };
        let config = if config.is_null() || config.is_undefined() {
            defaults
        } else {
            from_js(config).unwrap_or_else(|e| {
                log::warn!("invalid config, using defaults: {}", e);
                defaults
            })
        };

        let host = WebTextHost::new()?;
        let probe = ReadinessProbe::new(&config.readiness);
        Ok(Self {
            controller: Controller::new(host, MemoryStore::new(), Vec::new(), source, config),
            probe,
        })
    }

    /// Load `{ glossaryTerms, settings }` as read from storage and start.
    /// Returns a fetch request or null.
    #[wasm_bindgen(js_name = "start")]
    pub fn js_start(&mut self, stored: JsValue) -> JsValue {
        if !stored.is_null() && !stored.is_undefined() {
            match from_js::<Value>(stored) {
                Ok(stored) => {
                    for key in [TERMS_KEY, SETTINGS_KEY] {
                        if let Some(value) = stored.get(key) {
                            self.controller.store_mut().put(key, value.clone());
                        }
                    }
                }
                Err(e) => log::warn!("ignoring unreadable storage snapshot: {}", e),
            }
        }
        fetch_to_js(self.controller.start(Instant::now()))
    }

    #[wasm_bindgen(js_name = "onStorageChanged")]
    pub fn js_on_storage_changed(&mut self, key: &str, value: JsValue) -> JsValue {
        match from_js::<Value>(value) {
            Ok(value) => {
                self.controller.store_mut().put(key, value.clone());
                fetch_to_js(self.controller.on_storage_changed(key, value, Instant::now()))
            }
            Err(e) => {
                log::warn!("ignoring change to '{}': {}", key, e);
                JsValue::NULL
            }
        }
    }

    /// Returns the reply for messages that expect one, else null
    #[wasm_bindgen(js_name = "onMessage")]
    pub fn js_on_message(&mut self, message: JsValue) -> JsValue {
        let reply = from_js::<Message>(message).and_then(|message| {
            match self.controller.on_message(message, Instant::now()) {
                Some(reply) => to_js(&reply),
                None => Ok(JsValue::NULL),
            }
        });
        or_null("onMessage", reply)
    }

    #[wasm_bindgen(js_name = "setEnabled")]
    pub fn js_set_enabled(&mut self, enabled: bool) -> JsValue {
        fetch_to_js(self.controller.set_enabled(enabled, Instant::now()))
    }

    #[wasm_bindgen(js_name = "isActive")]
    pub fn js_is_active(&self) -> bool {
        self.controller.is_active()
    }

    /// `definition` is a string or `{ fullTitle, description, team, author, date }`
    #[wasm_bindgen(js_name = "addTerm")]
    pub fn js_add_term(&mut self, term: &str, definition: JsValue) -> bool {
        let added = from_js::<Definition>(definition)
            .and_then(|definition| self.controller.add_term(term, definition, Instant::now()))
            .map(|()| true);
        or_false("addTerm", added)
    }

    #[wasm_bindgen(js_name = "deleteTerm")]
    pub fn js_delete_term(&mut self, term: &str) -> bool {
        or_false("deleteTerm", self.controller.delete_term(term, Instant::now()))
    }

    #[wasm_bindgen(js_name = "onContentChanged")]
    pub fn js_on_content_changed(&mut self) {
        self.controller.on_content_changed(Instant::now());
    }

    /// Returns false when the reply carried no usable content; the engine
    /// has already fallen back to visible page text in that case
    #[wasm_bindgen(js_name = "onFetchResponse")]
    pub fn js_on_fetch_response(&mut self, request_id: u32, response: JsValue) -> bool {
        let response = from_js::<Value>(response).unwrap_or(Value::Null);
        self.controller
            .on_fetch_response(request_id as u64, response, Instant::now())
            .is_ok()
    }

    /// Poll for the editor before the first `setSurfaces`. Returns "ready",
    /// "gaveUp", or the number of milliseconds to wait before asking again.
    #[wasm_bindgen(js_name = "probeReadiness")]
    pub fn js_probe_readiness(&mut self, editor_present: bool, tile_count: u32) -> JsValue {
        match self.probe.check(editor_present, tile_count as usize) {
            ProbeStatus::Ready => "ready".into(),
            ProbeStatus::Waiting(wait) => JsValue::from_f64(wait.as_millis() as f64),
            ProbeStatus::GaveUp => {
                log::error!("{}", self.probe.gave_up_error());
                "gaveUp".into()
            }
        }
    }

    #[wasm_bindgen(js_name = "setSurfaces")]
    pub fn js_set_surfaces(&mut self, surfaces: JsValue) -> bool {
        let surfaces = from_js::<Vec<SurfaceGeometry>>(surfaces).map(|surfaces| {
            self.controller.set_surfaces(surfaces, Instant::now());
            true
        });
        or_false("setSurfaces", surfaces)
    }

    /// Strokes to paint, one entry per surface
    #[wasm_bindgen(js_name = "overlaySurfaces")]
    pub fn js_overlay_surfaces(&self) -> JsValue {
        let surfaces: Vec<JsSurface> = self
            .controller
            .document_scanner()
            .and_then(|d| d.target().as_overlay())
            .map(|overlay| {
                overlay
                    .surfaces()
                    .iter()
                    .map(|s| JsSurface {
                        geometry: s.geometry(),
                        strokes: s.strokes().collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        or_null("overlaySurfaces", to_js(&surfaces))
    }

    #[wasm_bindgen(js_name = "onPointerUp")]
    pub fn js_on_pointer_up(&mut self) {
        self.controller.on_pointer_up(Instant::now());
    }

    #[wasm_bindgen(js_name = "onKeyUp")]
    pub fn js_on_key_up(&mut self, key: &str) {
        self.controller.on_key_up(key, Instant::now());
    }

    /// Selection text for painted editors, rebuilt from the paragraph
    /// boxes the selection rect overlaps
    #[wasm_bindgen(js_name = "selectionText")]
    pub fn js_selection_text(&self, paragraphs: JsValue, rect: JsValue) -> String {
        match (from_js::<Vec<ParagraphBox>>(paragraphs), from_js::<Rect>(rect)) {
            (Ok(paragraphs), Ok(rect)) => assemble_selection_text(&paragraphs, &rect),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("selectionText failed: {}", e);
                String::new()
            }
        }
    }

    /// Show the selection widget for `text`. `rect` is the selection's
    /// bounding rect; `pageMargin` is null when it could not be measured.
    #[wasm_bindgen(js_name = "onSelection")]
    pub fn js_on_selection(&mut self, text: &str, rect: JsValue, page_margin: Option<f64>, scroll_y: f64) -> JsValue {
        let rect = from_js::<Rect>(rect).unwrap_or_default();
        match self.controller.on_selection(text, rect, page_margin, scroll_y) {
            Some(widget) => or_null("onSelection", to_js(widget)),
            None => JsValue::NULL,
        }
    }

    #[wasm_bindgen(js_name = "dismissSelection")]
    pub fn js_dismiss_selection(&mut self) {
        self.controller.dismiss_selection();
    }

    #[wasm_bindgen(js_name = "selectionAddTerm")]
    pub fn js_selection_add_term(&mut self) -> bool {
        self.controller.selection_add_term()
    }

    #[wasm_bindgen(js_name = "pointerEnterSelectionWidget")]
    pub fn js_pointer_enter_selection_widget(&mut self) {
        self.controller.pointer_enter_selection_widget();
    }

    #[wasm_bindgen(js_name = "pointerLeaveSelectionWidget")]
    pub fn js_pointer_leave_selection_widget(&mut self) {
        self.controller.pointer_leave_selection_widget(Instant::now());
    }

    #[wasm_bindgen(js_name = "pointerEnterSelectionPopup")]
    pub fn js_pointer_enter_selection_popup(&mut self) {
        self.controller.pointer_enter_selection_popup();
    }

    #[wasm_bindgen(js_name = "pointerLeaveSelectionPopup")]
    pub fn js_pointer_leave_selection_popup(&mut self) {
        self.controller.pointer_leave_selection_popup(Instant::now());
    }

    #[wasm_bindgen(js_name = "selectionPopupVisible")]
    pub fn js_selection_popup_visible(&self) -> bool {
        self.controller.selection_popup_visible()
    }

    /// Returns tooltip content for a marker element, or null
    #[wasm_bindgen(js_name = "pointerEnterMarker")]
    pub fn js_pointer_enter_marker(&mut self, marker: web_sys::Node) -> JsValue {
        let Some(id) = self.controller.host().map(|host| host.id_of(&marker)) else {
            return JsValue::NULL;
        };
        match self.controller.pointer_enter_marker(id) {
            Some(content) => or_null(
                "pointerEnterMarker",
                to_js(&JsTooltip {
                    term: &content.term,
                    full_title: &content.summary.full_title,
                    description: &content.summary.description,
                    team: &content.summary.team,
                    author: &content.summary.author,
                    date: content.summary.date.as_deref(),
                }),
            ),
            None => JsValue::NULL,
        }
    }

    #[wasm_bindgen(js_name = "pointerLeaveMarker")]
    pub fn js_pointer_leave_marker(&mut self) {
        self.controller.pointer_leave_marker(Instant::now());
    }

    #[wasm_bindgen(js_name = "pointerEnterTooltip")]
    pub fn js_pointer_enter_tooltip(&mut self) {
        self.controller.pointer_enter_tooltip();
    }

    #[wasm_bindgen(js_name = "pointerLeaveTooltip")]
    pub fn js_pointer_leave_tooltip(&mut self) {
        self.controller.pointer_leave_tooltip(Instant::now());
    }

    #[wasm_bindgen(js_name = "tooltipVisible")]
    pub fn js_tooltip_visible(&self) -> bool {
        self.controller.visible_tooltip().is_some()
    }

    #[wasm_bindgen(js_name = "toggleSidePanel")]
    pub fn js_toggle_side_panel(&mut self) {
        self.controller.toggle_side_panel();
    }

    /// Advance timers. Call again after `nextDeadlineMs`, or right away
    /// while `busy`.
    #[wasm_bindgen(js_name = "tick")]
    pub fn js_tick(&mut self) -> JsValue {
        let now = Instant::now();
        let TickReport {
            fetch,
            read_selection,
            scan_finished,
            busy,
        } = self.controller.tick(now);
        let next_deadline_ms = self
            .controller
            .next_deadline(now)
            .map(|d| d.as_millis() as f64);
        or_null(
            "tick",
            to_js(&JsTickReport {
                fetch,
                read_selection,
                scan_finished,
                busy,
                next_deadline_ms,
            }),
        )
    }

    #[wasm_bindgen(js_name = "indicator")]
    pub fn js_indicator(&self) -> JsValue {
        or_null("indicator", to_js(self.controller.indicator()))
    }

    #[wasm_bindgen(js_name = "indicatorLabel")]
    pub fn js_indicator_label(&self) -> String {
        self.controller.indicator().label()
    }

    #[wasm_bindgen(js_name = "matchesFound")]
    pub fn js_matches_found(&self) -> usize {
        self.controller.matches_found()
    }

    #[wasm_bindgen(js_name = "termCount")]
    pub fn js_term_count(&self) -> usize {
        self.controller.term_count()
    }

    /// `[key, value]` pairs to persist
    #[wasm_bindgen(js_name = "takeWrites")]
    pub fn js_take_writes(&mut self) -> JsValue {
        or_null("takeWrites", to_js(&self.controller.store_mut().take_writes()))
    }

    /// Messages to deliver to the other contexts
    #[wasm_bindgen(js_name = "takeMessages")]
    pub fn js_take_messages(&mut self) -> JsValue {
        let messages = std::mem::take(self.controller.notifier_mut());
        or_null("takeMessages", to_js(&messages))
    }

    #[wasm_bindgen(js_name = "scanStats")]
    pub fn js_scan_stats(&self) -> JsValue {
        or_null("scanStats", to_js(&self.controller.page_scanner().stats()))
    }
}

// =============================================================================
// Tests
// =============================================================================
