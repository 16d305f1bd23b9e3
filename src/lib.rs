//! Glossarly Core: glossary term matching + highlight placement engine
//!
//! A Rust/WASM implementation of the Glossarly highlighting pipeline.
//!
//! # Architecture
//!
//! ## Terms
//! - `terms/entry.rs` - Dictionary, Definition: the user's glossary
//! - `terms/index.rs` - TermIndex: whole-word, case-insensitive matching over
//!   immutable revisioned snapshots
//!
//! ## Scanner
//! - `scanner/content.rs` - ContentScanner: chunked scan state machine
//! - `scanner/change.rs` - ChangeTracker: content-addressable skip detection
//! - `scanner/debounce.rs` - DebouncedScheduler: burst coalescing
//! - `scanner/document.rs` - DocumentModel: structured document content
//! - `scanner/fetch.rs` - DocumentFetcher: fetch with a hard deadline
//!
//! ## Render
//! - `render/inline.rs` - InlineRenderer: marker elements in the DOM
//! - `render/overlay.rs` - OverlayRenderer: strokes over painted surfaces
//! - `render/tooltip.rs`, `render/widget.rs` - hover cards and widgets
//!
//! ## Wiring
//! - `controller.rs` - Controller: storage, messages, commands, timers
//! - `wasm.rs` - GlossaryEngine: the controller for JavaScript
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { GlossaryEngine } from 'glossarly-core';
//!
//! await init();
//!
//! const engine = new GlossaryEngine(null);
//! const stored = await chrome.storage.sync.get(['glossaryTerms', 'settings']);
//! engine.start(stored);
//!
//! new MutationObserver(() => engine.onContentChanged())
//!   .observe(document.body, { childList: true, subtree: true, characterData: true });
//!
//! const pump = () => {
//!   const report = engine.tick();
//!   for (const [key, value] of engine.takeWrites()) chrome.storage.sync.set({ [key]: value });
//!   for (const message of engine.takeMessages()) chrome.runtime.sendMessage(message);
//!   setTimeout(pump, report.busy ? 0 : (report.nextDeadlineMs ?? 250));
//! };
//! pump();
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod render;
pub mod scanner;
pub mod terms;
pub mod wasm;

pub use config::*;
pub use controller::*;
pub use error::{FetchFailure, GlossaryError, Result};
pub use protocol::*;
pub use render::*;
pub use scanner::*;
pub use terms::*;
pub use wasm::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logger::init();
}

/// Toggle debug-level console output
#[wasm_bindgen(js_name = "setDebug")]
pub fn set_debug(enabled: bool) {
    logger::set_debug(enabled);
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("glossarly-core v{}", env!("CARGO_PKG_VERSION"))
}
