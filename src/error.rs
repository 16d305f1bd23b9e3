//! Error types for the highlighting engine.
//!
//! Every variant is recoverable: callers log it and degrade (empty
//! dictionary, DOM-only scanning, default anchors) rather than abort.

use thiserror::Error;
use wasm_bindgen::prelude::*;

/// Why a structured-document fetch produced no content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// No response arrived before the hard deadline
    Timeout { after_ms: u64 },
    /// The responder answered with `{ error }`
    Remote(String),
    /// The response did not parse as a document model
    Malformed(String),
    /// A newer fetch replaced this one before it resolved
    Superseded,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            FetchFailure::Remote(msg) => write!(f, "remote error: {}", msg),
            FetchFailure::Malformed(msg) => write!(f, "malformed document: {}", msg),
            FetchFailure::Superseded => write!(f, "superseded by a newer request"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GlossaryError {
    #[error("dictionary load failed: {0}")]
    DictionaryLoad(String),

    #[error("content fetch for '{document_id}' failed: {reason}")]
    ContentFetch {
        document_id: String,
        reason: FetchFailure,
    },

    #[error("render target missing: {0}")]
    RenderTargetMissing(String),

    #[error("node {0} is no longer attached")]
    StaleNode(usize),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GlossaryError {
    /// Stable code exposed to JavaScript as `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            GlossaryError::DictionaryLoad(_) => "DICTIONARY_LOAD_FAILURE",
            GlossaryError::ContentFetch { .. } => "CONTENT_FETCH_FAILURE",
            GlossaryError::RenderTargetMissing(_) => "RENDER_TARGET_MISSING",
            GlossaryError::StaleNode(_) => "STALE_NODE",
            GlossaryError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GlossaryError::ContentFetch {
                reason: FetchFailure::Timeout { .. },
                ..
            }
        )
    }
}

impl From<serde_json::Error> for GlossaryError {
    fn from(err: serde_json::Error) -> Self {
        GlossaryError::Serialization(err.to_string())
    }
}

impl From<serde_wasm_bindgen::Error> for GlossaryError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        GlossaryError::Serialization(err.to_string())
    }
}

impl From<GlossaryError> for JsValue {
    fn from(err: GlossaryError) -> Self {
        let js_error = js_sys::Error::new(&err.to_string());
        js_sys::Reflect::set(&js_error, &"code".into(), &JsValue::from_str(err.code())).ok();
        js_error.into()
    }
}

pub type Result<T> = std::result::Result<T, GlossaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_detected() {
        let err = GlossaryError::ContentFetch {
            document_id: "doc-1".to_string(),
            reason: FetchFailure::Timeout { after_ms: 30_000 },
        };
        assert!(err.is_timeout());
        assert_eq!(err.code(), "CONTENT_FETCH_FAILURE");
        assert_eq!(
            err.to_string(),
            "content fetch for 'doc-1' failed: timed out after 30000ms"
        );
    }

    #[test]
    fn test_remote_failure_is_not_timeout() {
        let err = GlossaryError::ContentFetch {
            document_id: "doc-1".to_string(),
            reason: FetchFailure::Remote("401".to_string()),
        };
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_json_error_converts() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GlossaryError = bad.unwrap_err().into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
