//! Messages exchanged with the rest of the extension
//!
//! Transport is the host's concern; these are just the shapes.

use serde::{Deserialize, Serialize};

use crate::scanner::document::DocumentModel;
use crate::terms::Dictionary;

/// Storage key holding the term -> definition mapping
pub const TERMS_KEY: &str = "glossaryTerms";
/// Storage key holding `{ enabled, googleDocsEnabled }`
pub const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    #[serde(rename_all = "camelCase")]
    TermsUpdated { terms: Dictionary },
    #[serde(rename_all = "camelCase")]
    GetDocumentContent { document_id: String },
    GetSettings,
    #[serde(rename_all = "camelCase")]
    OpenPopup { prefilled_text: String },
    OpenSidePanel,
    CloseSidePanel,
}

/// Reply to `getDocumentContent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchResponse {
    Content { content: DocumentModel },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub google_docs_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            google_docs_enabled: true,
        }
    }
}
