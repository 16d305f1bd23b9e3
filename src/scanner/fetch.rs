//! Structured document fetch with a hard deadline
//!
//! The request goes out as a `getDocumentContent` message; the reply comes
//! back through `resolve`. The host calls `poll` from its timer so a reply
//! that never arrives turns into a `ContentFetch` timeout instead of a hang.

use instant::Instant;
use serde::Serialize;
use std::time::Duration;

use crate::error::{FetchFailure, GlossaryError, Result};
use crate::protocol::{FetchResponse, Message};
use crate::scanner::document::DocumentModel;

#[derive(Debug, Clone)]
struct PendingFetch {
    request_id: u64,
    document_id: String,
    deadline: Instant,
}

/// An outgoing request the host must deliver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub request_id: u64,
    pub message: Message,
}

#[derive(Debug)]
pub struct DocumentFetcher {
    timeout: Duration,
    pending: Option<PendingFetch>,
    next_request_id: u64,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
            next_request_id: 1,
        }
    }

    /// Start a fetch. Any fetch still in flight is superseded.
    pub fn begin(&mut self, document_id: &str, now: Instant) -> FetchRequest {
        if let Some(old) = self.pending.take() {
            log::debug!(
                "fetch #{} for {} superseded",
                old.request_id,
                old.document_id
            );
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending = Some(PendingFetch {
            request_id,
            document_id: document_id.to_string(),
            deadline: now + self.timeout,
        });

        FetchRequest {
            request_id,
            message: Message::GetDocumentContent {
                document_id: document_id.to_string(),
            },
        }
    }

    /// Deliver the reply for `request_id`
    pub fn resolve(
        &mut self,
        request_id: u64,
        response: FetchResponse,
        now: Instant,
    ) -> Result<DocumentModel> {
        let is_current = self.pending.as_ref().map(|p| p.request_id) == Some(request_id);
        let pending = match self.pending.take() {
            Some(p) if is_current => p,
            other => {
                self.pending = other;
                return Err(GlossaryError::ContentFetch {
                    document_id: String::new(),
                    reason: FetchFailure::Superseded,
                });
            }
        };

        if now >= pending.deadline {
            return Err(self.timeout_error(pending.document_id));
        }

        match response {
            FetchResponse::Content { content } => Ok(content),
            FetchResponse::Error { error } => Err(GlossaryError::ContentFetch {
                document_id: pending.document_id,
                reason: FetchFailure::Remote(error),
            }),
        }
    }

    /// Deliver a raw JSON reply; unparseable replies fail the fetch
    pub fn resolve_json(
        &mut self,
        request_id: u64,
        response: serde_json::Value,
        now: Instant,
    ) -> Result<DocumentModel> {
        match serde_json::from_value::<FetchResponse>(response) {
            Ok(parsed) => self.resolve(request_id, parsed, now),
            Err(e) => {
                let document_id = self
                    .pending
                    .as_ref()
                    .filter(|p| p.request_id == request_id)
                    .map(|p| p.document_id.clone())
                    .unwrap_or_default();
                if self.pending.as_ref().map(|p| p.request_id) == Some(request_id) {
                    self.pending = None;
                }
                Err(GlossaryError::ContentFetch {
                    document_id,
                    reason: FetchFailure::Malformed(e.to_string()),
                })
            }
        }
    }

    /// Expire the in-flight fetch once its deadline passes
    pub fn poll(&mut self, now: Instant) -> Option<GlossaryError> {
        match &self.pending {
            Some(p) if now >= p.deadline => {
                let expired = self.pending.take()?;
                log::warn!(
                    "document fetch for {} timed out after {}ms",
                    expired.document_id,
                    self.timeout.as_millis()
                );
                Some(self.timeout_error(expired.document_id))
            }
            _ => None,
        }
    }

    fn timeout_error(&self, document_id: String) -> GlossaryError {
        GlossaryError::ContentFetch {
            document_id,
            reason: FetchFailure::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn time_until_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending.as_ref().map(|p| {
            if p.deadline > now {
                p.deadline - now
            } else {
                Duration::ZERO
            }
        })
    }
}
