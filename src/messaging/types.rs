//! Send and batch result types.

use serde::{Deserialize, Serialize};

use crate::utils::phone::Recipient;
use crate::whatsapp::SentMessage;

/// One message in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub number: String,
    pub text: String,
}

impl BatchItem {
    pub fn new(number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            text: text.into(),
        }
    }
}

/// A single successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub recipient: Recipient,
    /// Text as delivered (trimmed).
    pub text: String,
    pub message: SentMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Sent,
    Failed,
}

/// Per-item outcome within a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Position in the request.
    pub index: usize,
    /// Number as given by the caller.
    pub number: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub(crate) fn sent(index: usize, number: String, message: SentMessage) -> Self {
        Self {
            index,
            number,
            status: BatchStatus::Sent,
            message_id: Some(message.id),
            remote_jid: Some(message.remote_jid),
            error: None,
        }
    }

    pub(crate) fn failed(index: usize, number: String, error: String) -> Self {
        Self {
            index,
            number,
            status: BatchStatus::Failed,
            message_id: None,
            remote_jid: None,
            error: Some(error),
        }
    }
}

/// Summary of a batch send, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<BatchResult>,
}

impl BatchReport {
    pub(crate) fn from_results(results: Vec<BatchResult>) -> Self {
        let sent = results
            .iter()
            .filter(|r| r.status == BatchStatus::Sent)
            .count();
        Self {
            total: results.len(),
            sent,
            failed: results.len() - sent,
            results,
        }
    }
}
