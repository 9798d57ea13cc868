//! WhatsApp client capability.
//!
//! The gateway never speaks the WhatsApp protocol itself. A [`WhatsAppClient`]
//! owns the session and reports its lifecycle through [`SessionEvent`]s; the
//! gateway only asks it to send text.
//!
//! Two backends are provided:
//! - [`BridgeClient`]: JSON over WebSocket to an external WhatsApp Web bridge
//!   process (default)
//! - `NativeClient`: in-process wa-rs client, behind the `whatsapp-web` feature

pub mod bridge;
#[cfg(feature = "whatsapp-web")]
pub mod native;
pub mod qr;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{WhatsAppBackend, WhatsAppConfig};
use crate::error::Result;
use crate::utils::phone::Recipient;

pub use bridge::BridgeClient;

/// Session lifecycle notifications emitted by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new pairing QR payload is available.
    QrCode { code: String },
    /// Pairing succeeded; the session is syncing.
    Authenticated,
    /// The session can send messages.
    Ready { me: Option<String> },
    /// The connection dropped.
    Disconnected { reason: String },
    /// Credentials were rejected.
    AuthFailure { reason: String },
    /// The phone unlinked this device.
    LoggedOut,
}

/// Acknowledgement for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    /// WhatsApp message id.
    pub id: String,
    /// JID the message was delivered to.
    pub remote_jid: String,
    /// Unix timestamp (seconds) reported for the send.
    pub timestamp: i64,
}

/// An opaque WhatsApp Web session.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Start the session. Lifecycle events are pushed into `events` until the
    /// client shuts down.
    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<()>;

    /// Send a plain text message.
    async fn send_text(&self, recipient: &Recipient, text: &str) -> Result<SentMessage>;

    /// Stop the session.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the client selected by `config.backend`.
pub fn build_client(config: &WhatsAppConfig) -> Result<Arc<dyn WhatsAppClient>> {
    match config.backend {
        WhatsAppBackend::Bridge => Ok(Arc::new(BridgeClient::from_config(config)?)),
        #[cfg(feature = "whatsapp-web")]
        WhatsAppBackend::Native => Ok(Arc::new(native::NativeClient::from_config(config))),
        #[cfg(not(feature = "whatsapp-web"))]
        WhatsAppBackend::Native => Err(crate::error::GateError::Config(
            "the native WhatsApp backend requires the 'whatsapp-web' feature. \
             Rebuild with: cargo build --features whatsapp-web"
                .to_string(),
        )),
    }
}
