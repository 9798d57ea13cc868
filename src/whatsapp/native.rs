//! In-process WhatsApp Web client built on wa-rs.
//!
//! The session (device keys, Signal state) is persisted to SQLite at
//! `whatsapp.session_path`, so pairing survives restarts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wa_rs::bot::Bot;
use wa_rs::pair_code::PairCodeOptions;
use wa_rs_binary::jid::Jid;
use wa_rs_core::types::events::Event;
use wa_rs_sqlite_storage::SqliteStore;
use wa_rs_tokio_transport::TokioWebSocketTransportFactory;
use wa_rs_ureq_http::UreqHttpClient;

use crate::config::{expand_home, WhatsAppConfig};
use crate::error::{GateError, Result};
use crate::utils::phone::Recipient;

use super::{SentMessage, SessionEvent, WhatsAppClient};

pub struct NativeClient {
    session_path: PathBuf,
    pair_phone: Option<String>,
    running: AtomicBool,
    client: Mutex<Option<Arc<wa_rs::Client>>>,
    bot_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NativeClient {
    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self {
            session_path: expand_home(&config.session_path),
            pair_phone: config
                .pair_phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| p.chars().filter(|c| c.is_ascii_digit()).collect()),
            running: AtomicBool::new(false),
            client: Mutex::new(None),
            bot_handle: Mutex::new(None),
        }
    }

    fn to_jid(recipient: &Recipient) -> Result<Jid> {
        if recipient.is_group() {
            recipient.jid.parse::<Jid>().map_err(|e| {
                GateError::InvalidNumber(format!("invalid group JID '{}': {}", recipient.jid, e))
            })
        } else {
            Ok(Jid::pn(&recipient.number))
        }
    }

    fn map_event(event: &Event) -> Option<SessionEvent> {
        match event {
            Event::PairingQrCode { code, .. } => Some(SessionEvent::QrCode { code: code.clone() }),
            Event::PairingCode { code, .. } => {
                info!(
                    "WhatsApp pair code: {} (enter it in WhatsApp > Linked Devices)",
                    code
                );
                None
            }
            Event::Connected(_) => Some(SessionEvent::Ready { me: None }),
            Event::LoggedOut(_) => Some(SessionEvent::LoggedOut),
            Event::StreamError(e) => Some(SessionEvent::Disconnected {
                reason: format!("stream error: {:?}", e),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl WhatsAppClient for NativeClient {
    fn name(&self) -> &str {
        "native"
    }

    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(parent) = self.session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(
            "Starting native WhatsApp client (session: {})",
            self.session_path.display()
        );

        let fail = |e: String| {
            self.running.store(false, Ordering::SeqCst);
            GateError::WhatsApp(e)
        };

        let store = SqliteStore::new(&self.session_path.to_string_lossy())
            .await
            .map_err(|e| fail(format!("Failed to open WhatsApp session store: {}", e)))?;

        let mut builder = Bot::builder()
            .with_backend(Arc::new(store))
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .on_event(move |event, _client| {
                let events = events.clone();
                async move {
                    match NativeClient::map_event(&event) {
                        Some(mapped) => {
                            if events.send(mapped).await.is_err() {
                                debug!("WhatsApp native: session event receiver dropped");
                            }
                        }
                        None => debug!("WhatsApp native: ignoring event"),
                    }
                }
            });

        if let Some(phone) = &self.pair_phone {
            info!("WhatsApp native: pair-code linking enabled");
            builder = builder.with_pair_code(PairCodeOptions {
                phone_number: phone.clone(),
                ..Default::default()
            });
        }

        let mut bot = builder
            .build()
            .await
            .map_err(|e| fail(format!("Failed to build WhatsApp client: {}", e)))?;
        *self.client.lock().await = Some(bot.client());

        let handle = bot
            .run()
            .await
            .map_err(|e| fail(format!("Failed to start WhatsApp client: {}", e)))?;
        *self.bot_handle.lock().await = Some(handle);

        Ok(())
    }

    async fn send_text(&self, recipient: &Recipient, text: &str) -> Result<SentMessage> {
        let client = self.client.lock().await.clone().ok_or_else(|| {
            GateError::NotReady("native WhatsApp client not started".to_string())
        })?;

        let to = Self::to_jid(recipient)?;
        let outgoing = wa_rs_proto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };

        let id = client
            .send_message(to, outgoing)
            .await
            .map_err(|e| GateError::WhatsApp(format!("WhatsApp send failed: {}", e)))?;

        Ok(SentMessage {
            id: id.to_string(),
            remote_jid: recipient.jid.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.lock().await.take();
        if let Some(handle) = self.bot_handle.lock().await.take() {
            handle.abort();
        }
        warn!("Native WhatsApp client stopped");
        Ok(())
    }
}
