//! Session module - WhatsApp session state tracking
//!
//! A [`Session`] owns the [`WhatsAppClient`] and folds the events it emits
//! into a [`SessionSnapshot`] held in a `watch` channel. The gateway reads the
//! snapshot to answer status and QR requests, and the dispatcher checks it
//! before every send.
//!
//! # Example
//!
//! ```
//! use evogate::session::{ConnectionState, Session};
//! use evogate::whatsapp::{BridgeClient, SessionEvent};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = BridgeClient::new("ws://127.0.0.1:3001", Duration::from_secs(30)).unwrap();
//! let session = Session::new(Arc::new(client));
//! assert_eq!(session.snapshot().state, ConnectionState::Close);
//!
//! session.apply(SessionEvent::Ready { me: None });
//! assert!(session.is_ready());
//!
//! # tokio_test::block_on(async {
//! session.shutdown().await.unwrap();
//! assert_eq!(session.state(), ConnectionState::Close);
//! # });
//! ```

pub mod types;

pub use types::{ConnectionState, QrSnapshot, SessionSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::Result;
use crate::whatsapp::{qr, SessionEvent, WhatsAppClient};

/// Buffered session events between the client and the event loop.
const EVENT_BUFFER: usize = 64;

pub struct Session {
    client: Arc<dyn WhatsAppClient>,
    state: watch::Sender<SessionSnapshot>,
    print_qr: bool,
    started: AtomicBool,
}

impl Session {
    /// Create a session in the `close` state. Nothing happens until [`Session::start`].
    pub fn new(client: Arc<dyn WhatsAppClient>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            client,
            state,
            print_qr: false,
            started: AtomicBool::new(false),
        }
    }

    /// Render each new QR code into the log.
    pub fn with_print_qr(mut self, print_qr: bool) -> Self {
        self.print_qr = print_qr;
        self
    }

    pub fn client(&self) -> &Arc<dyn WhatsAppClient> {
        &self.client
    }

    /// Initialize the client and spawn the event loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.state.send_modify(|s| {
            s.state = ConnectionState::Connecting;
            s.last_error = None;
        });

        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        if let Err(e) = self.client.initialize(tx).await {
            warn!(backend = self.client.name(), "WhatsApp client failed to start: {}", e);
            self.started.store(false, Ordering::SeqCst);
            self.state.send_modify(|s| {
                s.state = ConnectionState::Close;
                s.last_error = Some(e.to_string());
            });
            return Err(e);
        }
        info!(backend = self.client.name(), "WhatsApp session started");

        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                session.apply(event);
            }
            info!("WhatsApp session event stream ended");
        });

        Ok(())
    }

    /// Fold one event into the snapshot.
    pub fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::QrCode { code } => {
                info!("WhatsApp QR code received (scan with WhatsApp > Linked Devices)");
                if self.print_qr {
                    match qr::render_terminal(&code) {
                        Ok(rendered) => info!("\n{}", rendered),
                        Err(e) => warn!("Failed to render QR code: {}", e),
                    }
                }
                self.state.send_modify(|s| {
                    let count = s.qr_count() + 1;
                    s.state = ConnectionState::Connecting;
                    s.qr = Some(QrSnapshot {
                        code,
                        count,
                        generated_at: Utc::now(),
                    });
                });
            }
            SessionEvent::Authenticated => {
                info!("WhatsApp session authenticated");
                self.state.send_modify(|s| {
                    s.state = ConnectionState::Connecting;
                    s.qr = None;
                });
            }
            SessionEvent::Ready { me } => {
                info!(me = me.as_deref().unwrap_or("unknown"), "WhatsApp session ready");
                self.state.send_modify(|s| {
                    s.state = ConnectionState::Open;
                    s.qr = None;
                    s.connected_since = Some(Utc::now());
                    if me.is_some() {
                        s.me = me;
                    }
                    s.last_error = None;
                });
            }
            SessionEvent::Disconnected { reason } => {
                warn!(reason = %reason, "WhatsApp session disconnected");
                self.close(reason, false);
            }
            SessionEvent::AuthFailure { reason } => {
                warn!(reason = %reason, "WhatsApp authentication failed");
                self.close(reason, false);
            }
            SessionEvent::LoggedOut => {
                warn!("WhatsApp session logged out");
                self.close("logged out".to_string(), true);
            }
        }
    }

    fn close(&self, reason: String, forget_me: bool) {
        self.state.send_modify(|s| {
            s.state = ConnectionState::Close;
            s.connected_since = None;
            s.last_error = Some(reason);
            if forget_me {
                s.me = None;
            }
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Observe snapshot transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Shut the client down and mark the session closed.
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.client.shutdown().await;
        self.close("shut down".to_string(), false);
        result
    }
}
