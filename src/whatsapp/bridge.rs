//! WhatsApp client backed by an external WhatsApp Web bridge.
//!
//! Connects to a bridge process (whatsmeow, Baileys or similar) over WebSocket.
//! The bridge handles the WhatsApp protocol (E2E encryption, QR pairing,
//! session persistence). evogate just consumes lifecycle frames and sends text.
//!
//! # Bridge Protocol (JSON over WebSocket)
//!
//! Inbound (bridge → evogate):
//! ```json
//! {"type":"qr_code","data":"2@base64data"}
//! {"type":"authenticated"}
//! {"type":"connected","jid":"5511999998888@s.whatsapp.net"}
//! {"type":"disconnected","reason":"session expired"}
//! {"type":"logged_out"}
//! {"type":"auth_failure","reason":"bad credentials"}
//! {"type":"sent","id":"<request id>","message_id":"3EB0...","timestamp":1707900000}
//! {"type":"send_error","id":"<request id>","reason":"not on WhatsApp"}
//! ```
//!
//! Outbound (evogate → bridge):
//! ```json
//! {"type":"send","id":"<request id>","to":"5511999998888@s.whatsapp.net","content":"Hello"}
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::config::WhatsAppConfig;
use crate::error::{GateError, Result};
use crate::utils::phone::Recipient;

use super::{SentMessage, SessionEvent, WhatsAppClient};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum reconnect delay (in seconds) for exponential backoff.
const MAX_RECONNECT_DELAY_SECS: u64 = 120;
/// Base reconnect delay (in seconds).
const BASE_RECONNECT_DELAY_SECS: u64 = 2;
/// Maximum number of consecutive reconnect attempts before the delay stops growing.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Reported when the WebSocket to the bridge drops.
const CONNECTION_LOST: &str = "bridge connection lost";
const NOT_CONNECTED: &str = "WhatsApp bridge is not connected";

// ---------------------------------------------------------------------------
// Bridge protocol types
// ---------------------------------------------------------------------------

/// Inbound frame from the bridge.
#[derive(Debug, Deserialize)]
struct BridgeFrame {
    /// Frame type: "qr_code", "connected", "sent", etc.
    #[serde(rename = "type")]
    msg_type: String,
    /// Request id being acknowledged (sent / send_error).
    #[serde(default)]
    id: Option<String>,
    /// QR payload (qr_code).
    #[serde(default)]
    data: Option<String>,
    /// Own JID (connected).
    #[serde(default)]
    jid: Option<String>,
    /// Failure or disconnect reason.
    #[serde(default)]
    reason: Option<String>,
    /// WhatsApp message id (sent).
    #[serde(default)]
    message_id: Option<String>,
    /// Unix timestamp (sent).
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Outbound send request to the bridge.
#[derive(Debug, Serialize)]
struct BridgeSendMessage {
    /// Always "send".
    #[serde(rename = "type")]
    msg_type: String,
    /// Correlation id echoed back in the ack.
    id: String,
    /// Recipient JID.
    to: String,
    /// Message text content.
    content: String,
}

/// A send waiting for its ack.
struct PendingSend {
    to: String,
    ack: oneshot::Sender<Result<SentMessage>>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingSend>>>;

// ---------------------------------------------------------------------------
// BridgeClient
// ---------------------------------------------------------------------------

/// WhatsApp client that drives a bridge process over WebSocket.
pub struct BridgeClient {
    bridge_url: String,
    send_timeout: Duration,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    outbound_tx: Mutex<Option<mpsc::Sender<BridgeSendMessage>>>,
    pending: PendingMap,
}

impl BridgeClient {
    /// Creates a client for `bridge_url`.
    pub fn new(bridge_url: &str, send_timeout: Duration) -> Result<Self> {
        let bridge_url = bridge_url.trim().to_string();
        if bridge_url.is_empty() {
            return Err(GateError::Config("WhatsApp bridge URL is empty".to_string()));
        }
        Ok(Self {
            bridge_url,
            send_timeout,
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Mutex::new(None),
            outbound_tx: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Creates a client from the `whatsapp` config section.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self> {
        Self::new(
            &config.bridge_url,
            Duration::from_secs(config.send_timeout_secs.max(1)),
        )
    }

    /// Whether the WebSocket to the bridge is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Calculates the exponential backoff delay for a given attempt number.
    fn backoff_delay(attempt: u32) -> Duration {
        let delay_secs = BASE_RECONNECT_DELAY_SECS
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(MAX_RECONNECT_DELAY_SECS);
        Duration::from_secs(delay_secs)
    }

    /// Map a lifecycle frame to a session event. Acks and chat traffic map to `None`.
    fn frame_to_event(frame: &BridgeFrame) -> Option<SessionEvent> {
        let reason = || frame.reason.clone().unwrap_or_else(|| "unknown".to_string());
        match frame.msg_type.as_str() {
            "qr_code" | "qr" => frame
                .data
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|code| SessionEvent::QrCode {
                    code: code.to_string(),
                }),
            "authenticated" => Some(SessionEvent::Authenticated),
            "connected" | "ready" => Some(SessionEvent::Ready {
                me: frame.jid.clone(),
            }),
            "disconnected" => Some(SessionEvent::Disconnected { reason: reason() }),
            "auth_failure" => Some(SessionEvent::AuthFailure { reason: reason() }),
            "logged_out" => Some(SessionEvent::LoggedOut),
            _ => None,
        }
    }

    /// Resolve the pending send acknowledged by `frame`, if any.
    async fn resolve_ack(pending: &PendingMap, frame: &BridgeFrame) {
        let Some(id) = frame.id.as_deref() else {
            warn!("WhatsApp bridge: {} frame without request id", frame.msg_type);
            return;
        };
        let Some(entry) = pending.lock().await.remove(id) else {
            debug!("WhatsApp bridge: ack for unknown or expired request {}", id);
            return;
        };

        let result = if frame.msg_type == "sent" {
            Ok(SentMessage {
                id: frame.message_id.clone().unwrap_or_else(|| id.to_string()),
                remote_jid: entry.to,
                timestamp: frame
                    .timestamp
                    .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            })
        } else {
            Err(GateError::WhatsApp(
                frame
                    .reason
                    .clone()
                    .unwrap_or_else(|| "bridge rejected the message".to_string()),
            ))
        };
        let _ = entry.ack.send(result);
    }

    /// Fail every in-flight send with `reason`.
    async fn fail_pending(pending: &PendingMap, reason: &str) {
        let drained: Vec<PendingSend> = pending.lock().await.drain().map(|(_, p)| p).collect();
        for entry in drained {
            let _ = entry
                .ack
                .send(Err(GateError::NotReady(reason.to_string())));
        }
    }

    /// Fail a single queued send that could not be written.
    async fn reject(pending: &PendingMap, id: &str, reason: &str) {
        if let Some(entry) = pending.lock().await.remove(id) {
            let _ = entry
                .ack
                .send(Err(GateError::NotReady(reason.to_string())));
        }
    }

    async fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
        if events.send(event).await.is_err() {
            debug!("WhatsApp bridge: session event receiver dropped");
        }
    }

    // -----------------------------------------------------------------------
    // Bridge WebSocket loop
    // -----------------------------------------------------------------------

    /// Main bridge loop: connects via WebSocket, forwards lifecycle frames as
    /// session events and writes outbound sends. Reconnects with exponential backoff.
    async fn run_bridge_loop(
        bridge_url: String,
        events: mpsc::Sender<SessionEvent>,
        pending: PendingMap,
        connected: Arc<AtomicBool>,
        mut shutdown_rx: watch::Receiver<bool>,
        mut outbound_rx: mpsc::Receiver<BridgeSendMessage>,
    ) {
        let mut reconnect_attempt: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                info!("WhatsApp bridge loop shutdown requested");
                return;
            }

            // --- WebSocket connect ---
            let ws_stream = tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("WhatsApp bridge loop shutdown requested");
                    return;
                }
                result = connect_async(bridge_url.as_str()) => {
                    match result {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!("WhatsApp: bridge connect failed: {}", e);
                            let delay = Self::backoff_delay(reconnect_attempt);
                            reconnect_attempt =
                                (reconnect_attempt + 1).min(MAX_RECONNECT_ATTEMPTS);
                            let keep_running = Self::backoff_rejecting(
                                delay,
                                &pending,
                                &mut shutdown_rx,
                                &mut outbound_rx,
                            )
                            .await;
                            if !keep_running {
                                return;
                            }
                            continue;
                        }
                    }
                }
            };

            info!("WhatsApp bridge WebSocket connected to {}", bridge_url);
            reconnect_attempt = 0;
            connected.store(true, Ordering::SeqCst);

            let (mut ws_writer, mut ws_reader) = ws_stream.split();

            // --- Main dispatch loop ---
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("WhatsApp bridge loop shutdown requested");
                        connected.store(false, Ordering::SeqCst);
                        let _ = ws_writer.send(WsMessage::Close(None)).await;
                        Self::fail_pending(&pending, "WhatsApp bridge client shut down").await;
                        return;
                    }

                    // Forward outbound sends to the bridge.
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(send_msg) => {
                                match serde_json::to_string(&send_msg) {
                                    Ok(json) => {
                                        if let Err(e) = ws_writer.send(WsMessage::Text(json.into())).await {
                                            warn!("WhatsApp: failed to send to bridge: {}", e);
                                            Self::reject(&pending, &send_msg.id, CONNECTION_LOST).await;
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        error!("WhatsApp: failed to serialize outbound: {}", e);
                                        Self::reject(&pending, &send_msg.id, "failed to encode send request").await;
                                    }
                                }
                            }
                            None => {
                                debug!("WhatsApp outbound channel closed");
                                connected.store(false, Ordering::SeqCst);
                                return;
                            }
                        }
                    }

                    // Process incoming bridge frames.
                    msg = ws_reader.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(raw))) => {
                                match serde_json::from_str::<BridgeFrame>(raw.as_str()) {
                                    Ok(frame) => match frame.msg_type.as_str() {
                                        "sent" | "send_error" => {
                                            Self::resolve_ack(&pending, &frame).await;
                                        }
                                        _ => match Self::frame_to_event(&frame) {
                                            Some(event) => {
                                                info!("WhatsApp bridge: {}", frame.msg_type);
                                                Self::emit(&events, event).await;
                                            }
                                            None => {
                                                debug!("WhatsApp bridge: ignoring '{}' frame", frame.msg_type);
                                            }
                                        },
                                    },
                                    Err(e) => {
                                        warn!("WhatsApp bridge: invalid frame: {}", e);
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("WhatsApp bridge WebSocket closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("WhatsApp bridge WebSocket error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            Self::fail_pending(&pending, CONNECTION_LOST).await;
            Self::emit(
                &events,
                SessionEvent::Disconnected {
                    reason: CONNECTION_LOST.to_string(),
                },
            )
            .await;

            let delay = Self::backoff_delay(reconnect_attempt);
            reconnect_attempt = (reconnect_attempt + 1).min(MAX_RECONNECT_ATTEMPTS);
            let keep_running =
                Self::backoff_rejecting(delay, &pending, &mut shutdown_rx, &mut outbound_rx).await;
            if !keep_running {
                return;
            }
        }
    }

    /// Sleep for `delay` while failing every send queued in the meantime,
    /// including frames queued just before the socket dropped.
    ///
    /// Returns `false` when the loop should stop.
    async fn backoff_rejecting(
        delay: Duration,
        pending: &PendingMap,
        shutdown_rx: &mut watch::Receiver<bool>,
        outbound_rx: &mut mpsc::Receiver<BridgeSendMessage>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return false,
                _ = &mut sleep => return true,
                queued = outbound_rx.recv() => match queued {
                    Some(msg) => Self::reject(pending, &msg.id, NOT_CONNECTED).await,
                    None => return false,
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WhatsAppClient trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl WhatsAppClient for BridgeClient {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("WhatsApp bridge client already running");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        *self.outbound_tx.lock().await = Some(outbound_tx);

        info!("Starting WhatsApp bridge client at {}", self.bridge_url);
        tokio::spawn(Self::run_bridge_loop(
            self.bridge_url.clone(),
            events,
            Arc::clone(&self.pending),
            Arc::clone(&self.connected),
            shutdown_rx,
            outbound_rx,
        ));

        Ok(())
    }

    async fn send_text(&self, recipient: &Recipient, text: &str) -> Result<SentMessage> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(GateError::WhatsApp(
                "WhatsApp bridge client not running".to_string(),
            ));
        }
        if !self.is_connected() {
            return Err(GateError::NotReady(NOT_CONNECTED.to_string()));
        }

        let tx = self.outbound_tx.lock().await.clone().ok_or_else(|| {
            GateError::WhatsApp("WhatsApp outbound channel not initialized".to_string())
        })?;

        let id = uuid::Uuid::new_v4().to_string();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id.clone(),
            PendingSend {
                to: recipient.jid.clone(),
                ack: ack_tx,
            },
        );

        let send_msg = BridgeSendMessage {
            msg_type: "send".to_string(),
            id: id.clone(),
            to: recipient.jid.clone(),
            content: text.to_string(),
        };
        if let Err(e) = tx.send(send_msg).await {
            self.pending.lock().await.remove(&id);
            return Err(GateError::WhatsApp(format!(
                "Failed to queue WhatsApp outbound message: {}",
                e
            )));
        }

        match tokio::time::timeout(self.send_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GateError::WhatsApp(
                "WhatsApp bridge dropped the send request".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(GateError::Timeout(format!(
                    "no acknowledgement from WhatsApp bridge within {}s",
                    self.send_timeout.as_secs()
                )))
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        self.outbound_tx.lock().await.take();
        Self::fail_pending(&self.pending, "WhatsApp bridge client shut down").await;

        info!("WhatsApp bridge client stopped");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn recipient() -> Recipient {
        Recipient {
            number: "5511999998888".to_string(),
            jid: "5511999998888@s.whatsapp.net".to_string(),
        }
    }

    fn frame(json: &str) -> BridgeFrame {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_url() {
        assert!(BridgeClient::new("", Duration::from_secs(1)).is_err());
        assert!(BridgeClient::new("ws://localhost:3001", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_frame_qr_code() {
        let ev = BridgeClient::frame_to_event(&frame(r#"{"type":"qr_code","data":" 2@abc "}"#));
        assert_eq!(
            ev,
            Some(SessionEvent::QrCode {
                code: "2@abc".to_string()
            })
        );
    }

    #[test]
    fn test_frame_qr_code_without_data_ignored() {
        assert_eq!(
            BridgeClient::frame_to_event(&frame(r#"{"type":"qr_code"}"#)),
            None
        );
    }

    #[test]
    fn test_frame_connected() {
        let ev = BridgeClient::frame_to_event(&frame(
            r#"{"type":"connected","jid":"5511999998888@s.whatsapp.net"}"#,
        ));
        assert_eq!(
            ev,
            Some(SessionEvent::Ready {
                me: Some("5511999998888@s.whatsapp.net".to_string())
            })
        );
    }

    #[test]
    fn test_frame_disconnected_default_reason() {
        let ev = BridgeClient::frame_to_event(&frame(r#"{"type":"disconnected"}"#));
        assert_eq!(
            ev,
            Some(SessionEvent::Disconnected {
                reason: "unknown".to_string()
            })
        );
    }

    #[test]
    fn test_frame_lifecycle_variants() {
        assert_eq!(
            BridgeClient::frame_to_event(&frame(r#"{"type":"authenticated"}"#)),
            Some(SessionEvent::Authenticated)
        );
        assert_eq!(
            BridgeClient::frame_to_event(&frame(r#"{"type":"logged_out"}"#)),
            Some(SessionEvent::LoggedOut)
        );
        assert_eq!(
            BridgeClient::frame_to_event(&frame(r#"{"type":"auth_failure","reason":"bad"}"#)),
            Some(SessionEvent::AuthFailure {
                reason: "bad".to_string()
            })
        );
    }

    #[test]
    fn test_frame_chat_message_ignored() {
        let ev = BridgeClient::frame_to_event(&frame(
            r#"{"type":"message","from":"5511","content":"hi"}"#,
        ));
        assert_eq!(ev, None);
    }

    #[test]
    fn test_send_message_serialization() {
        let msg = BridgeSendMessage {
            msg_type: "send".to_string(),
            id: "req-1".to_string(),
            to: "5511999998888@s.whatsapp.net".to_string(),
            content: "Hello".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "send");
        assert_eq!(json["id"], "req-1");
        assert_eq!(json["to"], "5511999998888@s.whatsapp.net");
        assert_eq!(json["content"], "Hello");
    }

    #[test]
    fn test_backoff_delay_increases_exponentially() {
        assert_eq!(BridgeClient::backoff_delay(0), Duration::from_secs(2));
        assert_eq!(BridgeClient::backoff_delay(1), Duration::from_secs(4));
        assert_eq!(BridgeClient::backoff_delay(2), Duration::from_secs(8));
        assert_eq!(BridgeClient::backoff_delay(3), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_delay_caps_at_max() {
        assert_eq!(BridgeClient::backoff_delay(10), Duration::from_secs(120));
        assert_eq!(BridgeClient::backoff_delay(u32::MAX), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_send_not_running() {
        let client = BridgeClient::new("ws://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let err = client.send_text(&recipient(), "hi").await.unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_shutdown_not_running_is_noop() {
        let client = BridgeClient::new("ws://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(client.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_pending_resolves_waiters() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(
            "a".to_string(),
            PendingSend {
                to: "x".to_string(),
                ack: tx,
            },
        );
        BridgeClient::fail_pending(&pending, "gone").await;
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(GateError::NotReady(_))));
        assert!(pending.lock().await.is_empty());
    }

    /// Fake bridge: emits a QR, then `connected`, then acks the first send.
    #[tokio::test]
    async fn test_bridge_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let bridge = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"qr_code","data":"2@pairing"}"#.to_string().into(),
            ))
            .await
            .unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"connected","jid":"5500000000000@s.whatsapp.net"}"#
                    .to_string()
                    .into(),
            ))
            .await
            .unwrap();

            // Wait for the send request and ack it.
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(raw))) => {
                        let req: serde_json::Value = serde_json::from_str(raw.as_str()).unwrap();
                        assert_eq!(req["type"], "send");
                        assert_eq!(req["content"], "Hello bridge");
                        let ack = serde_json::json!({
                            "type": "sent",
                            "id": req["id"],
                            "message_id": "3EB0FAKE",
                            "timestamp": 1_700_000_000i64
                        });
                        ws.send(WsMessage::Text(ack.to_string().into()))
                            .await
                            .unwrap();
                        break;
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {:?}", other),
                }
            }
            // Keep the socket open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client =
            BridgeClient::new(&format!("ws://{}", addr), Duration::from_secs(5)).unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        client.initialize(events_tx).await.unwrap();

        let first = events_rx.recv().await.unwrap();
        assert_eq!(
            first,
            SessionEvent::QrCode {
                code: "2@pairing".to_string()
            }
        );
        let second = events_rx.recv().await.unwrap();
        assert!(matches!(second, SessionEvent::Ready { .. }));
        assert!(client.is_connected());

        let sent = client.send_text(&recipient(), "Hello bridge").await.unwrap();
        assert_eq!(sent.id, "3EB0FAKE");
        assert_eq!(sent.remote_jid, "5511999998888@s.whatsapp.net");
        assert_eq!(sent.timestamp, 1_700_000_000);

        client.shutdown().await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(5), bridge).await;
    }

    #[tokio::test]
    async fn test_bridge_send_error_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"connected"}"#.to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(raw) = msg {
                    let req: serde_json::Value = serde_json::from_str(raw.as_str()).unwrap();
                    let nack = serde_json::json!({
                        "type": "send_error",
                        "id": req["id"],
                        "reason": "number not on WhatsApp"
                    });
                    ws.send(WsMessage::Text(nack.to_string().into()))
                        .await
                        .unwrap();
                }
            }
        });

        let client =
            BridgeClient::new(&format!("ws://{}", addr), Duration::from_secs(5)).unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        client.initialize(events_tx).await.unwrap();
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            SessionEvent::Ready { me: None }
        ));

        let err = client.send_text(&recipient(), "hi").await.unwrap_err();
        assert!(matches!(err, GateError::WhatsApp(_)));
        assert!(err.to_string().contains("not on WhatsApp"));

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_backoff_rejects_frames_queued_before_drop() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (ack_tx, ack_rx) = oneshot::channel();
        pending.lock().await.insert(
            "late".to_string(),
            PendingSend {
                to: "5511999998888@s.whatsapp.net".to_string(),
                ack: ack_tx,
            },
        );
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        outbound_tx
            .send(BridgeSendMessage {
                msg_type: "send".to_string(),
                id: "late".to_string(),
                to: "5511999998888@s.whatsapp.net".to_string(),
                content: "hi".to_string(),
            })
            .await
            .unwrap();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let keep_running = BridgeClient::backoff_rejecting(
            Duration::from_millis(20),
            &pending,
            &mut shutdown_rx,
            &mut outbound_rx,
        )
        .await;
        assert!(keep_running);
        assert!(matches!(ack_rx.await.unwrap(), Err(GateError::NotReady(_))));
        assert!(outbound_rx.try_recv().is_err());
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_backoff_stops_on_shutdown() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (_outbound_tx, mut outbound_rx) = mpsc::channel::<BridgeSendMessage>(4);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let keep_running = BridgeClient::backoff_rejecting(
            Duration::from_secs(60),
            &pending,
            &mut shutdown_rx,
            &mut outbound_rx,
        )
        .await;
        assert!(!keep_running);
    }

    #[tokio::test]
    async fn test_bridge_send_times_out_without_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accepts sends but never acknowledges them.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"connected"}"#.to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client =
            BridgeClient::new(&format!("ws://{}", addr), Duration::from_secs(1)).unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        client.initialize(events_tx).await.unwrap();
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            SessionEvent::Ready { .. }
        ));

        let started = std::time::Instant::now();
        let err = client.send_text(&recipient(), "hi").await.unwrap_err();
        assert!(matches!(err, GateError::Timeout(_)), "got: {:?}", err);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(client.pending.lock().await.is_empty());

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bridge_connection_lost_fails_in_flight_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Drops the socket as soon as a send arrives.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"connected"}"#.to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    break;
                }
            }
            drop(ws);
        });

        let client =
            BridgeClient::new(&format!("ws://{}", addr), Duration::from_secs(10)).unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        client.initialize(events_tx).await.unwrap();
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            SessionEvent::Ready { .. }
        ));

        let err = client.send_text(&recipient(), "hi").await.unwrap_err();
        assert!(matches!(err, GateError::NotReady(_)), "got: {:?}", err);
        assert!(err.to_string().contains(CONNECTION_LOST));

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Disconnected {
                reason: CONNECTION_LOST.to_string()
            }
        );
        assert!(!client.is_connected());

        client.shutdown().await.unwrap();
    }
}
