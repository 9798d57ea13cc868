//! Session state types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection state, using the Evolution API strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Connected and able to send.
    Open,
    /// Starting up, waiting for a QR scan, or syncing after pairing.
    Connecting,
    /// Not connected.
    #[default]
    Close,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Open => "open",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Close => "close",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The latest pairing QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrSnapshot {
    /// Raw pairing payload.
    pub code: String,
    /// QR codes issued since the last successful connection.
    pub count: u32,
    pub generated_at: DateTime<Utc>,
}

/// Point-in-time view of the WhatsApp session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub qr: Option<QrSnapshot>,
    /// Own JID, once known.
    pub me: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// QR codes issued since the last connection (0 when none).
    pub fn qr_count(&self) -> u32 {
        self.qr.as_ref().map(|q| q.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ConnectionState::Open).unwrap(),
            serde_json::json!("open")
        );
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Close);
    }

    #[test]
    fn test_default_snapshot_not_ready() {
        let snap = SessionSnapshot::default();
        assert!(!snap.is_ready());
        assert_eq!(snap.qr_count(), 0);
    }
}
