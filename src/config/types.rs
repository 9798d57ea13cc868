//! Configuration type definitions for evogate
//!
//! This module defines all configuration structs used by the gateway.
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration struct for evogate
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// API key authentication
    pub auth: AuthConfig,
    /// Cross-origin resource sharing
    pub cors: CorsConfig,
    /// Per-minute request budgets
    pub rate_limit: RateLimitConfig,
    /// The single WhatsApp instance exposed on the REST surface
    pub instance: InstanceConfig,
    /// Send and batch behaviour
    pub messaging: MessagingConfig,
    /// WhatsApp client backend
    pub whatsapp: WhatsAppConfig,
    /// Logging output
    pub logging: LoggingConfig,
    /// Usage summary emission
    pub metrics: MetricsConfig,
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Use the first `X-Forwarded-For` entry as the client IP for rate limiting.
    /// Only enable behind a reverse proxy that sets the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 1_048_576,
            trust_forwarded_for: false,
        }
    }
}

// ============================================================================
// Auth Configuration
// ============================================================================

/// API key authentication.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Global API key expected in the `apikey` header. Must not be empty.
    pub api_key: String,
}

// ============================================================================
// CORS Configuration
// ============================================================================

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    /// Whether any origin is accepted.
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

// ============================================================================
// Rate Limit Configuration
// ============================================================================

/// Per-IP request budgets, counted over a sliding one-minute window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute across all rate-limited routes. 0 = unlimited.
    pub requests_per_minute: u32,
    /// Additional budget for send endpoints. 0 = unlimited.
    pub send_per_minute: u32,
    /// How often idle client entries are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            send_per_minute: 30,
            sweep_interval_secs: 300,
        }
    }
}

// ============================================================================
// Instance Configuration
// ============================================================================

/// The single instance exposed as `/{instance}` in Evolution-style paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instance name expected in request paths.
    pub name: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

// ============================================================================
// Messaging Configuration
// ============================================================================

/// Send and batch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Fixed delay between consecutive sends in a batch, in milliseconds.
    pub batch_delay_ms: u64,
    /// Upper bound for any caller-supplied delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum number of messages accepted in one batch request.
    pub max_batch_size: usize,
    /// Maximum text length in characters.
    pub max_text_length: usize,
    /// Country code prefixed to short numbers (e.g. "55"). Digits only.
    pub default_country_code: Option<String>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 2000,
            max_delay_ms: 60_000,
            max_batch_size: 200,
            max_text_length: 4096,
            default_country_code: None,
        }
    }
}

// ============================================================================
// WhatsApp Configuration
// ============================================================================

/// Which WhatsApp client implementation drives the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WhatsAppBackend {
    /// External bridge process over WebSocket.
    #[default]
    Bridge,
    /// In-process wa-rs client (requires the `whatsapp-web` feature).
    Native,
}

impl std::str::FromStr for WhatsAppBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "native" => Ok(Self::Native),
            other => Err(format!("unknown WhatsApp backend '{}'", other)),
        }
    }
}

/// WhatsApp client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Client backend
    pub backend: WhatsAppBackend,
    /// Bridge WebSocket URL (bridge backend)
    pub bridge_url: String,
    /// Seconds to wait for a send acknowledgement
    pub send_timeout_secs: u64,
    /// SQLite session database path (native backend)
    pub session_path: String,
    /// Phone number for pair-code linking instead of QR (native backend)
    pub pair_phone: Option<String>,
    /// Render each new QR code to the terminal log
    pub print_qr: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            backend: WhatsAppBackend::default(),
            bridge_url: "ws://127.0.0.1:3001".to_string(),
            send_timeout_secs: 30,
            session_path: "~/.evogate/whatsapp-session.db".to_string(),
            pair_phone: None,
            print_qr: true,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Compact single-line output, grep-friendly.
    #[default]
    Component,
    /// JSON lines for log aggregators.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "component" => Ok(Self::Component),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Optional log file (appended). Stdout when unset.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}

// ============================================================================
// Metrics Configuration
// ============================================================================

/// Usage summary emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between `usage_summary` log lines. 0 disables periodic emission.
    pub flush_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
        }
    }
}
