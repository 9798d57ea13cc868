//! Configuration management for evogate
//!
//! This module provides configuration loading and saving.
//! Configuration is loaded from `~/.evogate/config.json` with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the evogate configuration directory path (~/.evogate)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".evogate")
    }

    /// Returns the path to the config file.
    ///
    /// `EVOGATE_CONFIG` wins over the default `~/.evogate/config.json`.
    pub fn path() -> PathBuf {
        match std::env::var("EVOGATE_CONFIG") {
            Ok(p) if !p.trim().is_empty() => expand_home(p.trim()),
            _ => Self::dir().join("config.json"),
        }
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a config file without applying environment overrides.
    pub fn read_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply environment variable overrides from the process environment.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Variables follow the pattern `EVOGATE_SECTION_KEY`. The Evolution API
    /// names `AUTHENTICATION_API_KEY` and `SERVER_PORT` are honoured when the
    /// `EVOGATE_` equivalents are unset.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        // Server
        if let Some(val) = lookup("EVOGATE_SERVER_HOST") {
            self.server.host = val.trim().to_string();
        }
        if let Some(val) = first(&["EVOGATE_SERVER_PORT", "SERVER_PORT"]) {
            if let Ok(v) = val.trim().parse() {
                self.server.port = v;
            }
        }
        if let Some(val) = lookup("EVOGATE_SERVER_TRUST_FORWARDED_FOR") {
            if let Ok(v) = val.trim().parse() {
                self.server.trust_forwarded_for = v;
            }
        }

        // Auth
        if let Some(val) = first(&["EVOGATE_AUTH_API_KEY", "AUTHENTICATION_API_KEY"]) {
            self.auth.api_key = val.trim().to_string();
        }

        // Instance
        if let Some(val) = lookup("EVOGATE_INSTANCE_NAME") {
            self.instance.name = val.trim().to_string();
        }

        // CORS
        if let Some(val) = lookup("EVOGATE_CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        // Rate limit
        if let Some(val) = lookup("EVOGATE_RATE_LIMIT_REQUESTS_PER_MINUTE") {
            if let Ok(v) = val.trim().parse() {
                self.rate_limit.requests_per_minute = v;
            }
        }
        if let Some(val) = lookup("EVOGATE_RATE_LIMIT_SEND_PER_MINUTE") {
            if let Ok(v) = val.trim().parse() {
                self.rate_limit.send_per_minute = v;
            }
        }

        // Messaging
        if let Some(val) = lookup("EVOGATE_MESSAGING_BATCH_DELAY_MS") {
            if let Ok(v) = val.trim().parse() {
                self.messaging.batch_delay_ms = v;
            }
        }
        if let Some(val) = lookup("EVOGATE_MESSAGING_DEFAULT_COUNTRY_CODE") {
            let code = val.trim().trim_start_matches('+').to_string();
            self.messaging.default_country_code = if code.is_empty() { None } else { Some(code) };
        }

        // WhatsApp
        if let Some(val) = lookup("EVOGATE_WHATSAPP_BACKEND") {
            if let Ok(v) = val.parse() {
                self.whatsapp.backend = v;
            }
        }
        if let Some(val) = lookup("EVOGATE_WHATSAPP_BRIDGE_URL") {
            self.whatsapp.bridge_url = val.trim().to_string();
        }
        if let Some(val) = lookup("EVOGATE_WHATSAPP_SESSION_PATH") {
            self.whatsapp.session_path = val.trim().to_string();
        }
        if let Some(val) = lookup("EVOGATE_WHATSAPP_PAIR_PHONE") {
            let phone = val.trim().to_string();
            self.whatsapp.pair_phone = if phone.is_empty() { None } else { Some(phone) };
        }

        // Logging
        if let Some(val) = lookup("EVOGATE_LOGGING_LEVEL") {
            self.logging.level = val.trim().to_string();
        }
        if let Some(val) = lookup("EVOGATE_LOGGING_FORMAT") {
            if let Ok(v) = val.parse() {
                self.logging.format = v;
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        copy.auth.api_key = mask_secret(&self.auth.api_key);
        copy
    }
}

/// Keep the first four characters of a secret and mask the rest.
fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    format!("{}****", visible)
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(path);
    }

    if let Some(home) = dirs::home_dir() {
        if path == "~" {
            return home;
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}
