//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "server",
    "auth",
    "cors",
    "rate_limit",
    "instance",
    "messaging",
    "whatsapp",
    "logging",
    "metrics",
];

/// Known fields for each section.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    (
        "server",
        &["host", "port", "max_body_bytes", "trust_forwarded_for"],
    ),
    ("auth", &["api_key"]),
    ("cors", &["allowed_origins", "max_age_secs"]),
    (
        "rate_limit",
        &["requests_per_minute", "send_per_minute", "sweep_interval_secs"],
    ),
    ("instance", &["name"]),
    (
        "messaging",
        &[
            "batch_delay_ms",
            "max_delay_ms",
            "max_batch_size",
            "max_text_length",
            "default_country_code",
        ],
    ),
    (
        "whatsapp",
        &[
            "backend",
            "bridge_url",
            "send_timeout_secs",
            "session_path",
            "pair_phone",
            "print_qr",
        ],
    ),
    ("logging", &["format", "level", "file"]),
    ("metrics", &["flush_interval_secs"]),
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let msg = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::new(DiagnosticLevel::Error, path, msg)
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let known_set: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(key.clone(), key, KNOWN_TOP_LEVEL));
        }
    }

    for (section, known) in KNOWN_SECTIONS {
        let Some(fields) = obj.get(*section).and_then(|v| v.as_object()) else {
            continue;
        };
        for key in fields.keys() {
            if !known.contains(&key.as_str()) {
                has_unknown = true;
                diagnostics.push(unknown_field(format!("{}.{}", section, key), key, known));
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Semantic checks on a resolved configuration (after env overrides).
///
/// `serve` refuses to start while any [`DiagnosticLevel::Error`] is present.
pub fn validate_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.auth.api_key.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "auth.api_key",
            "API key is empty (set it in the config or EVOGATE_AUTH_API_KEY)",
        ));
    }

    if config.server.port == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "server.port",
            "Port must be between 1 and 65535",
        ));
    }

    if config.instance.name.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "instance.name",
            "Instance name must not be empty",
        ));
    }

    if let Some(code) = &config.messaging.default_country_code {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) || code.len() > 4 {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "messaging.default_country_code",
                format!("'{}' is not a country calling code (1-4 digits)", code),
            ));
        }
    }

    if config.messaging.max_batch_size == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "messaging.max_batch_size",
            "Must allow at least one message",
        ));
    }

    if config.messaging.batch_delay_ms > config.messaging.max_delay_ms {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "messaging.batch_delay_ms",
            format!(
                "Exceeds max_delay_ms ({}); the default delay will be clamped",
                config.messaging.max_delay_ms
            ),
        ));
    }

    if config.whatsapp.send_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "whatsapp.send_timeout_secs",
            "Send timeout must be at least one second",
        ));
    }

    if config.cors.allows_any() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "cors.allowed_origins",
            "Wildcard origin: any web page can call the API with a valid key",
        ));
    }

    diagnostics
}

/// Count diagnostics at `level`.
pub fn count_level(diagnostics: &[Diagnostic], level: DiagnosticLevel) -> usize {
    diagnostics.iter().filter(|d| d.level == level).count()
}
