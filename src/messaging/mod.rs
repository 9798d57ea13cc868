//! Outbound message dispatch.
//!
//! [`Dispatcher`] validates and normalizes send requests, checks the session,
//! and hands messages to the WhatsApp client one at a time. Batches are sent
//! sequentially with a fixed pause between sends; a failed item is recorded
//! and the batch moves on. Nothing is queued or retried.

pub mod types;

pub use types::{BatchItem, BatchReport, BatchResult, BatchStatus, SendOutcome};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MessagingConfig;
use crate::error::{GateError, Result};
use crate::metrics::UsageMetrics;
use crate::session::Session;
use crate::utils::phone::{normalize_number, Recipient};

pub struct Dispatcher {
    session: Arc<Session>,
    config: MessagingConfig,
    metrics: Arc<UsageMetrics>,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, config: MessagingConfig, metrics: Arc<UsageMetrics>) -> Self {
        Self {
            session,
            config,
            metrics,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Validate text and normalize the number.
    fn prepare(&self, number: &str, text: &str) -> Result<(Recipient, String)> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GateError::InvalidRequest("text is empty".to_string()));
        }
        let len = text.chars().count();
        if len > self.config.max_text_length {
            return Err(GateError::InvalidRequest(format!(
                "text is {} characters, the limit is {}",
                len, self.config.max_text_length
            )));
        }
        let recipient = normalize_number(number, self.config.default_country_code.as_deref())?;
        Ok((recipient, text.to_string()))
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.session.is_ready() {
            return Ok(());
        }
        let snap = self.session.snapshot();
        Err(GateError::NotReady(format!(
            "instance state is '{}'{}",
            snap.state,
            snap.last_error
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        )))
    }

    fn clamp_delay(&self, delay_ms: u64) -> Duration {
        Duration::from_millis(delay_ms.min(self.config.max_delay_ms))
    }

    /// Send one text message. `delay_ms` is slept before sending.
    pub async fn send_text(
        &self,
        number: &str,
        text: &str,
        delay_ms: Option<u64>,
    ) -> Result<SendOutcome> {
        let result = self.try_send_text(number, text, delay_ms).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_sent();
                info!(
                    to = %outcome.recipient.jid,
                    message_id = %outcome.message.id,
                    "Message sent"
                );
            }
            Err(e) => {
                self.metrics.record_failed();
                warn!(number = number, "Message not sent: {}", e);
            }
        }
        result
    }

    async fn try_send_text(
        &self,
        number: &str,
        text: &str,
        delay_ms: Option<u64>,
    ) -> Result<SendOutcome> {
        let (recipient, text) = self.prepare(number, text)?;
        self.ensure_ready()?;

        if let Some(delay) = delay_ms.map(|d| self.clamp_delay(d)).filter(|d| !d.is_zero()) {
            debug!(delay_ms = delay.as_millis() as u64, "Delaying send");
            tokio::time::sleep(delay).await;
            self.ensure_ready()?;
        }

        let message = self.session.client().send_text(&recipient, &text).await?;
        Ok(SendOutcome {
            recipient,
            text,
            message,
        })
    }

    /// Send `items` in order, pausing between consecutive WhatsApp sends.
    ///
    /// `delay_ms` overrides `messaging.batch_delay_ms` and is clamped to
    /// `messaging.max_delay_ms`.
    pub async fn send_batch(&self, items: Vec<BatchItem>, delay_ms: Option<u64>) -> Result<BatchReport> {
        if items.is_empty() {
            return Err(GateError::InvalidRequest("batch contains no messages".to_string()));
        }
        if items.len() > self.config.max_batch_size {
            return Err(GateError::InvalidRequest(format!(
                "batch contains {} messages, the limit is {}",
                items.len(),
                self.config.max_batch_size
            )));
        }
        self.ensure_ready()?;

        let delay = self.clamp_delay(delay_ms.unwrap_or(self.config.batch_delay_ms));
        let total = items.len();
        info!(
            total = total,
            delay_ms = delay.as_millis() as u64,
            "Batch send started"
        );

        let mut results = Vec::with_capacity(total);
        let mut attempted_send = false;

        for (index, item) in items.into_iter().enumerate() {
            let (recipient, text) = match self.prepare(&item.number, &item.text) {
                Ok(prepared) => prepared,
                Err(e) => {
                    self.metrics.record_failed();
                    debug!(index = index, "Batch item rejected: {}", e);
                    results.push(BatchResult::failed(index, item.number, e.to_string()));
                    continue;
                }
            };

            if attempted_send && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Err(e) = self.ensure_ready() {
                self.metrics.record_failed();
                results.push(BatchResult::failed(index, item.number, e.to_string()));
                continue;
            }

            attempted_send = true;
            match self.session.client().send_text(&recipient, &text).await {
                Ok(message) => {
                    self.metrics.record_sent();
                    debug!(index = index, to = %recipient.jid, "Batch item sent");
                    results.push(BatchResult::sent(index, item.number, message));
                }
                Err(e) => {
                    self.metrics.record_failed();
                    warn!(index = index, to = %recipient.jid, "Batch item failed: {}", e);
                    results.push(BatchResult::failed(index, item.number, e.to_string()));
                }
            }
        }

        let report = BatchReport::from_results(results);
        info!(
            total = report.total,
            sent = report.sent,
            failed = report.failed,
            "Batch send finished"
        );
        Ok(report)
    }
}
