//! `/message/*` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::messaging::{BatchItem, BatchReport};

use super::instance::ensure_instance;
use super::response::ApiError;
use super::SharedState;

/// Numbers may arrive as JSON strings or integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Text(String),
    Integer(u64),
}

impl NumberField {
    fn into_string(self) -> String {
        match self {
            NumberField::Text(s) => s,
            NumberField::Integer(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub delay: Option<u64>,
}

/// Accepts both the v2 (`text`, `delay`) and v1 (`textMessage`, `options`) shapes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextBody {
    pub number: NumberField,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_message: Option<TextMessage>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub options: Option<SendOptions>,
}

impl SendTextBody {
    fn into_parts(self) -> (String, String, Option<u64>) {
        let text = self
            .text
            .or(self.text_message.map(|m| m.text))
            .unwrap_or_default();
        let delay = self.delay.or(self.options.and_then(|o| o.delay));
        (self.number.into_string(), text, delay)
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchEntry {
    pub number: NumberField,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendBatchBody {
    #[serde(default)]
    pub messages: Vec<BatchEntry>,
    #[serde(default)]
    pub numbers: Vec<NumberField>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub delay: Option<u64>,
}

impl SendBatchBody {
    fn into_items(self) -> Result<(Vec<BatchItem>, Option<u64>), ApiError> {
        let shared = self.text.unwrap_or_default();
        if !self.numbers.is_empty() && shared.trim().is_empty() {
            return Err(ApiError::bad_request(
                "\"text\" is required when \"numbers\" is used",
            ));
        }

        let mut items: Vec<BatchItem> = self
            .messages
            .into_iter()
            .map(|entry| {
                let text = entry.text.unwrap_or_else(|| shared.clone());
                BatchItem::new(entry.number.into_string(), text)
            })
            .collect();
        items.extend(
            self.numbers
                .into_iter()
                .map(|number| BatchItem::new(number.into_string(), shared.clone())),
        );
        Ok((items, self.delay))
    }
}

/// `POST /message/sendText/{instance}`
pub async fn send_text(
    State(state): State<SharedState>,
    Path(instance): Path<String>,
    body: Result<Json<SendTextBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ensure_instance(&state, &instance)?;
    let Json(body) = body?;
    let (number, text, delay) = body.into_parts();

    let outcome = state.dispatcher.send_text(&number, &text, delay).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "key": {
                "remoteJid": outcome.message.remote_jid,
                "fromMe": true,
                "id": outcome.message.id,
            },
            "message": { "conversation": outcome.text },
            "messageTimestamp": outcome.message.timestamp,
            "status": "PENDING",
        })),
    ))
}

/// `POST /message/sendBatch/{instance}`
pub async fn send_batch(
    State(state): State<SharedState>,
    Path(instance): Path<String>,
    body: Result<Json<SendBatchBody>, JsonRejection>,
) -> Result<Json<BatchReport>, ApiError> {
    ensure_instance(&state, &instance)?;
    let Json(body) = body?;
    let (items, delay) = body.into_items()?;

    let report = state.dispatcher.send_batch(items, delay).await?;
    Ok(Json(report))
}
