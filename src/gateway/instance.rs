//! `/instance/*` handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::session::ConnectionState;
use crate::whatsapp::qr;

use super::response::ApiError;
use super::SharedState;

/// 404 unless `name` is the configured instance.
pub(super) fn ensure_instance(state: &SharedState, name: &str) -> Result<(), ApiError> {
    if name == state.instance_name {
        Ok(())
    } else {
        Err(ApiError::instance_not_found(name))
    }
}

fn instance_state(state: &SharedState, connection: ConnectionState) -> Value {
    json!({
        "instance": {
            "instanceName": state.instance_name,
            "state": connection,
        }
    })
}

/// `GET /instance/fetchInstances`
pub async fn fetch_instances(State(state): State<SharedState>) -> Json<Value> {
    let snap = state.session.snapshot();
    Json(json!([{
        "instance": {
            "instanceName": state.instance_name,
            "status": snap.state,
            "owner": snap.me,
        }
    }]))
}

/// `GET /instance/connectionState/{instance}`
pub async fn connection_state(
    State(state): State<SharedState>,
    Path(instance): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ensure_instance(&state, &instance)?;
    Ok(Json(instance_state(&state, state.session.state())))
}

/// `GET /instance/connect/{instance}`
///
/// Returns the current pairing QR while one is pending.
pub async fn connect(
    State(state): State<SharedState>,
    Path(instance): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ensure_instance(&state, &instance)?;

    let snap = state.session.snapshot();
    if snap.is_ready() {
        return Ok(Json(instance_state(&state, snap.state)));
    }

    match snap.qr {
        Some(current) => {
            let base64 = qr::render_data_uri(&current.code)?;
            Ok(Json(json!({
                "pairingCode": null,
                "code": current.code,
                "base64": base64,
                "count": current.count,
            })))
        }
        None => Ok(Json(json!({ "count": 0 }))),
    }
}
