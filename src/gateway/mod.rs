//! Gateway module - the Evolution-compatible REST surface
//!
//! Routes are served for a single configured instance. Layers, outermost
//! first: CORS, request tracing, body limit, rate limiting, then API-key auth
//! on the authenticated routes.

pub mod instance;
pub mod message;
pub mod middleware;
pub mod rate_limit;
pub mod response;

pub use rate_limit::{ApiRateLimiter, SlidingWindowRateLimiter};
pub use response::ApiError;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderName, HeaderValue, Method, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::{Config, CorsConfig};
use crate::messaging::Dispatcher;
use crate::metrics::UsageMetrics;
use crate::session::Session;

/// Name reported as `clientName` on the welcome route.
pub const CLIENT_NAME: &str = "evogate";

/// State shared by every handler.
pub struct AppState {
    pub instance_name: String,
    pub api_key: String,
    pub trust_forwarded_for: bool,
    pub session: Arc<Session>,
    pub dispatcher: Dispatcher,
    pub limiter: ApiRateLimiter,
    pub metrics: Arc<UsageMetrics>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: &Config, session: Arc<Session>, metrics: Arc<UsageMetrics>) -> SharedState {
        Arc::new(Self {
            instance_name: config.instance.name.clone(),
            api_key: config.auth.api_key.clone(),
            trust_forwarded_for: config.server.trust_forwarded_for,
            dispatcher: Dispatcher::new(
                Arc::clone(&session),
                config.messaging.clone(),
                Arc::clone(&metrics),
            ),
            session,
            limiter: ApiRateLimiter::from_config(&config.rate_limit),
            metrics,
        })
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::API_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(config.max_age_secs));

    if config.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the router with every layer attached.
pub fn build_router(state: SharedState, config: &Config) -> Router {
    let authenticated = Router::new()
        .route("/instance/fetchInstances", get(instance::fetch_instances))
        .route(
            "/instance/connectionState/{instance}",
            get(instance::connection_state),
        )
        .route("/instance/connect/{instance}", get(instance::connect))
        .route("/message/sendText/{instance}", post(message::send_text))
        .route("/message/sendBatch/{instance}", post(message::send_batch))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::require_api_key,
        ));

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .merge(authenticated)
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::enforce_rate_limit,
        ))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors))
        .with_state(state)
}

async fn welcome() -> Json<Value> {
    Json(json!({
        "status": 200,
        "message": "Welcome to the Evolution API, it is working!",
        "version": env!("CARGO_PKG_VERSION"),
        "clientName": CLIENT_NAME,
    }))
}

async fn health(State(state): State<SharedState>) -> Json<Value> {
    let snap = state.session.snapshot();
    Json(json!({
        "status": "ok",
        "uptime_secs": state.metrics.uptime().as_secs(),
        "session": {
            "state": snap.state,
            "ready": snap.is_ready(),
        },
    }))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        axum::http::StatusCode::NOT_FOUND,
        format!("Cannot {} {}", method, uri.path()),
    )
}

/// Sweep idle rate-limit entries until `shutdown_rx` fires.
pub fn start_rate_limit_sweeper(
    state: SharedState,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    state.limiter.sweep();
                    debug!(tracked = state.limiter.entry_count(), "Rate limiter swept");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
