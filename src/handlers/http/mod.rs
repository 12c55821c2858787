//! HTTP API for event submission and query.
//!
//! Endpoints:
//! - `POST /events/generate` - mint an event and publish it to the broker
//! - `GET /events/processed` - events accepted by the consumer, first-seen order
//! - `GET /health` - consumer state and outcome counters

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::consumer::{ConsumerState, ConsumerStats};
use crate::event::{ActivityEvent, Payload};
use crate::ids::IdGenerator;
use crate::publisher::EventPublisher;
use crate::store::IdempotentStore;

const MISSING_FIELDS: &str = "userId and eventType are required";
const PAYLOAD_NOT_OBJECT: &str = "payload must be a JSON object";
const PUBLISH_FAILED: &str = "Failed to publish event";

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<EventPublisher>,
    pub store: Arc<IdempotentStore>,
    pub ids: Arc<dyn IdGenerator>,
    /// Consumer-side bus, queried for its state.
    pub bus: Arc<dyn EventBus>,
    pub stats: Arc<ConsumerStats>,
}

/// Start the HTTP server and run until `shutdown` resolves.
///
/// In-flight requests finish before this returns.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events/generate", post(generate_event))
        .route("/events/processed", get(processed_events))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn generate_event(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected submission body");
            return error_response(StatusCode::BAD_REQUEST, MISSING_FIELDS);
        }
    };

    let (user_id, event_type) = match (non_empty(request.user_id), non_empty(request.event_type)) {
        (Some(user_id), Some(event_type)) => (user_id, event_type),
        _ => return error_response(StatusCode::BAD_REQUEST, MISSING_FIELDS),
    };

    let payload = match request.payload {
        None | Some(Value::Null) => Payload::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return error_response(StatusCode::BAD_REQUEST, PAYLOAD_NOT_OBJECT),
    };

    let event = ActivityEvent::new(state.ids.generate(), user_id, event_type, payload);

    match state.publisher.publish(&event).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(GenerateResponse {
                message: "Event published",
                event_id: event.event_id(),
            }),
        )
            .into_response(),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, PUBLISH_FAILED),
    }
}

async fn processed_events(State(state): State<AppState>) -> Response {
    let events = state.store.list().await;
    let body: Vec<&ActivityEvent> = events.iter().map(|event| &**event).collect();
    Json(body).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let consumer = state.bus.state();
    let stats = state.stats.snapshot();

    let (status, label) = if consumer == ConsumerState::Running {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let body = json!({
        "status": label,
        "consumer": consumer.as_str(),
        "processed": stats.processed,
        "duplicates": stats.duplicates,
        "skipped": stats.skipped,
        "stored": state.store.len().await,
    });
    (status, Json(body)).into_response()
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    user_id: Option<String>,
    event_type: Option<String>,
    payload: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse<'a> {
    message: &'static str,
    event_id: &'a str,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
