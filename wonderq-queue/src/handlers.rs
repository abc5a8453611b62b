//! HTTP handlers for the queue service

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, patch},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use wonderq_core::{ApiError, ErrorCode};

use crate::message::MessageId;
use crate::queue::{Queue, QueueConfig};
use crate::registry::QueueRegistry;

/// Number of messages leased by a GET without `amount`
pub const DEFAULT_RECEIVE_AMOUNT: usize = 1;

/// State for queue handlers
#[derive(Debug)]
pub struct AppState {
    pub registry: Arc<QueueRegistry>,
    /// Queue served on the root routes
    pub default_queue: String,
    pub receive_amount: usize,
}

impl AppState {
    pub fn new(registry: Arc<QueueRegistry>, default_queue: impl Into<String>) -> Self {
        Self {
            registry,
            default_queue: default_queue.into(),
            receive_amount: DEFAULT_RECEIVE_AMOUNT,
        }
    }

    pub fn with_receive_amount(mut self, amount: usize) -> Self {
        self.receive_amount = amount;
        self
    }
}

/// Routes for the default queue and for named queues
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(receive_default).post(send_default))
        .route("/:id", patch(confirm_default).post(confirm_default))
        .route("/queues", get(list_queues).post(create_queue))
        .route("/queues/:name", get(receive_named).post(send_named))
        .route("/queues/:name/stats", get(queue_stats))
        .route("/queues/:name/:id", patch(confirm_named).post(confirm_named))
        .with_state(state)
}

// === Request / response bodies ===

#[derive(Debug, Deserialize)]
pub struct ReceiveQuery {
    /// Taken as a number; anything that is not a positive number leases nothing
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    /// Lease duration in milliseconds
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreateQueueRequest {
    name: String,
    timeout: Option<u64>,
    batch: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MessageView {
    id: MessageId,
    body: Value,
}

#[derive(Debug, Serialize)]
struct ReceiveResponse {
    messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    #[serde(rename = "messageID")]
    message_id: MessageId,
}

#[derive(Debug, Serialize)]
struct CreateQueueResponse {
    name: String,
}

#[derive(Debug, Serialize)]
struct ListQueuesResponse {
    queues: Vec<String>,
}

// === Default queue ===

async fn receive_default(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReceiveQuery>, QueryRejection>,
) -> Response {
    let queue = match lookup(&state, &state.default_queue) {
        Ok(queue) => queue,
        Err(response) => return response,
    };
    receive(&queue, query, state.receive_amount)
}

async fn send_default(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SendQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    send(&state, &state.default_queue, query, &body)
}

async fn confirm_default(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    confirm(&state, &state.default_queue, &id)
}

// === Named queues ===

async fn list_queues(State(state): State<Arc<AppState>>) -> Response {
    json_response(
        StatusCode::OK,
        &ListQueuesResponse {
            queues: state.registry.list_queues(),
        },
    )
}

async fn create_queue(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: CreateQueueRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(ApiError::invalid_parameter(format!(
                "Invalid create queue request: {}",
                e
            )))
        }
    };

    if request.name.is_empty() {
        return error_response(ApiError::invalid_parameter("Queue name is required"));
    }

    let defaults = state.registry.defaults();
    let config = QueueConfig {
        lease_duration: request
            .timeout
            .map_or(defaults.lease_duration, Duration::from_millis),
        receive_batch: request.batch.unwrap_or(defaults.receive_batch),
    };

    match state
        .registry
        .create_queue_with_config(&request.name, config)
    {
        Ok(queue) => json_response(
            StatusCode::CREATED,
            &CreateQueueResponse {
                name: queue.name().to_string(),
            },
        ),
        Err(e) => error_response(e.into()),
    }
}

async fn receive_named(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    query: Result<Query<ReceiveQuery>, QueryRejection>,
) -> Response {
    let queue = match lookup(&state, &name) {
        Ok(queue) => queue,
        Err(response) => return response,
    };
    let batch = queue.config().receive_batch;
    receive(&queue, query, batch)
}

async fn send_named(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    query: Result<Query<SendQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    send(&state, &name, query, &body)
}

async fn confirm_named(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    confirm(&state, &name, &id)
}

async fn queue_stats(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.registry.get_queue(&name) {
        Ok(queue) => json_response(StatusCode::OK, &queue.stats()),
        Err(e) => error_response(e.into()),
    }
}

// === Operations ===

fn lookup(state: &AppState, name: &str) -> Result<Queue, Response> {
    state
        .registry
        .get_queue(name)
        .map_err(|e| error_response(e.into()))
}

/// Parse a receive `amount`. Fractions round up; non-numbers, negatives and
/// NaN lease nothing.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_amount(raw: &str) -> usize {
    raw.trim()
        .parse::<f64>()
        .map_or(0, |amount| amount.ceil() as usize)
}

fn receive(
    queue: &Queue,
    query: Result<Query<ReceiveQuery>, QueryRejection>,
    default_amount: usize,
) -> Response {
    let name = queue.name();
    let amount = match query {
        Ok(Query(ReceiveQuery { amount: Some(raw) })) => parse_amount(&raw),
        Ok(Query(ReceiveQuery { amount: None })) => default_amount,
        Err(e) => {
            warn!(queue = %name, error = %e.body_text(), "Unreadable receive query");
            0
        }
    };

    let messages = queue
        .pop_front(amount)
        .into_iter()
        .map(|m| MessageView {
            id: m.id,
            body: m.body,
        })
        .collect::<Vec<_>>();

    info!(queue = %name, requested = amount, count = messages.len(), "Received messages");
    json_response(StatusCode::OK, &ReceiveResponse { messages })
}

fn send(
    state: &AppState,
    name: &str,
    query: Result<Query<SendQuery>, QueryRejection>,
    body: &[u8],
) -> Response {
    let queue = match lookup(state, name) {
        Ok(queue) => queue,
        Err(response) => return response,
    };
    let timeout = match query {
        Ok(Query(query)) => query.timeout,
        Err(e) => {
            return error_response(ApiError::invalid_parameter(format!(
                "Invalid timeout: {}",
                e.body_text()
            )))
        }
    };

    let payload = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                return error_response(ApiError::invalid_parameter(format!(
                    "Message body must be JSON: {}",
                    e
                )))
            }
        }
    };

    let message_id = match timeout {
        Some(ms) => queue.push_with_lease(payload, Duration::from_millis(ms)),
        None => queue.push(payload),
    };

    info!(queue = %name, message_id = %message_id, "Sent message");
    json_response(StatusCode::CREATED, &SendResponse { message_id })
}

fn confirm(state: &AppState, name: &str, id: &str) -> Response {
    let queue = match lookup(state, name) {
        Ok(queue) => queue,
        Err(response) => return response,
    };
    let Ok(message_id) = id.parse::<MessageId>() else {
        warn!(queue = %name, id = %id, "Confirm with malformed message ID");
        return error_response(ApiError::new(
            ErrorCode::MessageNotConfirmable,
            format!("Message with ID {} is not available for confirm", id),
        ));
    };

    match queue.confirm(message_id) {
        Ok(()) => {
            info!(queue = %name, message_id = %message_id, "Confirmed message");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            response
        }
        Err(e) => error_response(e.into()),
    }
}

// === Response helpers ===

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => {
            let mut response = Response::new(Body::from(json));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => error_response(ApiError::new(ErrorCode::InternalError, e.to_string())),
    }
}

fn error_response(error: ApiError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(error.to_json()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
