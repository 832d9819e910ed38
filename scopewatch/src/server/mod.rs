//! # HTTP Query Surface
//!
//! Thin axum binding of [`QueryService`] to the JSON routes:
//!
//! | Route                        | Body                                  |
//! |------------------------------|---------------------------------------|
//! | `GET /tasks.json`            | recursive task/scope tree             |
//! | `GET /task/:id/stacktrace.json` | `{"stacktrace": [frame, ...]}`     |
//! | `GET /scope/:id/cancel`      | always an error (not implemented)     |
//! | `GET /stats.json`            | scheduler counters                    |
//!
//! Failures are `{"error": "<message>"}` with the status from
//! [`status_for`].

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info, warn};
use scopewatch_common::{StacktraceView, StatsView};
use serde_json::json;
use tokio::net::TcpListener;

use crate::domain::{QueryError, ScopeId, ServerError, TaskId};
use crate::query::QueryService;

/// Where the query surface listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 5000)
    }
}

/// HTTP status for each query failure
pub fn status_for(error: &QueryError) -> StatusCode {
    match error {
        QueryError::NotFound(_) | QueryError::NoStackAvailable(_) => StatusCode::NOT_FOUND,
        QueryError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        QueryError::NoRootFound => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        debug!("Query failed ({status}): {self}");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(query: Arc<QueryService>) -> Router {
    Router::new()
        .route("/tasks.json", get(tasks))
        .route("/task/:id/stacktrace.json", get(task_stacktrace))
        .route("/scope/:id/cancel", get(cancel_scope))
        .route("/stats.json", get(stats))
        .with_state(query)
}

/// Bind a listener for `config`
///
/// # Errors
/// `InvalidAddress` for an empty host, `BindFailed` if the socket cannot be
/// bound.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    if config.host.trim().is_empty() {
        return Err(ServerError::InvalidAddress(config.bind_addr()));
    }

    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::BindFailed { addr: config.bind_addr(), source })
}

/// Serve on `listener` until `shutdown` resolves
///
/// # Errors
/// Returns an error if the accept loop fails.
pub async fn serve(
    listener: TcpListener,
    query: Arc<QueryService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Query surface listening on http://{addr}");
    }
    axum::serve(listener, router(query)).with_graceful_shutdown(shutdown).await?;
    info!("Query surface stopped");
    Ok(())
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn tasks(State(query): State<Arc<QueryService>>) -> Result<Response, QueryError> {
    let view = query.get_task_tree()?;
    let mut body = Vec::new();
    if let Err(e) = view.write_json(&mut body) {
        warn!("Failed to encode task tree: {e}");
        return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn task_stacktrace(
    State(query): State<Arc<QueryService>>,
    Path(raw_id): Path<String>,
) -> Result<Json<StacktraceView>, QueryError> {
    let id = raw_id
        .parse()
        .map(TaskId)
        .map_err(|_| QueryError::NotFound(format!("Task {raw_id}")))?;
    let frames = query.get_task_stacktrace(id)?;
    Ok(Json(StacktraceView { stacktrace: frames.into_iter().map(Into::into).collect() }))
}

async fn cancel_scope(
    State(query): State<Arc<QueryService>>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, QueryError> {
    let id = raw_id
        .parse()
        .map(ScopeId)
        .map_err(|_| QueryError::NotFound(format!("Scope {raw_id}")))?;
    query.request_scope_cancel(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(query): State<Arc<QueryService>>) -> Json<StatsView> {
    Json(query.get_stats().into())
}
