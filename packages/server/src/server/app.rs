//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::kernel::ServerDeps;
use crate::server::routes::{
    active_connections_handler, cancel_task_handler, gen_prompt_handler, get_task_handler,
    health_handler, latest_tasks_handler, list_tasks_handler, remote_status_handler,
    submit_task_handler, usage_stream_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub deps: Arc<ServerDeps>,
}

impl AxumAppState {
    pub fn new(deps: ServerDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }
}

/// Build the Axum application router
///
/// An empty `allowed_origins` list allows any origin.
pub fn build_app(state: AxumAppState, allowed_origins: &[String]) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origins(allowed_origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        // Task lifecycle
        .route("/api/tasks", post(submit_task_handler).get(list_tasks_handler))
        .route("/api/tasks/:id", get(get_task_handler))
        .route("/api/tasks/:id/cancel", post(cancel_task_handler))
        .route("/api/tasks/:id/remote-status", get(remote_status_handler))
        .route("/api/pipelines/:id/latest-tasks", get(latest_tasks_handler))
        .route("/api/prompts/generate", post(gen_prompt_handler))
        // Diagnostics
        .route("/api/bridge/connections", get(active_connections_handler))
        .route("/health", get(health_handler))
        // Usage notifications
        .route("/usage/stream", get(usage_stream_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_origins(allowed_origins: &[String]) -> AllowOrigin {
    if allowed_origins.is_empty() {
        return AllowOrigin::from(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(origins)
}
