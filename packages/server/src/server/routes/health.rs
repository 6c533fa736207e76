use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AxumAppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: ComponentHealth,
    connection_pool: ConnectionPoolHealth,
    extraction_service: ComponentHealth,
    open_streams: usize,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(message),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_connections: Option<u32>,
}

/// Health check endpoint
///
/// Checks:
/// - Database connectivity and responsiveness
/// - Connection pool utilization
/// - Extraction service liveness
///
/// Returns 200 OK if all systems are healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AxumAppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let deps = &state.deps;

    let db_health = match tokio::time::timeout(
        CHECK_TIMEOUT,
        sqlx::query("SELECT 1").execute(&deps.db_pool),
    )
    .await
    {
        Ok(Ok(_)) => ComponentHealth::ok(),
        Ok(Err(e)) => ComponentHealth::error(format!("Query failed: {}", e)),
        Err(_) => ComponentHealth::error("Query timeout (>5s)".to_string()),
    };

    let extraction_health =
        match tokio::time::timeout(CHECK_TIMEOUT, deps.extraction.health_check()).await {
            Ok(Ok(())) => ComponentHealth::ok(),
            Ok(Err(e)) => ComponentHealth::error(e.to_string()),
            Err(_) => ComponentHealth::error("Health check timeout (>5s)".to_string()),
        };

    let pool_options = deps.db_pool.options();
    let pool_health = ConnectionPoolHealth {
        size: deps.db_pool.size(),
        idle_connections: deps.db_pool.num_idle(),
        max_connections: Some(pool_options.get_max_connections()),
    };

    let is_healthy = db_health.is_ok() && extraction_health.is_ok();
    let (status_code, overall_status) = if is_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: overall_status.to_string(),
            database: db_health,
            connection_pool: pool_health,
            extraction_service: extraction_health,
            open_streams: deps.bridge.active_connections().len(),
        }),
    )
}
