use agentforge_agent::commands::Provisioned;
use agentforge_db::DbPool;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    provisioned: Provisioned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub assistant_backend: HealthCheck,
    pub function_host: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, provisioned: Provisioned) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, provisioned })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "agentforge-server runtime initialized".to_string(),
        },
        database,
        assistant_backend: credential_check(state.provisioned.assistant_backend, "assistants.api_key"),
        function_host: credential_check(
            state.provisioned.function_host,
            "functions.base_url and functions.service_key",
        ),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            warn!(event_name = "system.health.database_degraded", error = %error, "health probe failed");
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// Missing credentials disable commands, not the service, so they never
/// degrade overall readiness.
fn credential_check(present: bool, setting: &str) -> HealthCheck {
    if present {
        HealthCheck { status: "configured", detail: format!("{setting} provided") }
    } else {
        HealthCheck { status: "not_configured", detail: format!("{setting} missing") }
    }
}
