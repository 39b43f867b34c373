use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use claimdesk_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
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
    pub workflow: HealthCheck,
    pub checked_at: String,
}

/// Mounted at `/health` and `/api/v1/health`.
pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let workflow = workflow_check(&state.db_pool).await;
    let ready = database.status == "ready" && workflow.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "claimdesk-server runtime initialized".to_string(),
        },
        database,
        workflow,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// Stored stages must still build a valid workflow table.
async fn workflow_check(pool: &DbPool) -> HealthCheck {
    use claimdesk_core::workflow::WorkflowTable;
    use claimdesk_db::repositories::{SqlWorkflowConfigRepository, WorkflowConfigRepository};

    let stages = match SqlWorkflowConfigRepository::new(pool.clone()).list_stages().await {
        Ok(stages) => stages,
        Err(error) => {
            return HealthCheck {
                status: "degraded",
                detail: format!("workflow stages unreadable: {error}"),
            }
        }
    };
    match WorkflowTable::from_stages(&stages) {
        Ok(_) => HealthCheck {
            status: "ready",
            detail: format!("{} workflow stages configured", stages.len()),
        },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}
