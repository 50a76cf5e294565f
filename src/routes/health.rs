use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::{error, instrument};

use crate::state::AppState;

const EXPECTED_TABLES: [&str; 5] = [
    "addresses",
    "profiles",
    "sessions",
    "users",
    "verification_tokens",
];

/// Liveness plus a schema sanity check: `ok` when every expected table is
/// present, `degraded` when the database answers but tables are missing.
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let rows: Result<Vec<(String,)>, sqlx::Error> = sqlx::query_as(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = 'public' ORDER BY table_name",
    )
    .fetch_all(&state.db)
    .await;

    match rows {
        Err(e) => {
            error!(error = %e, "health check could not reach the database");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "database": "unavailable" })),
            )
        }
        Ok(rows) => {
            let tables: Vec<String> = rows
                .into_iter()
                .map(|(name,)| name)
                .filter(|name| !name.starts_with('_'))
                .collect();
            let complete = EXPECTED_TABLES
                .iter()
                .all(|expected| tables.iter().any(|t| t == expected));
            let status = if complete { "ok" } else { "degraded" };
            (
                StatusCode::OK,
                Json(json!({
                    "status": status,
                    "database": "connected",
                    "tables": tables,
                })),
            )
        }
    }
}
