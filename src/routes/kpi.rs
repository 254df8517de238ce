use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_internal_key;
use crate::error::{AppError, AppResult};
use crate::schemas::{validate_input, CardsQuery};
use crate::services::kpi_runner::run_all_organizations;
use crate::services::kpi_store::latest_cards;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/kpi/run", axum::routing::post(trigger_run))
        .route("/kpi/cards", axum::routing::get(list_latest_cards))
}

/// Run entrypoint for the external cron (and manual triggers). Processes
/// every active organization and returns the structured run report.
async fn trigger_run(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;

    let report = run_all_organizations(&state).await?;
    // A run may have produced fresh snapshots for any tenant.
    state.cards_cache.invalidate_all();

    Ok(Json(json!(report)))
}

/// Dashboard read: the most recent snapshot per metric key for one
/// organization, cached briefly to absorb dashboard refresh bursts.
async fn list_latest_cards(
    State(state): State<AppState>,
    Query(query): Query<CardsQuery>,
) -> AppResult<Json<Value>> {
    validate_input(&query)?;
    uuid::Uuid::parse_str(query.org_id.trim())
        .map_err(|_| AppError::BadRequest("org_id must be a UUID.".to_string()))?;

    if let Some(cached) = state.cards_cache.get(&query.org_id).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;
    let cards = latest_cards(pool, &query.org_id).await?;
    let body = json!({ "data": cards });
    state
        .cards_cache
        .insert(query.org_id.clone(), body.clone())
        .await;
    Ok(Json(body))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
