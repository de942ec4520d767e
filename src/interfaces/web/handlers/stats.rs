use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;

/// `GET /api/stats`: aggregate counters plus the daily rows.
pub async fn get_stats_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let doc = state.stats.aggregate().await;
    Json(json!({
        "success": true,
        "requests": doc.requests,
        "tokens": doc.tokens,
        "costs": doc.costs,
        "models": doc.models,
        "daily": doc.daily,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DailyStatsQuery {
    pub days: Option<usize>,
}

/// `GET /api/stats/daily?days=`
pub async fn get_daily_stats_endpoint(
    Query(query): Query<DailyStatsQuery>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let daily = state.stats.daily(query.days.unwrap_or(30)).await;
    Json(json!({ "success": true, "count": daily.len(), "daily": daily }))
}
