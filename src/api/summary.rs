//! `GET /payments/summary` — aggregate totals over an optional date range.

use axum::{extract::{Query, State}, routing::get, Json, Router};

use crate::error::Result;
use crate::models::SummaryQuery;
use crate::state::AppState;

async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl axum::response::IntoResponse> {
    let summary = state.summary.summary(query.from, query.to).await?;
    Ok(Json(summary))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/summary", get(get_summary))
}
