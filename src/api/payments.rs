//! `POST /payments` — submit a payment for dispatch.
//!
//! Handler shape follows `api::transactions::create_transaction`: a thin
//! axum handler mapping the shared error type straight to its HTTP
//! response via `IntoResponse`.

use axum::{extract::State, routing::post, Json, Router};

use crate::error::Result;
use crate::models::{SubmitPaymentRequest, SubmitPaymentResponse};
use crate::state::AppState;

async fn submit_payment(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPaymentRequest>,
) -> Result<Json<SubmitPaymentResponse>> {
    let response = state
        .dispatcher
        .submit(payload.correlation_id, payload.amount)
        .await?;

    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_payment))
}
