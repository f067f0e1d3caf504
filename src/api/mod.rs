pub mod health;
pub mod payments;
pub mod summary;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/payments", payments::router().merge(summary::router()))
        .nest("/health", health::router())
}
