pub mod admin;
pub mod checkout;
pub mod paddle_webhook;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::adapters::http::app_state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/paddle", paddle_webhook::router())
        .nest("/checkout", checkout::router())
        .nest("/admin", admin::router())
}
