//! Operator actions against Paddle, guarded by `ADMIN_API_TOKEN`.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    adapters::http::{app_state::AppState, middleware::RequireAdmin},
    app_error::AppResult,
    application::use_cases::subscription_admin::RefundReceipt,
};

#[derive(Debug, Deserialize)]
pub struct RefundPayload {
    pub receipt_id: String,
    /// Invoice currency. Omit to refund the whole payment.
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// POST /api/admin/invoices/{public_id}/cancel
async fn cancel_invoice(
    _admin: RequireAdmin,
    State(app_state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<StatusCode> {
    app_state
        .subscription_admin_use_cases
        .cancel_invoice(&public_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/invoices/{public_id}/refunds
async fn request_refund(
    _admin: RequireAdmin,
    State(app_state): State<AppState>,
    Path(public_id): Path<String>,
    Json(payload): Json<RefundPayload>,
) -> AppResult<(StatusCode, Json<RefundReceipt>)> {
    let receipt = app_state
        .subscription_admin_use_cases
        .request_refund(&public_id, &payload.receipt_id, payload.amount)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices/{public_id}/cancel", post(cancel_invoice))
        .route("/invoices/{public_id}/refunds", post(request_refund))
}
