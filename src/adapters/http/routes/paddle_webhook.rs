//! Paddle notification endpoint.
//!
//! Paddle treats any 2xx as delivered and redelivers everything else, so the
//! status code is the retry decision.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::error;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{WebhookOutcome, is_retryable_error},
    domain::entities::event::WebhookEnvelope,
    infra::paddle_signature,
};

/// Returns 5xx so Paddle redelivers the event.
/// Logs the error with full context for debugging.
fn webhook_retryable_error(
    error: &AppError,
    event_type: &str,
    event_id: &str,
    context: &str,
) -> StatusCode {
    error!(
        error = %error,
        event_type,
        event_id,
        context,
        retryable = true,
        "Webhook processing failed, asking Paddle to retry"
    );
    match error {
        AppError::OutOfOrder(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("paddle-signature")
        .or_else(|| headers.get("signature"))
        .and_then(|v| v.to_str().ok())
}

/// POST /api/paddle/webhook
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<StatusCode> {
    let received_at = Utc::now();

    let Some(signature) = signature_header(&headers) else {
        tracing::warn!("Paddle webhook without signature header");
        return Err(AppError::InvalidSignature);
    };
    if !paddle_signature::verify(
        &body,
        signature,
        app_state.config.paddle_webhook_secret.expose_secret(),
        received_at,
        app_state.config.signature_max_age_secs,
    ) {
        tracing::warn!("Paddle webhook signature rejected");
        return Err(AppError::InvalidSignature);
    }

    let envelope = WebhookEnvelope::decode(&body, received_at)?;
    let event_type = envelope.event_type.to_string();

    match app_state.reconciliation_use_cases.process(&envelope).await {
        Ok(WebhookOutcome::InvoiceNotFound { retryable: true }) => {
            Ok(StatusCode::SERVICE_UNAVAILABLE)
        }
        Ok(_) => Ok(StatusCode::OK),
        Err(AppError::Duplicate) => Ok(StatusCode::OK),
        Err(e) if is_retryable_error(&e) => Ok(webhook_retryable_error(
            &e,
            &event_type,
            &envelope.event_id,
            "reconcile",
        )),
        Err(e) => Err(e),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_webhook))
}
