use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::{
    adapters::http::app_state::AppState, app_error::AppResult,
    application::use_cases::checkout::CheckoutSession,
};

/// POST /api/checkout/{public_id}
/// Creates the Paddle draft transaction the client-side checkout opens.
async fn create_checkout(
    State(app_state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<Json<CheckoutSession>> {
    let session = app_state
        .checkout_use_cases
        .create_checkout(&public_id)
        .await?;
    Ok(Json(session))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{public_id}", post(create_checkout))
}
