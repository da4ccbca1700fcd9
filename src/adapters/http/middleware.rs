use axum::{extract::FromRequestParts, http::request::Parts};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{adapters::http::app_state::AppState, app_error::AppError};

/// Extractor guarding the operator routes.
///
/// Expects `Authorization: Bearer <ADMIN_API_TOKEN>`. With no token
/// configured every request is rejected.
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_token.as_ref() else {
            tracing::warn!("Admin route called but ADMIN_API_TOKEN is not configured");
            return Err(AppError::Unauthorized);
        };

        let presented = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if !constant_time_compare(presented.trim(), expected.expose_secret()) {
            return Err(AppError::Unauthorized);
        }
        Ok(RequireAdmin)
    }
}

/// Compare SHA-256 digests so neither the contents nor the length of the
/// configured token leak through timing.
fn constant_time_compare(presented: &str, expected: &str) -> bool {
    if presented.is_empty() || expected.is_empty() {
        return false;
    }
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented.ct_eq(&expected).into()
}
