use std::{net::SocketAddr, time::Duration};

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;

use crate::{application::use_cases::reconciliation::ReconcilePolicy, infra::error::InfraError};

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub paddle_api_key: SecretString,
    pub paddle_webhook_secret: SecretString,
    /// Talk to sandbox-api.paddle.com instead of the live API.
    pub paddle_sandbox: bool,
    /// Reject signatures older than this. `0` disables the check.
    pub signature_max_age_secs: u64,
    pub paddle_http_timeout: Duration,
    pub lock_on_chargeback: bool,
    pub lock_on_chargeback_warning: bool,
    pub unlock_on_chargeback_reverse: bool,
    /// Bearer token for the admin routes. Admin routes reject everything when unset.
    pub admin_api_token: Option<SecretString>,
    /// Extra custom data attached to every draft transaction.
    pub checkout_custom_data: Vec<(String, String)>,
    pub disable_postback_log: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default(
            "BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 3001)),
        );
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid { var: "CORS_ORIGIN" })?;

        let paddle_api_key = SecretString::new(get_env::<String>("PADDLE_API_KEY").into());
        let paddle_webhook_secret =
            SecretString::new(get_env::<String>("PADDLE_WEBHOOK_SECRET").into());
        let paddle_sandbox: bool = get_env_default("PADDLE_SANDBOX", false);
        let signature_max_age_secs: u64 = get_env_default("PADDLE_SIGNATURE_MAX_AGE_SECS", 300);
        let paddle_http_timeout_secs: u64 = get_env_default("PADDLE_HTTP_TIMEOUT_SECS", 30);

        let lock_on_chargeback: bool = get_env_default("LOCK_ON_CHARGEBACK", true);
        let lock_on_chargeback_warning: bool = get_env_default("LOCK_ON_CHARGEBACK_WARNING", false);
        let unlock_on_chargeback_reverse: bool =
            get_env_default("UNLOCK_ON_CHARGEBACK_REVERSE", true);

        let admin_api_token = std::env::var("ADMIN_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(|t| SecretString::new(t.into()));
        let checkout_custom_data =
            parse_custom_data(&get_env_default("CHECKOUT_CUSTOM_DATA", String::new()))?;
        let disable_postback_log: bool = get_env_default("DISABLE_POSTBACK_LOG", false);

        Ok(Self {
            database_url,
            bind_addr,
            cors_origin,
            paddle_api_key,
            paddle_webhook_secret,
            paddle_sandbox,
            signature_max_age_secs,
            paddle_http_timeout: Duration::from_secs(paddle_http_timeout_secs),
            lock_on_chargeback,
            lock_on_chargeback_warning,
            unlock_on_chargeback_reverse,
            admin_api_token,
            checkout_custom_data,
            disable_postback_log,
        })
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            lock_on_chargeback: self.lock_on_chargeback,
            lock_on_chargeback_warning: self.lock_on_chargeback_warning,
            unlock_on_chargeback_reverse: self.unlock_on_chargeback_reverse,
            log_postbacks: !self.disable_postback_log,
        }
    }
}

/// `key=value,key2=value2`. Blank entries are skipped.
pub fn parse_custom_data(raw: &str) -> Result<Vec<(String, String)>, InfraError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(InfraError::ConfigInvalid {
                var: "CHECKOUT_CUSTOM_DATA",
            }),
        })
        .collect()
}
