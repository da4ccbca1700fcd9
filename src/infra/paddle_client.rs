use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        ledger::{InvoiceLogRepo, log_entry},
        paddle::{
            CreatedAdjustment, CustomerAddress, DraftTransaction, NewCustomer, PaddleApi,
            RefundRequest, TransactionCustomer,
        },
    },
};

pub const LIVE_API_BASE: &str = "https://api.paddle.com/";
pub const SANDBOX_API_BASE: &str = "https://sandbox-api.paddle.com/";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const API_KEY_MASK: &str = "***api_key***";

/// Cancelling an already-cancelled subscription answers with one of these.
const ALREADY_CANCELLED_CODES: [&str; 2] = [
    "subscription_update_when_canceled",
    "subscription_is_canceled_action_invalid",
];

/// `POST customers` with an email Paddle already knows.
const CUSTOMER_EXISTS_CODE: &str = "customer_already_exists";
const CUSTOMER_ID_PREFIX: &str = "ctm_";

pub struct PaddleClientConfig {
    pub api_key: SecretString,
    pub sandbox: bool,
    pub request_timeout: Duration,
    /// Write every request/response pair to the invoice log.
    pub log_requests: bool,
}

pub struct PaddleClient {
    client: Client,
    base_url: Url,
    api_key: SecretString,
    sandbox: bool,
    log_requests: bool,
    invoice_log: Arc<dyn InvoiceLogRepo>,
}

impl PaddleClient {
    pub fn new(
        config: PaddleClientConfig,
        invoice_log: Arc<dyn InvoiceLogRepo>,
    ) -> AppResult<Self> {
        let base = if config.sandbox {
            SANDBOX_API_BASE
        } else {
            LIVE_API_BASE
        };
        Self::with_base_url(config, base, invoice_log)
    }

    pub fn with_base_url(
        config: PaddleClientConfig,
        base_url: &str,
        invoice_log: Arc<dyn InvoiceLogRepo>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .user_agent(concat!("paddle-reconciler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Internal(format!("Invalid Paddle base URL: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            sandbox: config.sandbox,
            log_requests: config.log_requests,
            invoice_log,
        })
    }

    fn mask(&self, text: &str) -> String {
        mask_secret(text, self.api_key.expose_secret())
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn send<B: Serialize + ?Sized>(
        &self,
        invoice_id: Option<Uuid>,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> AppResult<(StatusCode, String)> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid Paddle path {}: {}", path, e)))?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
            .header("Paddle-Version", "1");
        let request_body = match body {
            Some(body) => {
                let encoded = serde_json::to_string(body)
                    .map_err(|e| AppError::Internal(format!("Failed to encode request: {}", e)))?;
                request = request
                    .header("Content-Type", "application/json")
                    .body(encoded.clone());
                encoded
            }
            None => String::new(),
        };

        let result = request.send().await;
        let (status, response_text) = match result {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.map_err(|e| AppError::Remote {
                    status: Some(status.as_u16()),
                    code: None,
                    detail: format!("Failed to read Paddle response: {}", e),
                })?;
                (Some(status), text)
            }
            Err(e) => (None, format!("transport error: {}", e)),
        };

        if self.log_requests {
            let entry = log_entry(
                invoice_id,
                format!("PADDLE API {} {}", method, path),
                self.mask(&format!(
                    "{} {}\nAuthorization: Bearer {}\n\n{}",
                    method,
                    url,
                    self.api_key.expose_secret(),
                    request_body
                )),
                self.mask(&format!(
                    "{}\n\n{}",
                    status.map(|s| s.to_string()).unwrap_or_default(),
                    response_text
                )),
                Utc::now(),
            );
            if let Err(e) = self.invoice_log.append(entry).await {
                tracing::warn!(error = %e, "Failed to write Paddle request to invoice log");
            }
        }

        match status {
            Some(status) => Ok((status, response_text)),
            None => Err(AppError::Remote {
                status: None,
                code: None,
                detail: response_text,
            }),
        }
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        invoice_id: Option<Uuid>,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> AppResult<T> {
        let (status, text) = self.send(invoice_id, method, path, body).await?;
        handle_response(status, &text)
    }
}

/// Replace every occurrence of `secret` in `text`.
pub fn mask_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, API_KEY_MASK)
}

fn handle_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> AppResult<T> {
    if !status.is_success() {
        tracing::error!(status = %status, body = %body, "Paddle API error");

        if let Ok(error) = serde_json::from_str::<PaddleErrorResponse>(body) {
            return Err(AppError::Remote {
                status: Some(status.as_u16()),
                code: Some(error.error.code),
                detail: error.error.detail,
            });
        }
        return Err(AppError::Remote {
            status: Some(status.as_u16()),
            code: None,
            detail: body.to_string(),
        });
    }

    serde_json::from_str::<PaddleEnvelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Paddle response");
            AppError::Remote {
                status: Some(status.as_u16()),
                code: None,
                detail: format!("Failed to parse Paddle response: {}", e),
            }
        })
}

/// Id of a created customer, or of the existing one named in a
/// `customer_already_exists` conflict.
fn created_or_existing_customer(status: StatusCode, body: &str) -> AppResult<String> {
    if status == StatusCode::CONFLICT
        && let Ok(error) = serde_json::from_str::<PaddleErrorResponse>(body)
        && error.error.code == CUSTOMER_EXISTS_CODE
        && let Some(id) = customer_id_in(&error.error.detail)
    {
        tracing::info!(customer_id = %id, "Paddle customer already exists for email");
        return Ok(id);
    }
    let customer: PaddleId = handle_response(status, body)?;
    Ok(customer.id)
}

/// Last `ctm_...` token in an error detail.
fn customer_id_in(detail: &str) -> Option<String> {
    detail
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| token.len() > CUSTOMER_ID_PREFIX.len())
        .rfind(|token| token.starts_with(CUSTOMER_ID_PREFIX))
        .map(str::to_string)
}

fn matching_business(businesses: &[PaddleBusinessRecord], tax_id: &str) -> Option<String> {
    businesses
        .iter()
        .find(|b| b.tax_identifier.as_deref().is_some_and(|t| t.contains(tax_id)))
        .map(|b| b.id.clone())
}

#[async_trait]
impl PaddleApi for PaddleClient {
    async fn get_transaction_customer(
        &self,
        invoice_id: Option<Uuid>,
        transaction_id: &str,
    ) -> AppResult<TransactionCustomer> {
        let path = format!(
            "transactions/{}?include=address,business,customer",
            transaction_id
        );
        let txn: PaddleTransactionWithCustomer =
            self.call::<(), _>(invoice_id, Method::GET, &path, None).await?;

        Ok(TransactionCustomer {
            email: txn.customer.as_ref().and_then(|c| c.email.clone()),
            name: txn.customer.and_then(|c| c.name),
            country_code: txn.address.as_ref().and_then(|a| a.country_code.clone()),
            postal_code: txn.address.and_then(|a| a.postal_code),
            tax_identifier: txn.business.and_then(|b| b.tax_identifier),
        })
    }

    async fn cancel_subscription(
        &self,
        invoice_id: Option<Uuid>,
        subscription_id: &str,
    ) -> AppResult<()> {
        let path = format!("subscriptions/{}/cancel", subscription_id);
        let body = serde_json::json!({ "effective_from": "immediately" });

        match self
            .call::<_, Value>(invoice_id, Method::POST, &path, Some(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.remote_code().is_some_and(|c| ALREADY_CANCELLED_CODES.contains(&c)) => {
                tracing::info!(%subscription_id, "Subscription already cancelled");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_refund(
        &self,
        invoice_id: Option<Uuid>,
        request: &RefundRequest,
    ) -> AppResult<CreatedAdjustment> {
        let (status, text) = self
            .send(invoice_id, Method::POST, "adjustments", Some(request))
            .await?;
        if status.is_success() && status != StatusCode::CREATED {
            return Err(AppError::Remote {
                status: Some(status.as_u16()),
                code: None,
                detail: format!("Unexpected status creating refund: {}", status),
            });
        }
        let adjustment: PaddleAdjustment = handle_response(status, &text)?;
        Ok(CreatedAdjustment {
            id: adjustment.id,
            status: adjustment.status,
        })
    }

    async fn create_draft_transaction(
        &self,
        invoice_id: Option<Uuid>,
        draft: &DraftTransaction,
    ) -> AppResult<String> {
        let txn: PaddleId = self
            .call(invoice_id, Method::POST, "transactions", Some(draft))
            .await?;
        Ok(txn.id)
    }

    async fn ensure_customer(
        &self,
        invoice_id: Option<Uuid>,
        customer: &NewCustomer,
    ) -> AppResult<String> {
        let (status, text) = self
            .send(invoice_id, Method::POST, "customers", Some(customer))
            .await?;
        created_or_existing_customer(status, &text)
    }

    async fn upsert_address(
        &self,
        invoice_id: Option<Uuid>,
        customer_id: &str,
        address_id: Option<&str>,
        address: &CustomerAddress,
    ) -> AppResult<String> {
        let (method, path) = match address_id {
            Some(id) => (
                Method::PATCH,
                format!("customers/{}/addresses/{}", customer_id, id),
            ),
            None => (Method::POST, format!("customers/{}/addresses", customer_id)),
        };
        let body = AddressBody {
            address,
            status: address_id.map(|_| "active"),
        };
        let saved: PaddleId = self.call(invoice_id, method, &path, Some(&body)).await?;
        Ok(saved.id)
    }

    async fn find_business_by_tax_id(
        &self,
        invoice_id: Option<Uuid>,
        customer_id: &str,
        tax_id: &str,
    ) -> AppResult<Option<String>> {
        let path = format!("customers/{}/businesses?per_page=200", customer_id);
        let businesses: Vec<PaddleBusinessRecord> =
            self.call::<(), _>(invoice_id, Method::GET, &path, None).await?;
        Ok(matching_business(&businesses, tax_id))
    }

    fn is_sandbox(&self) -> bool {
        self.sandbox
    }
}

// ============================================================================
// Paddle Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PaddleEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PaddleErrorResponse {
    error: PaddleError,
}

#[derive(Debug, Deserialize)]
struct PaddleError {
    code: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct PaddleId {
    id: String,
}

#[derive(Debug, Serialize)]
struct AddressBody<'a> {
    #[serde(flatten)]
    address: &'a CustomerAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct PaddleBusinessRecord {
    id: String,
    tax_identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleTransactionWithCustomer {
    customer: Option<PaddleCustomer>,
    address: Option<PaddleAddress>,
    business: Option<PaddleBusiness>,
}

#[derive(Debug, Deserialize)]
struct PaddleCustomer {
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleAddress {
    country_code: Option<String>,
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleBusiness {
    tax_identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleAdjustment {
    id: String,
    status: String,
}
