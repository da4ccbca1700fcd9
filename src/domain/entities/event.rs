use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::app_error::{AppError, AppResult};

/// Custom-data key Paddle echoes back to correlate a transaction with its invoice.
pub const CUSTOM_DATA_INVOICE_KEY: &str = "ledger_invoice";

/// Webhook notification types the reconciler understands. Everything else is
/// preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    TransactionCompleted,
    SubscriptionUpdated,
    SubscriptionCancelled,
    AdjustmentCreated,
    AdjustmentUpdated,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::TransactionCompleted => "transaction.completed",
            EventType::SubscriptionUpdated => "subscription.updated",
            EventType::SubscriptionCancelled => "subscription.cancelled",
            EventType::AdjustmentCreated => "adjustment.created",
            EventType::AdjustmentUpdated => "adjustment.updated",
            EventType::Other(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "transaction.completed" => EventType::TransactionCompleted,
            "subscription.updated" => EventType::SubscriptionUpdated,
            "subscription.cancelled" => EventType::SubscriptionCancelled,
            "adjustment.created" => EventType::AdjustmentCreated,
            "adjustment.updated" => EventType::AdjustmentUpdated,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    event_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    data: Value,
}

/// Verified, decoded webhook notification. Immutable once built.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub event_id: String,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub data: Value,
    pub raw_body: String,
    pub received_at: DateTime<Utc>,
}

impl WebhookEnvelope {
    /// Decode a raw notification body.
    pub fn decode(raw_body: &str, received_at: DateTime<Utc>) -> AppResult<Self> {
        let raw: RawEnvelope = serde_json::from_str(raw_body)
            .map_err(|e| AppError::MalformedEvent(format!("envelope: {}", e)))?;

        if raw.event_id.trim().is_empty() {
            return Err(AppError::MalformedEvent("envelope: empty event_id".into()));
        }

        Ok(Self {
            event_id: raw.event_id,
            event_type: EventType::from(raw.event_type.as_str()),
            occurred_at: raw.occurred_at,
            data: raw.data,
            raw_body: raw_body.to_string(),
            received_at,
        })
    }

    /// Decode `data` into the payload type of a known event.
    pub fn payload<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            AppError::MalformedEvent(format!("{} data: {}", self.event_type, e))
        })
    }
}

/// Read the invoice correlation value out of Paddle custom data.
pub fn invoice_public_id(custom_data: Option<&serde_json::Map<String, Value>>) -> Option<String> {
    custom_data
        .and_then(|m| m.get(CUSTOM_DATA_INVOICE_KEY))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
