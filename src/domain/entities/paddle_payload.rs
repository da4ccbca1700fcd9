use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::money::Money;

// ============================================================================
// Transaction
// ============================================================================

/// How a Paddle transaction came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOrigin {
    Api,
    Web,
    SubscriptionRecurring,
    SubscriptionCharge,
    SubscriptionUpdate,
    SubscriptionPaymentMethodChange,
    #[serde(other)]
    Other,
}

impl TransactionOrigin {
    /// Origins that move money or access on the invoice.
    pub fn is_billing(&self) -> bool {
        matches!(
            self,
            TransactionOrigin::Api
                | TransactionOrigin::Web
                | TransactionOrigin::SubscriptionRecurring
                | TransactionOrigin::SubscriptionCharge
                | TransactionOrigin::SubscriptionUpdate
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Totals {
    pub total: String,
    #[serde(default)]
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub id: String,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    pub totals: Totals,
}

impl LineItem {
    pub fn is_billed(&self) -> bool {
        self.totals
            .total
            .trim()
            .parse::<i128>()
            .is_ok_and(|minor| minor > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDetails {
    pub totals: Totals,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    pub id: String,
    pub origin: TransactionOrigin,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub custom_data: Option<Map<String, Value>>,
    pub currency_code: String,
    pub details: TransactionDetails,
    #[serde(default)]
    pub billed_at: Option<DateTime<Utc>>,
}

impl TransactionData {
    /// Transaction total in the currency the customer paid.
    pub fn total(&self) -> AppResult<Money> {
        Money::from_minor_units(&self.details.totals.total, &self.currency_code)
            .map_err(|e| AppError::MalformedEvent(format!("transaction totals: {}", e)))
    }

    /// Ids of line items that actually charged something.
    pub fn billed_line_items(&self) -> Vec<String> {
        self.details
            .line_items
            .iter()
            .filter(|item| item.is_billed())
            .map(|item| item.id.clone())
            .collect()
    }
}

// ============================================================================
// Subscription
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddleSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Paused,
    Canceled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionData {
    pub id: String,
    pub status: PaddleSubscriptionStatus,
    #[serde(default)]
    pub next_billed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub custom_data: Option<Map<String, Value>>,
}

// ============================================================================
// Adjustment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentAction {
    Credit,
    CreditReverse,
    Refund,
    Chargeback,
    ChargebackWarning,
    ChargebackReverse,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    PendingApproval,
    Approved,
    Rejected,
    Reversed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentTotals {
    pub total: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentData {
    pub id: String,
    pub action: AdjustmentAction,
    pub status: AdjustmentStatus,
    pub transaction_id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub totals: AdjustmentTotals,
}

impl AdjustmentData {
    pub fn total(&self) -> AppResult<Money> {
        Money::from_minor_units(&self.totals.total, &self.totals.currency_code)
            .map_err(|e| AppError::MalformedEvent(format!("adjustment totals: {}", e)))
    }
}
