use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::app_error::AppResult;

// ============================================================================
// Port Types
// ============================================================================

/// Customer details attached to a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionCustomer {
    pub email: Option<String>,
    pub name: Option<String>,
    pub country_code: Option<String>,
    pub postal_code: Option<String>,
    pub tax_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingCycle {
    pub interval: &'static str,
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitPrice {
    /// Minor units, as a string.
    pub amount: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuantity {
    pub minimum: i32,
    pub maximum: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftProduct {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tax_category: &'static str,
}

/// Non-catalog price built for a single transaction item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftPrice {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_period: Option<BillingCycle>,
    pub tax_mode: &'static str,
    pub unit_price: UnitPrice,
    pub quantity: PriceQuantity,
    pub custom_data: Map<String, Value>,
    pub product: DraftProduct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftItem {
    pub quantity: i32,
    pub price: DraftPrice,
}

/// Body of `POST transactions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftTransaction {
    pub currency_code: String,
    pub custom_data: Map<String, Value>,
    pub items: Vec<DraftItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundItem {
    pub item_id: String,
    #[serde(rename = "type")]
    pub kind: RefundKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Body of `POST adjustments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRequest {
    pub action: &'static str,
    pub transaction_id: String,
    pub reason: String,
    pub items: Vec<RefundItem>,
}

/// Body of `POST customers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCustomer {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Address fields the ledger keeps on the member profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerAddress {
    pub country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAdjustment {
    pub id: String,
    pub status: String,
}

// ============================================================================
// Port
// ============================================================================

/// Paddle Billing API. `invoice_id` is only used to attach the call to the
/// invoice log.
#[async_trait]
pub trait PaddleApi: Send + Sync {
    /// `GET transactions/{id}?include=address,business,customer`
    async fn get_transaction_customer(
        &self,
        invoice_id: Option<Uuid>,
        transaction_id: &str,
    ) -> AppResult<TransactionCustomer>;

    /// `POST subscriptions/{id}/cancel`, effective immediately. Already
    /// cancelled subscriptions count as success.
    async fn cancel_subscription(&self, invoice_id: Option<Uuid>, subscription_id: &str)
    -> AppResult<()>;

    /// `POST adjustments`
    async fn create_refund(
        &self,
        invoice_id: Option<Uuid>,
        request: &RefundRequest,
    ) -> AppResult<CreatedAdjustment>;

    /// `POST transactions`. Returns the draft transaction id.
    async fn create_draft_transaction(
        &self,
        invoice_id: Option<Uuid>,
        draft: &DraftTransaction,
    ) -> AppResult<String>;

    /// `POST customers`. When Paddle already has a customer with this email
    /// the existing customer id is returned instead of an error.
    async fn ensure_customer(
        &self,
        invoice_id: Option<Uuid>,
        customer: &NewCustomer,
    ) -> AppResult<String>;

    /// `POST customers/{id}/addresses`, or `PATCH .../addresses/{address_id}`
    /// (re-activating it) when the address is already known. Returns the
    /// address id.
    async fn upsert_address(
        &self,
        invoice_id: Option<Uuid>,
        customer_id: &str,
        address_id: Option<&str>,
        address: &CustomerAddress,
    ) -> AppResult<String>;

    /// `GET customers/{id}/businesses`. Id of the first business whose tax
    /// identifier contains `tax_id`.
    async fn find_business_by_tax_id(
        &self,
        invoice_id: Option<Uuid>,
        customer_id: &str,
        tax_id: &str,
    ) -> AppResult<Option<String>>;

    fn is_sandbox(&self) -> bool;
}
