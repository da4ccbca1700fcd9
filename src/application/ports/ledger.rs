use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        invoice::{ExchangeRate, Invoice, InvoiceItem, InvoiceStatus},
        payment::{
            InvoiceLogEntry, NewChargeback, NewPayment, NewRefund, NewUserNote, PaymentRecord,
        },
        user::{User, UserExtension, UserProfileBackfill},
    },
};

// ============================================================================
// Invoices
// ============================================================================

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn find_by_public_id(&self, public_id: &str) -> AppResult<Option<Invoice>>;

    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<Invoice>>;

    /// Invoice owning a payment with this receipt id.
    async fn find_by_receipt_id(&self, receipt_id: &str) -> AppResult<Option<Invoice>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Invoice>;

    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>>;

    async fn set_status(&self, invoice_id: Uuid, status: InvoiceStatus) -> AppResult<()>;

    /// Mark cancelled. Re-cancelling is a no-op.
    async fn set_cancelled(&self, invoice_id: Uuid) -> AppResult<()>;

    async fn set_rebill_date(&self, invoice_id: Uuid, rebill_date: Option<NaiveDate>)
    -> AppResult<()>;

    /// Push access expiry out to `until`. Never moves it backwards.
    /// Returns the effective expiry.
    async fn extend_access(&self, invoice_id: Uuid, until: NaiveDate) -> AppResult<NaiveDate>;

    async fn set_subscription_id(&self, invoice_id: Uuid, subscription_id: &str) -> AppResult<()>;

    async fn set_billed_line_items(&self, invoice_id: Uuid, line_items: &[String])
    -> AppResult<()>;

    /// Store the rate only if none is stored yet. Returns whichever rate is
    /// stored afterwards, so concurrent writers agree on one value.
    async fn set_exchange_rate_if_absent(
        &self,
        invoice_id: Uuid,
        rate: ExchangeRate,
    ) -> AppResult<ExchangeRate>;
}

// ============================================================================
// Payments, refunds, chargebacks
// ============================================================================

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    /// Insert a payment and advance the invoice (count, access, status, rebill date).
    /// Fails with `AppError::Duplicate` when the receipt is already recorded.
    async fn add_payment(&self, invoice_id: Uuid, payment: NewPayment) -> AppResult<PaymentRecord>;

    /// Grant the free first period. Fails with `AppError::Duplicate` when the
    /// transaction already granted access. Returns the access end date.
    async fn add_access_period(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        begins_on: NaiveDate,
    ) -> AppResult<NaiveDate>;

    async fn find_payment(&self, invoice_id: Uuid, receipt_id: &str)
    -> AppResult<Option<PaymentRecord>>;

    /// Fails with `AppError::Duplicate` when the adjustment is already recorded.
    async fn add_refund(&self, invoice_id: Uuid, refund: NewRefund) -> AppResult<()>;

    /// Returns the number of rows removed.
    async fn delete_refund(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        receipt_id: &str,
    ) -> AppResult<u64>;

    /// Fails with `AppError::Duplicate` when the adjustment is already recorded.
    async fn add_chargeback(&self, invoice_id: Uuid, chargeback: NewChargeback) -> AppResult<()>;
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> AppResult<User>;

    /// Fill empty profile fields only.
    async fn backfill_profile(&self, user_id: Uuid, profile: &UserProfileBackfill)
    -> AppResult<()>;

    /// Store Paddle ids; `None` keeps the current value.
    async fn set_paddle_refs(&self, user_id: Uuid, refs: &UserExtension) -> AppResult<()>;

    async fn set_locked(&self, user_id: Uuid, locked: bool) -> AppResult<()>;

    /// Fails with `AppError::Duplicate` when the event already left a note.
    async fn add_note(&self, user_id: Uuid, note: NewUserNote) -> AppResult<()>;
}

// ============================================================================
// Audit log
// ============================================================================

#[async_trait]
pub trait InvoiceLogRepo: Send + Sync {
    async fn append(&self, entry: InvoiceLogEntry) -> AppResult<()>;
}

/// Build a log entry stamped with `at`.
pub fn log_entry(
    invoice_id: Option<Uuid>,
    title: impl Into<String>,
    request: impl Into<String>,
    response: impl Into<String>,
    at: DateTime<Utc>,
) -> InvoiceLogEntry {
    InvoiceLogEntry {
        invoice_id,
        title: title.into(),
        request: request.into(),
        response: response.into(),
        created_at: at,
    }
}
