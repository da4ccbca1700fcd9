use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A captured payment, unique per (invoice_id, receipt_id).
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub receipt_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub receipt_id: String,
    /// Amount in invoice currency. `None` lets the ledger charge the invoice's
    /// own total for the period.
    pub amount: Option<Decimal>,
    pub paid_at: DateTime<Utc>,
    /// Recompute the rebill date from the payment date rather than rolling
    /// the stored one forward.
    pub reset_rebill_date: bool,
}

/// Free access grant, unique per (invoice_id, transaction_id).
#[derive(Debug, Clone)]
pub struct AccessPeriod {
    pub invoice_id: Uuid,
    pub transaction_id: String,
    pub begins_on: NaiveDate,
    pub expires_on: NaiveDate,
}

/// Refund keyed by the adjustment id, unique per (invoice_id, receipt_id).
#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub invoice_id: Uuid,
    pub receipt_id: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub receipt_id: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChargeback {
    pub receipt_id: String,
    pub transaction_id: String,
    pub received_at: DateTime<Utc>,
}

/// Account note, unique per (user_id, event_id).
#[derive(Debug, Clone)]
pub struct NewUserNote {
    pub event_id: String,
    pub content: String,
}

/// Audit record of a webhook or outbound call.
#[derive(Debug, Clone)]
pub struct InvoiceLogEntry {
    pub invoice_id: Option<Uuid>,
    pub title: String,
    pub request: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
