//! Test data factories.
//!
//! Each factory creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    application::use_cases::reconciliation::{ReconcileDeps, ReconcilePolicy},
    domain::entities::{
        billing_period::BillingPeriod,
        event::WebhookEnvelope,
        invoice::{Invoice, InvoiceExtension, InvoiceItem, InvoiceStatus, UNLIMITED_REBILLS},
        user::{User, UserExtension},
    },
    test_utils::{InMemoryLedger, MockPaddleApi},
};

/// Monthly USD 10.00 subscription, pending, never paid.
pub fn create_test_invoice(overrides: impl FnOnce(&mut Invoice)) -> Invoice {
    let mut invoice = Invoice {
        id: Uuid::new_v4(),
        public_id: format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8]),
        user_id: Uuid::new_v4(),
        currency: "USD".to_string(),
        status: InvoiceStatus::Pending,
        first_total: dec!(10.00),
        second_total: dec!(10.00),
        first_period: BillingPeriod::Months(1),
        second_period: Some(BillingPeriod::Months(1)),
        rebill_times: UNLIMITED_REBILLS,
        rebill_date: None,
        access_expires_at: None,
        payments_count: 0,
        extension: InvoiceExtension::default(),
    };
    overrides(&mut invoice);
    invoice
}

pub fn create_test_item(
    invoice: &Invoice,
    overrides: impl FnOnce(&mut InvoiceItem),
) -> InvoiceItem {
    let mut item = InvoiceItem {
        id: Uuid::new_v4(),
        invoice_id: invoice.id,
        title: "Pro Membership".to_string(),
        description: Some("Access to all courses".to_string()),
        qty: 1,
        currency: invoice.currency.clone(),
        first_total: invoice.first_total,
        second_total: invoice.second_total,
        first_period: invoice.first_period,
        second_period: invoice.second_period,
        rebill_times: invoice.rebill_times,
    };
    overrides(&mut item);
    item
}

pub fn create_test_user(overrides: impl FnOnce(&mut User)) -> User {
    let mut user = User {
        id: Uuid::new_v4(),
        email: "member@example.com".to_string(),
        first_name: String::new(),
        last_name: String::new(),
        country: String::new(),
        postal_code: String::new(),
        tax_id: String::new(),
        is_locked: false,
        extension: UserExtension::default(),
    };
    overrides(&mut user);
    user
}

/// Envelope with a fresh event id, received now.
pub fn webhook_envelope(event_type: &str, data: Value) -> WebhookEnvelope {
    let body = serde_json::json!({
        "event_id": format!("evt_{}", Uuid::new_v4().simple()),
        "event_type": event_type,
        "occurred_at": "2026-03-01T10:00:00Z",
        "data": data,
    })
    .to_string();
    WebhookEnvelope::decode(&body, test_now()).unwrap()
}

pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T10:00:05Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn reconcile_deps(ledger: Arc<InMemoryLedger>, paddle: Arc<MockPaddleApi>) -> ReconcileDeps {
    reconcile_deps_with_policy(ledger, paddle, ReconcilePolicy::default())
}

pub fn reconcile_deps_with_policy(
    ledger: Arc<InMemoryLedger>,
    paddle: Arc<MockPaddleApi>,
    policy: ReconcilePolicy,
) -> ReconcileDeps {
    ReconcileDeps {
        invoices: ledger.clone(),
        payments: ledger.clone(),
        users: ledger.clone(),
        invoice_log: ledger,
        paddle,
        policy,
    }
}
