use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::billing_period::BillingPeriod;

/// Rebill count the ledger stores for "rebill until cancelled".
pub const UNLIMITED_REBILLS: i32 = 99_999;

/// Invoice status as stored in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    RecurringActive,
    RecurringFailed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::RecurringActive => "recurring_active",
            InvoiceStatus::RecurringFailed => "recurring_failed",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "paid" => Ok(InvoiceStatus::Paid),
            "recurring_active" => Ok(InvoiceStatus::RecurringActive),
            "recurring_failed" => Ok(InvoiceStatus::RecurringFailed),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(format!("Invalid invoice status: {}", s)),
        }
    }
}

/// Rate snapshot: localized amount / reference invoice amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate: Decimal,
    /// Currency the customer was charged in.
    pub currency: String,
}

/// Paddle-specific values the ledger keeps next to an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceExtension {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub billed_line_items: Vec<String>,
    #[serde(default)]
    pub exchange_rate: Option<ExchangeRate>,
}

#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: Uuid,
    pub public_id: String,
    pub user_id: Uuid,
    pub currency: String,
    pub status: InvoiceStatus,
    pub first_total: Decimal,
    pub second_total: Decimal,
    pub first_period: BillingPeriod,
    pub second_period: Option<BillingPeriod>,
    pub rebill_times: i32,
    pub rebill_date: Option<NaiveDate>,
    pub access_expires_at: Option<NaiveDate>,
    pub payments_count: i32,
    pub extension: InvoiceExtension,
}

impl Invoice {
    pub fn is_unlimited(&self) -> bool {
        self.rebill_times >= UNLIMITED_REBILLS
    }

    /// Number of payments the invoice will ever take, `None` when unbounded.
    pub fn expected_payments(&self) -> Option<i32> {
        if self.is_unlimited() {
            return None;
        }
        let first = if self.first_total > Decimal::ZERO { 1 } else { 0 };
        Some(self.rebill_times + first)
    }

    /// Local amount the next payment is measured against.
    pub fn reference_amount(&self) -> Decimal {
        if self.billing_cycle() == 0 {
            self.first_total
        } else {
            self.second_total
        }
    }

    /// Index of the period the next payment pays for. A free first period
    /// is never paid, so the first payment on such an invoice is cycle 1.
    fn billing_cycle(&self) -> i32 {
        let free_first = if self.first_total.is_zero() { 1 } else { 0 };
        self.payments_count + free_first
    }

    /// Whether a charge of `charged_total` grants the free first period.
    ///
    /// Decided from the charge and the payment count only, so a redelivered
    /// trial transaction still lands on the access-period branch after the
    /// first delivery moved the status on.
    pub fn is_free_trial_start(&self, charged_total: Decimal) -> bool {
        self.first_total == Decimal::ZERO && self.payments_count == 0 && charged_total.is_zero()
    }

    /// Period the next payment covers.
    pub fn next_payment_period(&self) -> BillingPeriod {
        if self.billing_cycle() == 0 {
            self.first_period
        } else {
            self.second_period.unwrap_or(self.first_period)
        }
    }

    /// Status an invoice moves to once a payment is recorded.
    pub fn status_after_payment(&self) -> InvoiceStatus {
        if self.second_period.is_some() && self.rebill_times > 0 {
            InvoiceStatus::RecurringActive
        } else {
            InvoiceStatus::Paid
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.extension.subscription_id.as_deref()
    }

    /// Move the invoice forward after a freshly inserted payment.
    ///
    /// Access is extended from the later of the payment date and the current
    /// expiry. The rebill date is cleared once the last expected payment is in.
    pub fn apply_payment(&mut self, paid_on: NaiveDate, reset_rebill_date: bool) {
        let period = self.next_payment_period();
        let begins = self
            .access_expires_at
            .map_or(paid_on, |current| current.max(paid_on));
        let expires = period.add_to(begins);
        self.access_expires_at = Some(self.access_expires_at.map_or(expires, |c| c.max(expires)));
        self.payments_count += 1;
        self.status = self.status_after_payment();

        let more_to_come = self
            .expected_payments()
            .is_none_or(|expected| self.payments_count < expected);
        self.rebill_date = match (self.second_period, more_to_come) {
            (Some(second), true) => {
                let from = if reset_rebill_date {
                    paid_on
                } else {
                    self.rebill_date.unwrap_or(paid_on)
                };
                // A paid first period bills again after the first period,
                // later ones after the second.
                let step = if self.billing_cycle() == 1 {
                    self.first_period
                } else {
                    second
                };
                Some(step.add_to(from))
            }
            _ => None,
        };
    }

    /// Move the invoice forward after a free first-period access grant.
    /// Returns the date the granted access ends.
    pub fn apply_free_access(&mut self, begins_on: NaiveDate) -> NaiveDate {
        let expires = self.first_period.add_to(begins_on);
        self.access_expires_at = Some(self.access_expires_at.map_or(expires, |c| c.max(expires)));
        self.status = self.status_after_payment();
        if self.second_period.is_some() && self.rebill_times > 0 {
            self.rebill_date = Some(expires);
        }
        expires
    }
}

/// Single product line on an invoice.
#[derive(Debug, Clone)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub qty: i32,
    pub currency: String,
    pub first_total: Decimal,
    pub second_total: Decimal,
    pub first_period: BillingPeriod,
    pub second_period: Option<BillingPeriod>,
    pub rebill_times: i32,
}

impl InvoiceItem {
    pub fn is_recurring(&self) -> bool {
        self.second_period.is_some() && self.rebill_times > 0
    }
}
