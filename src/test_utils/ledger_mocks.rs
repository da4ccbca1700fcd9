//! In-memory ledger implementing every ledger port.
//!
//! One struct backs all four repos because payments advance the invoice they
//! belong to. Every port call bumps `call_count`; seeding helpers do not.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::ledger::{InvoiceLogRepo, InvoiceRepo, PaymentRepo, UserRepo},
    domain::entities::{
        invoice::{ExchangeRate, Invoice, InvoiceItem, InvoiceStatus},
        payment::{
            InvoiceLogEntry, NewChargeback, NewPayment, NewRefund, NewUserNote, PaymentRecord,
            RefundRecord,
        },
        user::{User, UserExtension, UserProfileBackfill},
    },
};

#[derive(Default)]
struct LedgerState {
    invoices: HashMap<Uuid, Invoice>,
    items: HashMap<Uuid, Vec<InvoiceItem>>,
    users: HashMap<Uuid, User>,
    payments: Vec<PaymentRecord>,
    access_periods: Vec<(Uuid, String)>,
    refunds: Vec<RefundRecord>,
    chargebacks: Vec<(Uuid, String)>,
    notes: Vec<(Uuid, String, String)>,
    logs: Vec<InvoiceLogEntry>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice(self, invoice: Invoice) -> Self {
        self.state.lock().unwrap().invoices.insert(invoice.id, invoice);
        self
    }

    pub fn with_items(self, invoice_id: Uuid, items: Vec<InvoiceItem>) -> Self {
        self.state.lock().unwrap().items.insert(invoice_id, items);
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.state.lock().unwrap().users.insert(user.id, user);
        self
    }

    /// Number of port calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn invoice(&self, id: Uuid) -> Option<Invoice> {
        self.state.lock().unwrap().invoices.get(&id).cloned()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.state.lock().unwrap().users.get(&id).cloned()
    }

    pub fn lock_user(&self, id: Uuid) {
        if let Some(user) = self.state.lock().unwrap().users.get_mut(&id) {
            user.is_locked = true;
        }
    }

    pub fn stored_exchange_rate(&self, invoice_id: Uuid) -> Option<ExchangeRate> {
        self.invoice(invoice_id)
            .and_then(|i| i.extension.exchange_rate)
    }

    pub fn payments_for(&self, invoice_id: Uuid) -> Vec<PaymentRecord> {
        self.state
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub fn access_periods_for(&self, invoice_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .access_periods
            .iter()
            .filter(|(id, _)| *id == invoice_id)
            .count()
    }

    pub fn refunds_for(&self, invoice_id: Uuid) -> Vec<RefundRecord> {
        self.state
            .lock()
            .unwrap()
            .refunds
            .iter()
            .filter(|r| r.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub fn chargebacks_for(&self, invoice_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .chargebacks
            .iter()
            .filter(|(id, _)| *id == invoice_id)
            .count()
    }

    pub fn notes_for(&self, user_id: Uuid) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .notes
            .iter()
            .filter(|(id, _, _)| *id == user_id)
            .map(|(_, _, content)| content.clone())
            .collect()
    }

    pub fn invoice_logs(&self) -> Vec<InvoiceLogEntry> {
        self.state.lock().unwrap().logs.clone()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn with_invoice_mut<T>(
        &self,
        invoice_id: Uuid,
        f: impl FnOnce(&mut Invoice) -> T,
    ) -> AppResult<T> {
        let mut state = self.state.lock().unwrap();
        let invoice = state.invoices.get_mut(&invoice_id).ok_or(AppError::NotFound)?;
        Ok(f(invoice))
    }

    fn with_user_mut<T>(&self, user_id: Uuid, f: impl FnOnce(&mut User) -> T) -> AppResult<T> {
        let mut state = self.state.lock().unwrap();
        let user = state.users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        Ok(f(user))
    }
}

#[async_trait]
impl InvoiceRepo for InMemoryLedger {
    async fn find_by_public_id(&self, public_id: &str) -> AppResult<Option<Invoice>> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .find(|i| i.public_id == public_id)
            .cloned())
    }

    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<Invoice>> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .find(|i| i.subscription_id() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_receipt_id(&self, receipt_id: &str) -> AppResult<Option<Invoice>> {
        self.touch();
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .find(|p| p.receipt_id == receipt_id)
            .and_then(|p| state.invoices.get(&p.invoice_id))
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Invoice> {
        self.touch();
        self.invoice(id).ok_or(AppError::NotFound)
    }

    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_status(&self, invoice_id: Uuid, status: InvoiceStatus) -> AppResult<()> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| i.status = status)
    }

    async fn set_cancelled(&self, invoice_id: Uuid) -> AppResult<()> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| {
            i.status = InvoiceStatus::Cancelled;
            i.rebill_date = None;
        })
    }

    async fn set_rebill_date(
        &self,
        invoice_id: Uuid,
        rebill_date: Option<NaiveDate>,
    ) -> AppResult<()> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| i.rebill_date = rebill_date)
    }

    async fn extend_access(&self, invoice_id: Uuid, until: NaiveDate) -> AppResult<NaiveDate> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| {
            let effective = i.access_expires_at.map_or(until, |current| current.max(until));
            i.access_expires_at = Some(effective);
            effective
        })
    }

    async fn set_subscription_id(&self, invoice_id: Uuid, subscription_id: &str) -> AppResult<()> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| {
            i.extension.subscription_id = Some(subscription_id.to_string())
        })
    }

    async fn set_billed_line_items(
        &self,
        invoice_id: Uuid,
        line_items: &[String],
    ) -> AppResult<()> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| {
            i.extension.billed_line_items = line_items.to_vec()
        })
    }

    async fn set_exchange_rate_if_absent(
        &self,
        invoice_id: Uuid,
        rate: ExchangeRate,
    ) -> AppResult<ExchangeRate> {
        self.touch();
        self.with_invoice_mut(invoice_id, |i| {
            i.extension.exchange_rate.get_or_insert(rate).clone()
        })
    }
}

#[async_trait]
impl PaymentRepo for InMemoryLedger {
    async fn add_payment(&self, invoice_id: Uuid, payment: NewPayment) -> AppResult<PaymentRecord> {
        self.touch();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if state
            .payments
            .iter()
            .any(|p| p.invoice_id == invoice_id && p.receipt_id == payment.receipt_id)
            || state
                .access_periods
                .iter()
                .any(|(id, txn)| *id == invoice_id && *txn == payment.receipt_id)
        {
            return Err(AppError::Duplicate);
        }
        let invoice = state.invoices.get_mut(&invoice_id).ok_or(AppError::NotFound)?;
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            invoice_id,
            user_id: invoice.user_id,
            receipt_id: payment.receipt_id,
            amount: payment.amount.unwrap_or_else(|| invoice.reference_amount()),
            currency: invoice.currency.clone(),
            paid_at: payment.paid_at,
        };
        invoice.apply_payment(payment.paid_at.date_naive(), payment.reset_rebill_date);
        state.payments.push(record.clone());
        Ok(record)
    }

    async fn add_access_period(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        begins_on: NaiveDate,
    ) -> AppResult<NaiveDate> {
        self.touch();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if state
            .access_periods
            .iter()
            .any(|(id, txn)| *id == invoice_id && txn == transaction_id)
        {
            return Err(AppError::Duplicate);
        }
        let invoice = state.invoices.get_mut(&invoice_id).ok_or(AppError::NotFound)?;
        let expires = invoice.apply_free_access(begins_on);
        state
            .access_periods
            .push((invoice_id, transaction_id.to_string()));
        Ok(expires)
    }

    async fn find_payment(
        &self,
        invoice_id: Uuid,
        receipt_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.invoice_id == invoice_id && p.receipt_id == receipt_id)
            .cloned())
    }

    async fn add_refund(&self, invoice_id: Uuid, refund: NewRefund) -> AppResult<()> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        if state
            .refunds
            .iter()
            .any(|r| r.invoice_id == invoice_id && r.receipt_id == refund.receipt_id)
        {
            return Err(AppError::Duplicate);
        }
        state.refunds.push(RefundRecord {
            invoice_id,
            receipt_id: refund.receipt_id,
            transaction_id: refund.transaction_id,
            amount: refund.amount,
            refunded_at: refund.refunded_at,
        });
        Ok(())
    }

    async fn delete_refund(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        receipt_id: &str,
    ) -> AppResult<u64> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let before = state.refunds.len();
        state.refunds.retain(|r| {
            !(r.invoice_id == invoice_id
                && r.transaction_id == transaction_id
                && r.receipt_id == receipt_id)
        });
        Ok((before - state.refunds.len()) as u64)
    }

    async fn add_chargeback(&self, invoice_id: Uuid, chargeback: NewChargeback) -> AppResult<()> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        if state
            .chargebacks
            .iter()
            .any(|(id, receipt)| *id == invoice_id && *receipt == chargeback.receipt_id)
        {
            return Err(AppError::Duplicate);
        }
        state.chargebacks.push((invoice_id, chargeback.receipt_id));
        Ok(())
    }
}

#[async_trait]
impl UserRepo for InMemoryLedger {
    async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        self.touch();
        self.user(user_id).ok_or(AppError::NotFound)
    }

    async fn backfill_profile(
        &self,
        user_id: Uuid,
        profile: &UserProfileBackfill,
    ) -> AppResult<()> {
        self.touch();
        self.with_user_mut(user_id, |u| profile.apply_to(u))
    }

    async fn set_paddle_refs(&self, user_id: Uuid, refs: &UserExtension) -> AppResult<()> {
        self.touch();
        self.with_user_mut(user_id, |u| {
            if refs.customer_id.is_some() {
                u.extension.customer_id = refs.customer_id.clone();
            }
            if refs.address_id.is_some() {
                u.extension.address_id = refs.address_id.clone();
            }
            if refs.business_id.is_some() {
                u.extension.business_id = refs.business_id.clone();
            }
        })
    }

    async fn set_locked(&self, user_id: Uuid, locked: bool) -> AppResult<()> {
        self.touch();
        self.with_user_mut(user_id, |u| u.is_locked = locked)
    }

    async fn add_note(&self, user_id: Uuid, note: NewUserNote) -> AppResult<()> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        if state
            .notes
            .iter()
            .any(|(id, event, _)| *id == user_id && *event == note.event_id)
        {
            return Err(AppError::Duplicate);
        }
        state.notes.push((user_id, note.event_id, note.content));
        Ok(())
    }
}

#[async_trait]
impl InvoiceLogRepo for InMemoryLedger {
    async fn append(&self, entry: InvoiceLogEntry) -> AppResult<()> {
        self.touch();
        self.state.lock().unwrap().logs.push(entry);
        Ok(())
    }
}
