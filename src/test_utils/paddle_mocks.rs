//! Recording mock of the Paddle API port.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::paddle::{
        CreatedAdjustment, CustomerAddress, DraftTransaction, NewCustomer, PaddleApi,
        RefundRequest, TransactionCustomer,
    },
};

/// One recorded `upsert_address` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCall {
    pub customer_id: String,
    pub address_id: Option<String>,
    pub address: CustomerAddress,
}

#[derive(Default)]
pub struct MockPaddleApi {
    customer: TransactionCustomer,
    fail_customer_lookup: bool,
    fail_cancel: bool,
    fail_refund: bool,
    calls: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
    refunds: Mutex<Vec<RefundRequest>>,
    drafts: Mutex<Vec<DraftTransaction>>,
    existing_customer: Option<String>,
    fail_customer_create: bool,
    businesses: Vec<(String, String)>,
    fail_business_lookup: bool,
    customers_created: Mutex<Vec<NewCustomer>>,
    addresses: Mutex<Vec<AddressCall>>,
    business_lookups: Mutex<Vec<String>>,
}

impl MockPaddleApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(mut self, customer: TransactionCustomer) -> Self {
        self.customer = customer;
        self
    }

    pub fn failing_customer_lookup(mut self) -> Self {
        self.fail_customer_lookup = true;
        self
    }

    pub fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn failing_refund(mut self) -> Self {
        self.fail_refund = true;
        self
    }

    /// `ensure_customer` answers with this id, as Paddle does when the email
    /// is already registered.
    pub fn with_existing_customer(mut self, customer_id: &str) -> Self {
        self.existing_customer = Some(customer_id.to_string());
        self
    }

    pub fn failing_customer_create(mut self) -> Self {
        self.fail_customer_create = true;
        self
    }

    pub fn with_business(mut self, tax_identifier: &str, business_id: &str) -> Self {
        self.businesses
            .push((tax_identifier.to_string(), business_id.to_string()));
        self
    }

    pub fn failing_business_lookup(mut self) -> Self {
        self.fail_business_lookup = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancelled_subscriptions(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.refunds.lock().unwrap().clone()
    }

    pub fn drafts(&self) -> Vec<DraftTransaction> {
        self.drafts.lock().unwrap().clone()
    }

    pub fn customers_created(&self) -> Vec<NewCustomer> {
        self.customers_created.lock().unwrap().clone()
    }

    pub fn address_calls(&self) -> Vec<AddressCall> {
        self.addresses.lock().unwrap().clone()
    }

    pub fn business_lookups(&self) -> Vec<String> {
        self.business_lookups.lock().unwrap().clone()
    }

    fn remote_error(code: &str) -> AppError {
        AppError::Remote {
            status: Some(400),
            code: Some(code.to_string()),
            detail: format!("mock failure: {}", code),
        }
    }
}

#[async_trait]
impl PaddleApi for MockPaddleApi {
    async fn get_transaction_customer(
        &self,
        _invoice_id: Option<Uuid>,
        _transaction_id: &str,
    ) -> AppResult<TransactionCustomer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_customer_lookup {
            return Err(Self::remote_error("not_found"));
        }
        Ok(self.customer.clone())
    }

    async fn cancel_subscription(
        &self,
        _invoice_id: Option<Uuid>,
        subscription_id: &str,
    ) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel {
            return Err(Self::remote_error("internal_error"));
        }
        self.cancelled
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }

    async fn create_refund(
        &self,
        _invoice_id: Option<Uuid>,
        request: &RefundRequest,
    ) -> AppResult<CreatedAdjustment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refund {
            return Err(Self::remote_error("transaction_not_refundable"));
        }
        self.refunds.lock().unwrap().push(request.clone());
        Ok(CreatedAdjustment {
            id: "adj_mock".to_string(),
            status: "pending_approval".to_string(),
        })
    }

    async fn create_draft_transaction(
        &self,
        _invoice_id: Option<Uuid>,
        draft: &DraftTransaction,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.drafts.lock().unwrap().push(draft.clone());
        Ok("txn_draft".to_string())
    }

    async fn ensure_customer(
        &self,
        _invoice_id: Option<Uuid>,
        customer: &NewCustomer,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_customer_create {
            return Err(Self::remote_error("invalid_field"));
        }
        self.customers_created.lock().unwrap().push(customer.clone());
        Ok(self
            .existing_customer
            .clone()
            .unwrap_or_else(|| "ctm_mock".to_string()))
    }

    async fn upsert_address(
        &self,
        _invoice_id: Option<Uuid>,
        customer_id: &str,
        address_id: Option<&str>,
        address: &CustomerAddress,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(AddressCall {
            customer_id: customer_id.to_string(),
            address_id: address_id.map(str::to_string),
            address: address.clone(),
        });
        Ok(address_id.unwrap_or("add_mock").to_string())
    }

    async fn find_business_by_tax_id(
        &self,
        _invoice_id: Option<Uuid>,
        _customer_id: &str,
        tax_id: &str,
    ) -> AppResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.business_lookups.lock().unwrap().push(tax_id.to_string());
        if self.fail_business_lookup {
            return Err(Self::remote_error("internal_error"));
        }
        Ok(self
            .businesses
            .iter()
            .find(|(tax, _)| tax.contains(tax_id))
            .map(|(_, id)| id.clone()))
    }

    fn is_sandbox(&self) -> bool {
        true
    }
}
