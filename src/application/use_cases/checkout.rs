use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        ledger::{InvoiceRepo, UserRepo},
        paddle::{
            BillingCycle, CustomerAddress, DraftItem, DraftPrice, DraftProduct,
            DraftTransaction, NewCustomer, PaddleApi, PriceQuantity, UnitPrice,
        },
    },
    domain::entities::{
        billing_period::BillingPeriod,
        event::CUSTOM_DATA_INVOICE_KEY,
        invoice::{Invoice, InvoiceItem, InvoiceStatus, UNLIMITED_REBILLS},
        money::Money,
        user::{User, UserExtension},
    },
};

const ADDRESS_DESCRIPTION: &str = "Billing address";

/// What the client-side checkout needs to open the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub transaction_id: String,
    pub environment: &'static str,
}

pub fn rebill_text(rebill_times: i32) -> String {
    match rebill_times {
        0 => "One Time Charge".to_string(),
        1 => "Bills ONE Time".to_string(),
        n if n >= UNLIMITED_REBILLS => "Rebills Until Cancelled".to_string(),
        n => format!("Bills {} Times", n),
    }
}

fn cycle(period: &BillingPeriod) -> BillingCycle {
    BillingCycle {
        interval: period.paddle_interval(),
        frequency: period.paddle_frequency(),
    }
}

fn price_of(amount: Decimal, currency: &str) -> UnitPrice {
    let money = Money::new(amount, currency);
    UnitPrice {
        amount: money.to_minor_units(),
        currency_code: money.currency,
    }
}

fn terms(item: &InvoiceItem) -> String {
    let first = Money::new(item.first_total, &item.currency);
    match item.second_period {
        Some(second) if item.rebill_times > 0 => format!(
            "{} for {}, then {} every {} ({})",
            first,
            item.first_period.text(),
            Money::new(item.second_total, &item.currency),
            second.text(),
            rebill_text(item.rebill_times)
        ),
        _ => format!("{} for {}", first, item.first_period.text()),
    }
}

fn item_custom_data(item: &InvoiceItem, period: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("invoice_item".into(), Value::String(item.id.to_string()));
    data.insert("period".into(), Value::String(period.to_string()));
    data
}

/// Transaction items for one invoice item.
///
/// Paddle cannot express a subscription whose first period differs from the
/// rest, so such items become a one-time first payment plus a recurring item
/// whose trial covers the first period.
pub fn draft_items(item: &InvoiceItem) -> Vec<DraftItem> {
    let first_text = item.first_period.text();
    let recurring = DraftItem {
        quantity: item.qty,
        price: DraftPrice {
            name: format!("Subscription: {}", rebill_text(item.rebill_times)),
            description: terms(item),
            billing_cycle: item.second_period.as_ref().map(cycle),
            trial_period: Some(cycle(&item.first_period)),
            tax_mode: "account_setting",
            unit_price: price_of(item.second_total, &item.currency),
            quantity: PriceQuantity {
                minimum: item.qty,
                maximum: item.qty,
            },
            custom_data: item_custom_data(item, "first_period"),
            product: DraftProduct {
                name: item.title.clone(),
                description: item.description.clone(),
                tax_category: "standard",
            },
        },
    };

    let one_time = |name: String| {
        let mut one = recurring.clone();
        one.price.name = name;
        one.price.billing_cycle = None;
        one.price.trial_period = None;
        one.price.unit_price = price_of(item.first_total, &item.currency);
        one
    };

    if !item.is_recurring() {
        let label = if item.first_total > Decimal::ZERO {
            "Purchase"
        } else {
            "Free"
        };
        return vec![one_time(format!("{}: {}", label, first_text))];
    }

    if item.first_total == Decimal::ZERO {
        return vec![recurring];
    }

    if item.first_total == item.second_total && Some(item.first_period) == item.second_period {
        let mut simple = recurring;
        simple.price.trial_period = None;
        return vec![simple];
    }

    let first = one_time(format!("First Payment: {}", first_text));
    let mut rebill = recurring;
    rebill
        .price
        .custom_data
        .insert("period".into(), Value::String("second_period".into()));
    vec![first, rebill]
}

/// Build the full draft transaction for an invoice.
pub fn build_draft_transaction(
    invoice: &Invoice,
    items: &[InvoiceItem],
    paddle_refs: &UserExtension,
    extra_custom_data: &[(String, String)],
) -> DraftTransaction {
    let mut custom_data = Map::new();
    for (key, value) in extra_custom_data {
        if key != CUSTOM_DATA_INVOICE_KEY {
            custom_data.insert(key.clone(), Value::String(value.clone()));
        }
    }
    custom_data.insert(
        CUSTOM_DATA_INVOICE_KEY.into(),
        Value::String(invoice.public_id.clone()),
    );

    DraftTransaction {
        currency_code: invoice.currency.to_uppercase(),
        custom_data,
        items: items.iter().flat_map(draft_items).collect(),
        customer_id: paddle_refs.customer_id.clone(),
        address_id: paddle_refs.address_id.clone(),
        business_id: paddle_refs.business_id.clone(),
    }
}

pub struct CheckoutUseCases {
    invoices: Arc<dyn InvoiceRepo>,
    users: Arc<dyn UserRepo>,
    paddle: Arc<dyn PaddleApi>,
    custom_data: Vec<(String, String)>,
}

impl CheckoutUseCases {
    pub fn new(
        invoices: Arc<dyn InvoiceRepo>,
        users: Arc<dyn UserRepo>,
        paddle: Arc<dyn PaddleApi>,
        custom_data: Vec<(String, String)>,
    ) -> Self {
        Self {
            invoices,
            users,
            paddle,
            custom_data,
        }
    }

    /// Create a Paddle draft transaction for a pending invoice.
    pub async fn create_checkout(&self, public_id: &str) -> AppResult<CheckoutSession> {
        let invoice = self
            .invoices
            .find_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if invoice.status != InvoiceStatus::Pending {
            return Err(AppError::InvalidInput(format!(
                "Invoice {} is {} and cannot be checked out",
                invoice.public_id, invoice.status
            )));
        }

        let items = self.invoices.list_items(invoice.id).await?;
        if items.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Invoice {} has no items",
                invoice.public_id
            )));
        }

        let user = self.users.get_user(invoice.user_id).await?;
        let paddle_refs = self.sync_customer(&invoice, &user).await?;
        let draft = build_draft_transaction(&invoice, &items, &paddle_refs, &self.custom_data);

        let transaction_id = self
            .paddle
            .create_draft_transaction(Some(invoice.id), &draft)
            .await?;

        tracing::info!(
            invoice_id = %invoice.id,
            transaction_id = %transaction_id,
            items = draft.items.len(),
            "Draft transaction created"
        );

        Ok(CheckoutSession {
            transaction_id,
            environment: if self.paddle.is_sandbox() {
                "sandbox"
            } else {
                "production"
            },
        })
    }

    /// Register the member with Paddle and return the ids to attach to the
    /// draft. New ids are stored on the user as soon as Paddle returns them.
    async fn sync_customer(&self, invoice: &Invoice, user: &User) -> AppResult<UserExtension> {
        let invoice_id = Some(invoice.id);
        let mut refs = user.extension.clone();

        let customer_id = match refs.customer_id.clone() {
            Some(id) => id,
            None => {
                let customer = NewCustomer {
                    email: user.email.clone(),
                    name: user.full_name(),
                };
                let id = self.paddle.ensure_customer(invoice_id, &customer).await?;
                self.store_refs(
                    user.id,
                    UserExtension {
                        customer_id: Some(id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                tracing::info!(user_id = %user.id, customer_id = %id, "Paddle customer linked");
                refs.customer_id = Some(id.clone());
                id
            }
        };

        if !user.country.trim().is_empty() {
            let address = CustomerAddress {
                country_code: user.country.trim().to_uppercase(),
                postal_code: Some(user.postal_code.trim())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
                description: ADDRESS_DESCRIPTION.to_string(),
            };
            let address_id = self
                .paddle
                .upsert_address(invoice_id, &customer_id, refs.address_id.as_deref(), &address)
                .await?;
            if refs.address_id.as_deref() != Some(address_id.as_str()) {
                self.store_refs(
                    user.id,
                    UserExtension {
                        address_id: Some(address_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            }
            refs.address_id = Some(address_id);
        }

        let tax_id = user.tax_id.trim();
        if refs.business_id.is_none() && !tax_id.is_empty() {
            match self
                .paddle
                .find_business_by_tax_id(invoice_id, &customer_id, tax_id)
                .await
            {
                Ok(Some(business_id)) => {
                    self.store_refs(
                        user.id,
                        UserExtension {
                            business_id: Some(business_id.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                    refs.business_id = Some(business_id);
                }
                Ok(None) => {
                    tracing::debug!(user_id = %user.id, "No Paddle business matches tax id");
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        error = %e,
                        "Paddle business lookup failed, checking out without a business"
                    );
                }
            }
        }

        Ok(refs)
    }

    async fn store_refs(&self, user_id: Uuid, refs: UserExtension) -> AppResult<()> {
        self.users.set_paddle_refs(user_id, &refs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        InMemoryLedger, MockPaddleApi, create_test_invoice, create_test_item, create_test_user,
    };
    use rust_decimal_macros::dec;

    #[test]
    fn rebill_texts() {
        assert_eq!(rebill_text(0), "One Time Charge");
        assert_eq!(rebill_text(1), "Bills ONE Time");
        assert_eq!(rebill_text(5), "Bills 5 Times");
        assert_eq!(rebill_text(UNLIMITED_REBILLS), "Rebills Until Cancelled");
    }

    #[test]
    fn one_time_item_has_no_cycle() {
        let invoice = create_test_invoice(|_| {});
        let item = create_test_item(&invoice, |i| {
            i.first_total = dec!(19.99);
            i.second_period = None;
            i.rebill_times = 0;
        });

        let items = draft_items(&item);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price.name, "Purchase: 1 Month");
        assert_eq!(items[0].price.unit_price.amount, "1999");
        assert!(items[0].price.billing_cycle.is_none());
        assert!(items[0].price.trial_period.is_none());
    }

    #[test]
    fn free_trial_uses_trial_period() {
        let invoice = create_test_invoice(|_| {});
        let item = create_test_item(&invoice, |i| {
            i.first_total = Decimal::ZERO;
            i.first_period = BillingPeriod::Days(14);
            i.second_total = dec!(10);
        });

        let items = draft_items(&item);
        assert_eq!(items.len(), 1);
        let price = &items[0].price;
        assert_eq!(price.trial_period, Some(BillingCycle { interval: "day", frequency: 14 }));
        assert_eq!(price.billing_cycle, Some(BillingCycle { interval: "month", frequency: 1 }));
        assert_eq!(price.unit_price.amount, "1000");
    }

    #[test]
    fn simple_rebill_has_cycle_only() {
        let invoice = create_test_invoice(|_| {});
        let item = create_test_item(&invoice, |_| {});

        let items = draft_items(&item);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price.name, "Subscription: Rebills Until Cancelled");
        assert!(items[0].price.trial_period.is_none());
        assert!(items[0].price.billing_cycle.is_some());
    }

    #[test]
    fn complex_rebill_splits_first_payment() {
        let invoice = create_test_invoice(|_| {});
        let item = create_test_item(&invoice, |i| {
            i.first_total = dec!(1);
            i.first_period = BillingPeriod::Days(7);
            i.second_total = dec!(20);
            i.second_period = Some(BillingPeriod::Years(1));
            i.rebill_times = 3;
        });

        let items = draft_items(&item);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price.name, "First Payment: 7 Days");
        assert_eq!(items[0].price.unit_price.amount, "100");
        assert!(items[0].price.billing_cycle.is_none());

        assert_eq!(items[1].price.name, "Subscription: Bills 3 Times");
        assert_eq!(items[1].price.unit_price.amount, "2000");
        assert_eq!(
            items[1].price.trial_period,
            Some(BillingCycle {
                interval: "day",
                frequency: 7
            })
        );
        assert_eq!(items[1].price.custom_data["period"], "second_period");
    }

    #[test]
    fn custom_data_never_overrides_invoice_key() {
        let invoice = create_test_invoice(|i| i.public_id = "INV-42".into());
        let item = create_test_item(&invoice, |_| {});
        let extra = vec![
            ("utm_medium".to_string(), "email".to_string()),
            (CUSTOM_DATA_INVOICE_KEY.to_string(), "HIJACK".to_string()),
        ];

        let draft = build_draft_transaction(&invoice, &[item], &UserExtension::default(), &extra);
        assert_eq!(draft.custom_data[CUSTOM_DATA_INVOICE_KEY], "INV-42");
        assert_eq!(draft.custom_data["utm_medium"], "email");
        assert_eq!(draft.currency_code, "USD");
    }

    #[tokio::test]
    async fn create_checkout_posts_draft() {
        let invoice = create_test_invoice(|i| i.public_id = "INV-7".into());
        let item = create_test_item(&invoice, |_| {});
        let user = create_test_user(|u| {
            u.id = invoice.user_id;
            u.extension.customer_id = Some("ctm_1".into());
        });
        let ledger = Arc::new(
            InMemoryLedger::new()
                .with_invoice(invoice.clone())
                .with_items(invoice.id, vec![item])
                .with_user(user),
        );
        let paddle = Arc::new(MockPaddleApi::new());
        let use_cases = CheckoutUseCases::new(ledger.clone(), ledger, paddle.clone(), vec![]);

        let session = use_cases.create_checkout("INV-7").await.unwrap();

        assert_eq!(session.transaction_id, "txn_draft");
        assert_eq!(session.environment, "sandbox");
        let drafts = paddle.drafts();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].customer_id.as_deref(), Some("ctm_1"));
    }

    fn checkout_fixture(
        user_overrides: impl FnOnce(&mut User),
        paddle: MockPaddleApi,
    ) -> (CheckoutUseCases, Arc<InMemoryLedger>, Arc<MockPaddleApi>, Uuid) {
        let invoice = create_test_invoice(|i| i.public_id = "INV-S".into());
        let item = create_test_item(&invoice, |_| {});
        let user = create_test_user(|u| {
            u.id = invoice.user_id;
            user_overrides(u);
        });
        let user_id = user.id;
        let ledger = Arc::new(
            InMemoryLedger::new()
                .with_invoice(invoice.clone())
                .with_items(invoice.id, vec![item])
                .with_user(user),
        );
        let paddle = Arc::new(paddle);
        let use_cases =
            CheckoutUseCases::new(ledger.clone(), ledger.clone(), paddle.clone(), vec![]);
        (use_cases, ledger, paddle, user_id)
    }

    #[tokio::test]
    async fn first_checkout_creates_customer_and_address() {
        let (use_cases, ledger, paddle, user_id) = checkout_fixture(
            |u| {
                u.first_name = "Ada".into();
                u.last_name = "Lovelace".into();
                u.country = "gb".into();
                u.postal_code = "N1 9GU".into();
            },
            MockPaddleApi::new(),
        );

        use_cases.create_checkout("INV-S").await.unwrap();

        let created = paddle.customers_created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].email, "member@example.com");
        assert_eq!(created[0].name.as_deref(), Some("Ada Lovelace"));

        let addresses = paddle.address_calls();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].customer_id, "ctm_mock");
        assert_eq!(addresses[0].address_id, None);
        assert_eq!(addresses[0].address.country_code, "GB");
        assert_eq!(addresses[0].address.postal_code.as_deref(), Some("N1 9GU"));

        let stored = ledger.user(user_id).unwrap().extension;
        assert_eq!(stored.customer_id.as_deref(), Some("ctm_mock"));
        assert_eq!(stored.address_id.as_deref(), Some("add_mock"));

        let draft = &paddle.drafts()[0];
        assert_eq!(draft.customer_id.as_deref(), Some("ctm_mock"));
        assert_eq!(draft.address_id.as_deref(), Some("add_mock"));
        assert!(paddle.business_lookups().is_empty());
    }

    #[tokio::test]
    async fn existing_paddle_customer_is_reused() {
        let (use_cases, ledger, paddle, user_id) =
            checkout_fixture(|_| {}, MockPaddleApi::new().with_existing_customer("ctm_known"));

        use_cases.create_checkout("INV-S").await.unwrap();

        let stored = ledger.user(user_id).unwrap().extension;
        assert_eq!(stored.customer_id.as_deref(), Some("ctm_known"));
        assert_eq!(paddle.drafts()[0].customer_id.as_deref(), Some("ctm_known"));
        assert!(paddle.address_calls().is_empty());
    }

    #[tokio::test]
    async fn stored_refs_skip_create_and_patch_address() {
        let (use_cases, _ledger, paddle, _user_id) = checkout_fixture(
            |u| {
                u.country = "DE".into();
                u.extension.customer_id = Some("ctm_1".into());
                u.extension.address_id = Some("add_1".into());
            },
            MockPaddleApi::new(),
        );

        use_cases.create_checkout("INV-S").await.unwrap();

        assert!(paddle.customers_created().is_empty());
        let addresses = paddle.address_calls();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address_id.as_deref(), Some("add_1"));
        assert_eq!(addresses[0].address.postal_code, None);
        assert_eq!(paddle.drafts()[0].address_id.as_deref(), Some("add_1"));
    }

    #[tokio::test]
    async fn business_is_looked_up_by_tax_id() {
        let (use_cases, ledger, paddle, user_id) = checkout_fixture(
            |u| {
                u.tax_id = "123456789".into();
                u.extension.customer_id = Some("ctm_1".into());
            },
            MockPaddleApi::new().with_business("DE123456789", "biz_1"),
        );

        use_cases.create_checkout("INV-S").await.unwrap();

        assert_eq!(paddle.business_lookups(), vec!["123456789".to_string()]);
        let stored = ledger.user(user_id).unwrap().extension;
        assert_eq!(stored.business_id.as_deref(), Some("biz_1"));
        assert_eq!(paddle.drafts()[0].business_id.as_deref(), Some("biz_1"));
    }

    #[tokio::test]
    async fn stored_business_is_not_looked_up_again() {
        let (use_cases, _ledger, paddle, _user_id) = checkout_fixture(
            |u| {
                u.tax_id = "123456789".into();
                u.extension.customer_id = Some("ctm_1".into());
                u.extension.business_id = Some("biz_9".into());
            },
            MockPaddleApi::new(),
        );

        use_cases.create_checkout("INV-S").await.unwrap();

        assert!(paddle.business_lookups().is_empty());
        assert_eq!(paddle.drafts()[0].business_id.as_deref(), Some("biz_9"));
    }

    #[tokio::test]
    async fn failed_business_lookup_still_checks_out() {
        let (use_cases, _ledger, paddle, _user_id) = checkout_fixture(
            |u| {
                u.tax_id = "123".into();
                u.extension.customer_id = Some("ctm_1".into());
            },
            MockPaddleApi::new().failing_business_lookup(),
        );

        let session = use_cases.create_checkout("INV-S").await.unwrap();

        assert_eq!(session.transaction_id, "txn_draft");
        assert_eq!(paddle.drafts()[0].business_id, None);
    }

    #[tokio::test]
    async fn failed_customer_create_aborts_checkout() {
        let (use_cases, ledger, paddle, user_id) =
            checkout_fixture(|_| {}, MockPaddleApi::new().failing_customer_create());

        let err = use_cases.create_checkout("INV-S").await.unwrap_err();

        assert!(matches!(err, AppError::Remote { .. }));
        assert!(paddle.drafts().is_empty());
        assert_eq!(ledger.user(user_id).unwrap().extension.customer_id, None);
    }

    #[tokio::test]
    async fn paid_invoice_cannot_be_checked_out() {
        let invoice = create_test_invoice(|i| i.status = InvoiceStatus::Paid);
        let ledger = Arc::new(InMemoryLedger::new().with_invoice(invoice.clone()));
        let use_cases =
            CheckoutUseCases::new(ledger.clone(), ledger, Arc::new(MockPaddleApi::new()), vec![]);

        let err = use_cases.create_checkout(&invoice.public_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
