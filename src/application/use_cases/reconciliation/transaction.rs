use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{
    ReconcileDeps, WebhookHandler,
    exchange_rate::resolve_payment_amount,
    idempotency::{Applied, apply_once},
    resolver::InvoiceLookup,
};
use crate::{
    app_error::AppResult,
    domain::entities::{
        event::{WebhookEnvelope, invoice_public_id},
        invoice::Invoice,
        paddle_payload::{TransactionData, TransactionOrigin},
        payment::NewPayment,
        user::{UserExtension, UserProfileBackfill},
    },
};

/// `transaction.completed`: capture a payment or grant the free first period.
pub struct TransactionHandler {
    data: TransactionData,
}

impl TransactionHandler {
    pub fn new(data: TransactionData) -> Self {
        Self { data }
    }

    /// Fill empty profile fields from the customer Paddle holds. Never fails.
    async fn backfill_user(&self, deps: &ReconcileDeps, invoice: &Invoice) {
        let customer = match deps
            .paddle
            .get_transaction_customer(Some(invoice.id), &self.data.id)
            .await
        {
            Ok(customer) => customer,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transaction_id = %self.data.id,
                    "Could not fetch customer details, skipping backfill"
                );
                return;
            }
        };

        let mut profile = UserProfileBackfill {
            country: customer.country_code,
            postal_code: customer.postal_code,
            tax_id: customer.tax_identifier,
            ..Default::default()
        };
        if let Some(name) = customer.name.as_deref() {
            profile = profile.with_full_name(name);
        }
        if profile.is_empty() {
            return;
        }

        if let Err(e) = deps.users.backfill_profile(invoice.user_id, &profile).await {
            tracing::warn!(error = %e, user_id = %invoice.user_id, "User backfill failed");
        }
    }

    /// Cancel the Paddle subscription once every expected payment is in.
    /// Paddle subscriptions otherwise run forever.
    async fn cancel_if_complete(&self, deps: &ReconcileDeps, invoice: &Invoice) -> AppResult<()> {
        let current = deps.invoices.get_by_id(invoice.id).await?;
        let Some(subscription_id) = self
            .data
            .subscription_id
            .as_deref()
            .or(current.subscription_id())
        else {
            return Ok(());
        };
        let Some(expected) = current.expected_payments() else {
            return Ok(());
        };
        if current.payments_count < expected {
            return Ok(());
        }

        tracing::info!(
            invoice_id = %invoice.id,
            subscription_id,
            expected,
            "All expected payments made, cancelling subscription"
        );
        match deps
            .paddle
            .cancel_subscription(Some(invoice.id), subscription_id)
            .await
        {
            Ok(()) => deps.invoices.set_cancelled(invoice.id).await,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    invoice_id = %invoice.id,
                    subscription_id,
                    "Unable to cancel completed subscription"
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl WebhookHandler for TransactionHandler {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn should_process(&self, _envelope: &WebhookEnvelope) -> bool {
        self.data.origin.is_billing()
    }

    fn lookup(&self) -> InvoiceLookup {
        InvoiceLookup {
            public_id: invoice_public_id(self.data.custom_data.as_ref()),
            subscription_id: self.data.subscription_id.clone(),
            receipt_id: Some(self.data.id.clone()),
        }
    }

    fn retry_when_unresolved(&self) -> bool {
        false
    }

    async fn amount(&self, deps: &ReconcileDeps, invoice: &Invoice) -> AppResult<Option<Decimal>> {
        let total = self.data.total()?;
        resolve_payment_amount(deps.invoices.as_ref(), invoice, &total).await
    }

    async fn process_validated(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        let data = &self.data;

        // Saved here because subscription.* may arrive before this event.
        if let Some(subscription_id) = data.subscription_id.as_deref()
            && invoice.subscription_id() != Some(subscription_id)
        {
            deps.invoices
                .set_subscription_id(invoice.id, subscription_id)
                .await?;
        }

        // Kept for refund requests.
        deps.invoices
            .set_billed_line_items(invoice.id, &data.billed_line_items())
            .await?;

        self.backfill_user(deps, invoice).await;

        deps.users
            .set_paddle_refs(
                invoice.user_id,
                &UserExtension {
                    customer_id: data.customer_id.clone(),
                    address_id: data.address_id.clone(),
                    business_id: data.business_id.clone(),
                },
            )
            .await?;

        let amount = self.amount(deps, invoice).await?;

        if invoice.is_free_trial_start(data.total()?.amount) {
            let begins_on = envelope.received_at.date_naive();
            if let Applied::Fresh(expires) = apply_once(
                "access_period",
                deps.payments
                    .add_access_period(invoice.id, &data.id, begins_on),
            )
            .await?
            {
                tracing::info!(invoice_id = %invoice.id, %expires, "Free access period granted");
            }
            return Ok(());
        }

        if data.origin == TransactionOrigin::SubscriptionUpdate {
            let total = data.total()?;
            deps.note_once(
                envelope,
                invoice.user_id,
                format!(
                    "Paddle charged {} for a subscription change on invoice #{} (transaction {}).",
                    total, invoice.public_id, data.id
                ),
            )
            .await?;
            return Ok(());
        }

        let paid_at = data.billed_at.unwrap_or(envelope.occurred_at);
        let applied = apply_once(
            "payment",
            deps.payments.add_payment(
                invoice.id,
                NewPayment {
                    receipt_id: data.id.clone(),
                    amount,
                    paid_at,
                    reset_rebill_date: true,
                },
            ),
        )
        .await?;

        if let Applied::Fresh(payment) = applied {
            tracing::info!(
                invoice_id = %invoice.id,
                receipt_id = %payment.receipt_id,
                amount = %payment.amount,
                "Payment recorded"
            );
            self.cancel_if_complete(deps, invoice).await?;
        }

        Ok(())
    }
}
