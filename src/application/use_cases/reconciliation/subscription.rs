use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{ReconcileDeps, WebhookHandler, resolver::InvoiceLookup};
use crate::{
    app_error::AppResult,
    domain::entities::{
        event::{EventType, WebhookEnvelope, invoice_public_id},
        invoice::{Invoice, InvoiceStatus},
        paddle_payload::{PaddleSubscriptionStatus, SubscriptionData},
    },
};

/// `subscription.updated` / `subscription.cancelled`: keep recurring status,
/// rebill date and dunning access in step with Paddle.
pub struct SubscriptionHandler {
    data: SubscriptionData,
}

impl SubscriptionHandler {
    pub fn new(data: SubscriptionData) -> Self {
        Self { data }
    }

    async fn apply_update(&self, deps: &ReconcileDeps, invoice: &Invoice) -> AppResult<()> {
        // Cancellation is immediate and final in Paddle, so any later update
        // for the subscription is a stale delivery.
        if invoice.status == InvoiceStatus::Cancelled {
            tracing::info!(
                invoice_id = %invoice.id,
                subscription_id = %self.data.id,
                paddle_status = ?self.data.status,
                "Invoice already cancelled, ignoring subscription update"
            );
            return Ok(());
        }

        let target = match self.data.status {
            PaddleSubscriptionStatus::Active | PaddleSubscriptionStatus::Trialing => {
                Some(InvoiceStatus::RecurringActive)
            }
            PaddleSubscriptionStatus::Paused | PaddleSubscriptionStatus::PastDue => {
                Some(InvoiceStatus::RecurringFailed)
            }
            _ => None,
        };
        if let Some(status) = target
            && status != invoice.status
        {
            deps.invoices.set_status(invoice.id, status).await?;
            tracing::info!(invoice_id = %invoice.id, status = %status, "Invoice status updated");
        }

        let mut rebill_date = invoice.rebill_date;
        if let Some(next_billed_at) = self.data.next_billed_at {
            let next = next_billed_at.date_naive();
            if rebill_date != Some(next) {
                deps.invoices.set_rebill_date(invoice.id, Some(next)).await?;
                tracing::info!(invoice_id = %invoice.id, rebill_date = %next, "Rebill date synced");
                rebill_date = Some(next);
            }
        }

        // Keep access open while Paddle retries the card. If dunning fails the
        // subscription moves to paused or canceled.
        if self.data.status == PaddleSubscriptionStatus::PastDue
            && let Some(rebill) = rebill_date
            && invoice.access_expires_at.is_none_or(|expires| expires < rebill)
        {
            let effective = deps.invoices.extend_access(invoice.id, rebill).await?;
            tracing::info!(
                invoice_id = %invoice.id,
                access_expires_at = %effective,
                "Access extended while in dunning"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for SubscriptionHandler {
    fn name(&self) -> &'static str {
        "subscription"
    }

    fn should_process(&self, _envelope: &WebhookEnvelope) -> bool {
        true
    }

    fn lookup(&self) -> InvoiceLookup {
        InvoiceLookup {
            public_id: invoice_public_id(self.data.custom_data.as_ref()),
            subscription_id: Some(self.data.id.clone()),
            receipt_id: self.data.transaction_id.clone(),
        }
    }

    fn retry_when_unresolved(&self) -> bool {
        true
    }

    async fn amount(
        &self,
        _deps: &ReconcileDeps,
        _invoice: &Invoice,
    ) -> AppResult<Option<Decimal>> {
        Ok(None)
    }

    async fn process_validated(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        match envelope.event_type {
            EventType::SubscriptionUpdated => self.apply_update(deps, invoice).await,
            EventType::SubscriptionCancelled => {
                if invoice.status != InvoiceStatus::Cancelled {
                    tracing::info!(invoice_id = %invoice.id, "Subscription cancelled in Paddle");
                }
                deps.invoices.set_cancelled(invoice.id).await
            }
            _ => Ok(()),
        }
    }
}
