use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{
    ReconcileDeps, WebhookHandler,
    exchange_rate::resolve_adjustment_amount,
    idempotency::{Applied, apply_once},
    resolver::InvoiceLookup,
};
use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        event::WebhookEnvelope,
        invoice::Invoice,
        paddle_payload::{AdjustmentAction, AdjustmentData, AdjustmentStatus},
        payment::{NewChargeback, NewRefund},
    },
};

const CHARGEBACK_NOTE: &str =
    "Payment was disputed and a chargeback was received. User account disabled.";
const CHARGEBACK_WARNING_NOTE: &str =
    "Paddle received early warning of an upcoming chargeback. User account disabled.";
const CHARGEBACK_REVERSE_NOTE: &str = "Paddle reversed the chargeback.";

/// `adjustment.created` / `adjustment.updated`: credits, refunds, chargebacks.
pub struct AdjustmentHandler {
    data: AdjustmentData,
}

impl AdjustmentHandler {
    pub fn new(data: AdjustmentData) -> Self {
        Self { data }
    }

    async fn note_credit(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        let verb = if self.data.action == AdjustmentAction::Credit {
            "issued"
        } else {
            "reversed"
        };
        let content = format!(
            "Paddle {} a credit of {} for invoice #{}.",
            verb,
            self.data.total()?,
            invoice.public_id
        );
        deps.note_once(envelope, invoice.user_id, content).await?;
        Ok(())
    }

    /// Refunds are created pending approval and may later be rejected, so they
    /// are recorded straight away and removed again on rejection.
    async fn apply_refund(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        let data = &self.data;

        if data.status == AdjustmentStatus::Rejected {
            let removed = deps
                .payments
                .delete_refund(invoice.id, &data.transaction_id, &data.id)
                .await?;
            tracing::info!(
                invoice_id = %invoice.id,
                adjustment_id = %data.id,
                removed,
                "Rejected refund retracted"
            );
            return Ok(());
        }

        let payment = deps
            .payments
            .find_payment(invoice.id, &data.transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::OutOfOrder(format!(
                    "refund {} for unrecorded transaction {}",
                    data.id, data.transaction_id
                ))
            })?;

        let requested = self.amount(deps, invoice).await?.unwrap_or(Decimal::ZERO);
        let amount = requested.min(payment.amount);
        if amount < requested {
            tracing::warn!(
                invoice_id = %invoice.id,
                adjustment_id = %data.id,
                requested = %requested,
                capped = %amount,
                "Refund exceeds recorded payment, capping"
            );
        }

        if let Applied::Fresh(()) = apply_once(
            "refund",
            deps.payments.add_refund(
                invoice.id,
                NewRefund {
                    receipt_id: data.id.clone(),
                    transaction_id: data.transaction_id.clone(),
                    amount,
                    refunded_at: envelope.occurred_at,
                },
            ),
        )
        .await?
        {
            tracing::info!(
                invoice_id = %invoice.id,
                adjustment_id = %data.id,
                %amount,
                "Refund recorded"
            );
        }
        Ok(())
    }

    async fn apply_chargeback(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        apply_once(
            "chargeback",
            deps.payments.add_chargeback(
                invoice.id,
                NewChargeback {
                    receipt_id: self.data.id.clone(),
                    transaction_id: self.data.transaction_id.clone(),
                    received_at: envelope.occurred_at,
                },
            ),
        )
        .await?;

        if deps.policy.lock_on_chargeback {
            self.lock_user(deps, envelope, invoice, CHARGEBACK_NOTE).await?;
        }
        Ok(())
    }

    async fn lock_user(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
        note: &str,
    ) -> AppResult<()> {
        deps.note_once(envelope, invoice.user_id, note.to_string())
            .await?;
        deps.users.set_locked(invoice.user_id, true).await?;
        tracing::warn!(user_id = %invoice.user_id, invoice_id = %invoice.id, "User account locked");
        Ok(())
    }

    async fn reverse_chargeback(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        let unlock = deps.policy.unlock_on_chargeback_reverse;
        let note = if unlock {
            format!("{} User account unlocked.", CHARGEBACK_REVERSE_NOTE)
        } else {
            CHARGEBACK_REVERSE_NOTE.to_string()
        };
        deps.note_once(envelope, invoice.user_id, note).await?;
        if unlock {
            deps.users.set_locked(invoice.user_id, false).await?;
            tracing::info!(user_id = %invoice.user_id, "User account unlocked");
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for AdjustmentHandler {
    fn name(&self) -> &'static str {
        "adjustment"
    }

    fn should_process(&self, _envelope: &WebhookEnvelope) -> bool {
        self.data.action != AdjustmentAction::Other
    }

    fn lookup(&self) -> InvoiceLookup {
        InvoiceLookup {
            public_id: None,
            subscription_id: self.data.subscription_id.clone(),
            receipt_id: Some(self.data.transaction_id.clone()),
        }
    }

    fn retry_when_unresolved(&self) -> bool {
        true
    }

    async fn amount(&self, _deps: &ReconcileDeps, invoice: &Invoice) -> AppResult<Option<Decimal>> {
        let total = self.data.total()?;
        Ok(Some(resolve_adjustment_amount(invoice, &total)))
    }

    async fn process_validated(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()> {
        match self.data.action {
            AdjustmentAction::Credit | AdjustmentAction::CreditReverse => {
                self.note_credit(deps, envelope, invoice).await
            }
            AdjustmentAction::Refund => self.apply_refund(deps, envelope, invoice).await,
            AdjustmentAction::Chargeback => self.apply_chargeback(deps, envelope, invoice).await,
            AdjustmentAction::ChargebackWarning => {
                if deps.policy.lock_on_chargeback_warning {
                    self.lock_user(deps, envelope, invoice, CHARGEBACK_WARNING_NOTE)
                        .await?;
                }
                Ok(())
            }
            AdjustmentAction::ChargebackReverse => {
                self.reverse_chargeback(deps, envelope, invoice).await
            }
            AdjustmentAction::Other => Ok(()),
        }
    }
}
