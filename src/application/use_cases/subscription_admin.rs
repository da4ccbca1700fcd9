use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        ledger::{InvoiceRepo, PaymentRepo},
        paddle::{PaddleApi, RefundItem, RefundKind, RefundRequest},
    },
    domain::entities::{
        invoice::Invoice,
        money::{Money, round_to_currency},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub adjustment_id: String,
    pub status: String,
    pub kind: RefundKind,
    /// Amount in invoice currency.
    pub amount: String,
}

pub struct SubscriptionAdminUseCases {
    invoices: Arc<dyn InvoiceRepo>,
    payments: Arc<dyn PaymentRepo>,
    paddle: Arc<dyn PaddleApi>,
}

impl SubscriptionAdminUseCases {
    pub fn new(
        invoices: Arc<dyn InvoiceRepo>,
        payments: Arc<dyn PaymentRepo>,
        paddle: Arc<dyn PaddleApi>,
    ) -> Self {
        Self {
            invoices,
            payments,
            paddle,
        }
    }

    async fn load(&self, public_id: &str) -> AppResult<Invoice> {
        self.invoices
            .find_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Cancel the Paddle subscription immediately and mark the invoice cancelled.
    pub async fn cancel_invoice(&self, public_id: &str) -> AppResult<()> {
        let invoice = self.load(public_id).await?;
        let subscription_id = invoice.subscription_id().ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Invoice {} has no Paddle subscription",
                invoice.public_id
            ))
        })?;

        self.paddle
            .cancel_subscription(Some(invoice.id), subscription_id)
            .await?;
        self.invoices.set_cancelled(invoice.id).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            subscription_id = %subscription_id,
            "Subscription cancelled by operator"
        );
        Ok(())
    }

    /// Ask Paddle to refund a recorded payment. `amount` is in invoice
    /// currency; `None` refunds the whole payment.
    ///
    /// Nothing is written to the ledger here; the refund is recorded when
    /// Paddle reports the adjustment.
    pub async fn request_refund(
        &self,
        public_id: &str,
        receipt_id: &str,
        amount: Option<Decimal>,
    ) -> AppResult<RefundReceipt> {
        let invoice = self.load(public_id).await?;
        let payment = self
            .payments
            .find_payment(invoice.id, receipt_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let requested = amount.unwrap_or(payment.amount);
        if requested <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "Refund amount must be positive".to_string(),
            ));
        }
        let capped = requested.min(payment.amount);
        let kind = if capped == payment.amount {
            RefundKind::Full
        } else {
            RefundKind::Partial
        };

        let billed = &invoice.extension.billed_line_items;
        let items = match kind {
            RefundKind::Full => billed
                .iter()
                .map(|item_id| RefundItem {
                    item_id: item_id.clone(),
                    kind: RefundKind::Full,
                    amount: None,
                })
                .collect::<Vec<_>>(),
            RefundKind::Partial => billed
                .first()
                .map(|item_id| RefundItem {
                    item_id: item_id.clone(),
                    kind: RefundKind::Partial,
                    amount: Some(paddle_amount(&invoice, capped)),
                })
                .into_iter()
                .collect(),
        };
        if items.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Invoice {} has no billed line items to refund",
                invoice.public_id
            )));
        }

        let request = RefundRequest {
            action: "refund",
            transaction_id: payment.receipt_id.clone(),
            reason: format!(
                "Refund requested by operator (invoice #{}, payment {})",
                invoice.public_id, payment.receipt_id
            ),
            items,
        };
        let created = self.paddle.create_refund(Some(invoice.id), &request).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            receipt_id = %payment.receipt_id,
            adjustment_id = %created.id,
            amount = %capped,
            "Refund requested"
        );

        Ok(RefundReceipt {
            adjustment_id: created.id,
            status: created.status,
            kind,
            amount: round_to_currency(capped, &invoice.currency).to_string(),
        })
    }
}

/// Convert an invoice-currency amount back to the currency Paddle charged in.
fn paddle_amount(invoice: &Invoice, amount: Decimal) -> String {
    match &invoice.extension.exchange_rate {
        Some(rate) if rate.rate > Decimal::ZERO => {
            Money::new(amount * rate.rate, &rate.currency).to_minor_units()
        }
        _ => Money::new(amount, &invoice.currency).to_minor_units(),
    }
}
