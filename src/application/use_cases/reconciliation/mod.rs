//! Webhook reconciliation: classify a verified notification, resolve it to a
//! ledger invoice and apply exactly one state transition.

pub mod adjustment;
pub mod exchange_rate;
pub mod idempotency;
pub mod resolver;
pub mod subscription;
pub mod transaction;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        ledger::{InvoiceLogRepo, InvoiceRepo, PaymentRepo, UserRepo, log_entry},
        paddle::PaddleApi,
    },
    domain::entities::{
        event::{EventType, WebhookEnvelope},
        invoice::Invoice,
        payment::NewUserNote,
    },
};

use adjustment::AdjustmentHandler;
use idempotency::{Applied, apply_once};
use resolver::{InvoiceLookup, resolve_invoice};
use subscription::SubscriptionHandler;
use transaction::TransactionHandler;

/// Operator switches for chargeback handling and audit logging.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    pub lock_on_chargeback: bool,
    pub lock_on_chargeback_warning: bool,
    pub unlock_on_chargeback_reverse: bool,
    pub log_postbacks: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            lock_on_chargeback: true,
            lock_on_chargeback_warning: false,
            unlock_on_chargeback_reverse: true,
            log_postbacks: true,
        }
    }
}

/// Ports a handler may touch.
#[derive(Clone)]
pub struct ReconcileDeps {
    pub invoices: Arc<dyn InvoiceRepo>,
    pub payments: Arc<dyn PaymentRepo>,
    pub users: Arc<dyn UserRepo>,
    pub invoice_log: Arc<dyn InvoiceLogRepo>,
    pub paddle: Arc<dyn PaddleApi>,
    pub policy: ReconcilePolicy,
}

impl ReconcileDeps {
    /// Add an account note once per event.
    pub async fn note_once(
        &self,
        envelope: &WebhookEnvelope,
        user_id: Uuid,
        content: String,
    ) -> AppResult<Applied<()>> {
        tracing::info!(
            event_id = %envelope.event_id,
            %user_id,
            note = %content,
            "Adding user note"
        );
        apply_once(
            "user_note",
            self.users.add_note(
                user_id,
                NewUserNote {
                    event_id: envelope.event_id.clone(),
                    content,
                },
            ),
        )
        .await
    }
}

/// One kind of webhook notification.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the event moves ledger state at all.
    fn should_process(&self, envelope: &WebhookEnvelope) -> bool;

    fn lookup(&self) -> InvoiceLookup;

    /// Whether Paddle should redeliver when no invoice matches yet.
    fn retry_when_unresolved(&self) -> bool;

    async fn resolve_invoice(&self, deps: &ReconcileDeps) -> AppResult<Option<Invoice>> {
        resolve_invoice(deps.invoices.as_ref(), &self.lookup()).await
    }

    /// Amount in invoice currency, `None` for the ledger default.
    async fn amount(&self, deps: &ReconcileDeps, invoice: &Invoice) -> AppResult<Option<Decimal>>;

    async fn process_validated(
        &self,
        deps: &ReconcileDeps,
        envelope: &WebhookEnvelope,
        invoice: &Invoice,
    ) -> AppResult<()>;
}

pub enum ReconciliationHandler {
    Transaction(TransactionHandler),
    Subscription(SubscriptionHandler),
    Adjustment(AdjustmentHandler),
}

impl ReconciliationHandler {
    pub fn as_handler(&self) -> &dyn WebhookHandler {
        match self {
            ReconciliationHandler::Transaction(h) => h,
            ReconciliationHandler::Subscription(h) => h,
            ReconciliationHandler::Adjustment(h) => h,
        }
    }
}

/// Pick the handler for an event. Unknown types yield `None`; a known type
/// whose payload does not decode is `AppError::MalformedEvent`.
pub fn classify(envelope: &WebhookEnvelope) -> AppResult<Option<ReconciliationHandler>> {
    let handler = match &envelope.event_type {
        EventType::TransactionCompleted => {
            ReconciliationHandler::Transaction(TransactionHandler::new(envelope.payload()?))
        }
        EventType::SubscriptionUpdated | EventType::SubscriptionCancelled => {
            ReconciliationHandler::Subscription(SubscriptionHandler::new(envelope.payload()?))
        }
        EventType::AdjustmentCreated | EventType::AdjustmentUpdated => {
            ReconciliationHandler::Adjustment(AdjustmentHandler::new(envelope.payload()?))
        }
        EventType::Other(_) => return Ok(None),
    };
    Ok(Some(handler))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored { reason: &'static str },
    Processed { invoice_id: Uuid },
    InvoiceNotFound { retryable: bool },
}

#[derive(Clone)]
pub struct ReconciliationUseCases {
    deps: ReconcileDeps,
}

impl ReconciliationUseCases {
    pub fn new(deps: ReconcileDeps) -> Self {
        Self { deps }
    }

    pub async fn process(&self, envelope: &WebhookEnvelope) -> AppResult<WebhookOutcome> {
        let Some(handler) = classify(envelope)? else {
            tracing::info!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                "Unhandled event type, acknowledging"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: "unhandled event type",
            });
        };
        let handler = handler.as_handler();

        if !handler.should_process(envelope) {
            tracing::info!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                handler = handler.name(),
                "Event does not affect the ledger, skipping"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: "not a billing event",
            });
        }

        let Some(invoice) = handler.resolve_invoice(&self.deps).await? else {
            let retryable = handler.retry_when_unresolved();
            if retryable {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    lookup = ?handler.lookup(),
                    retryable,
                    "No invoice for event yet, asking Paddle to retry"
                );
            } else {
                tracing::error!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    lookup = ?handler.lookup(),
                    retryable,
                    "No invoice for event, dropping"
                );
            }
            return Ok(WebhookOutcome::InvoiceNotFound { retryable });
        };

        if self.deps.policy.log_postbacks {
            self.deps
                .invoice_log
                .append(log_entry(
                    Some(invoice.id),
                    format!("POSTBACK [{}]", envelope.event_type),
                    envelope.raw_body.clone(),
                    String::new(),
                    envelope.received_at,
                ))
                .await?;
        }

        handler
            .process_validated(&self.deps, envelope, &invoice)
            .await?;

        tracing::info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            invoice_id = %invoice.id,
            handler = handler.name(),
            "Webhook reconciled"
        );

        Ok(WebhookOutcome::Processed {
            invoice_id: invoice.id,
        })
    }
}

/// Whether a reconciliation error should make Paddle redeliver.
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        // Transient errors - retry may succeed
        AppError::Database(_) => true,
        AppError::Internal(_) => true,
        AppError::OutOfOrder(_) => true,
        AppError::Remote { .. } => true,

        // Won't change with retry
        AppError::Duplicate => false,
        AppError::MalformedEvent(_) => false,
        AppError::InvalidSignature => false,
        AppError::Unauthorized => false,
        AppError::InvalidInput(_) => false,
        AppError::NotFound => false,
    }
}
