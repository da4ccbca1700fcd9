use crate::{
    app_error::AppResult, application::ports::ledger::InvoiceRepo,
    domain::entities::invoice::Invoice,
};

/// Correlation values an event carries, tried in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceLookup {
    /// Invoice public id from custom data.
    pub public_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Transaction id of a recorded payment.
    pub receipt_id: Option<String>,
}

/// Resolve an event to one invoice. First hit wins; a miss falls through to
/// the next strategy.
pub async fn resolve_invoice(
    invoices: &dyn InvoiceRepo,
    lookup: &InvoiceLookup,
) -> AppResult<Option<Invoice>> {
    if let Some(public_id) = non_empty(&lookup.public_id)
        && let Some(invoice) = invoices.find_by_public_id(public_id).await?
    {
        return Ok(Some(invoice));
    }

    if let Some(subscription_id) = non_empty(&lookup.subscription_id)
        && let Some(invoice) = invoices.find_by_subscription_id(subscription_id).await?
    {
        return Ok(Some(invoice));
    }

    if let Some(receipt_id) = non_empty(&lookup.receipt_id)
        && let Some(invoice) = invoices.find_by_receipt_id(receipt_id).await?
    {
        return Ok(Some(invoice));
    }

    Ok(None)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
