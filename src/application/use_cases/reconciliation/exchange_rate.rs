use rust_decimal::Decimal;

use crate::{
    app_error::AppResult,
    application::ports::ledger::InvoiceRepo,
    domain::entities::{
        invoice::{ExchangeRate, Invoice},
        money::{Money, round_to_currency},
    },
};

/// Convert a charged amount into the invoice currency for a payment.
///
/// `None` means the charge is already in invoice currency and the ledger
/// should use its own total. The first foreign-currency payment fixes the
/// invoice's rate; later ones reuse it.
pub async fn resolve_payment_amount(
    invoices: &dyn InvoiceRepo,
    invoice: &Invoice,
    charged: &Money,
) -> AppResult<Option<Decimal>> {
    if charged.same_currency(&invoice.currency) {
        return Ok(None);
    }

    let rate = match &invoice.extension.exchange_rate {
        Some(stored) => stored.clone(),
        None => {
            let reference = invoice.reference_amount();
            if reference <= Decimal::ZERO {
                tracing::warn!(
                    invoice_id = %invoice.id,
                    currency = %charged.currency,
                    "No reference amount to derive an exchange rate from"
                );
                return Ok(Some(charged.amount));
            }
            let computed = ExchangeRate {
                rate: charged.amount / reference,
                currency: charged.currency.clone(),
            };
            let stored = invoices
                .set_exchange_rate_if_absent(invoice.id, computed)
                .await?;
            tracing::info!(
                invoice_id = %invoice.id,
                rate = %stored.rate,
                currency = %stored.currency,
                "Exchange rate recorded"
            );
            stored
        }
    };

    if rate.rate <= Decimal::ZERO {
        tracing::warn!(
            invoice_id = %invoice.id,
            rate = %rate.rate,
            "Stored exchange rate is unusable"
        );
        return Ok(Some(charged.amount));
    }
    Ok(Some(convert(charged.amount, &rate, &invoice.currency)))
}

/// Convert a refund or other adjustment using the rate fixed by the payment.
/// Never computes a new rate.
pub fn resolve_adjustment_amount(invoice: &Invoice, adjusted: &Money) -> Decimal {
    if adjusted.same_currency(&invoice.currency) {
        return adjusted.amount;
    }

    match &invoice.extension.exchange_rate {
        Some(rate) if rate.rate > Decimal::ZERO => {
            convert(adjusted.amount, rate, &invoice.currency)
        }
        _ => {
            tracing::warn!(
                invoice_id = %invoice.id,
                currency = %adjusted.currency,
                "Foreign-currency adjustment without a stored exchange rate, using raw amount"
            );
            adjusted.amount
        }
    }
}

fn convert(amount: Decimal, rate: &ExchangeRate, invoice_currency: &str) -> Decimal {
    round_to_currency(amount / rate.rate, invoice_currency)
}
