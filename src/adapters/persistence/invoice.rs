use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    Row,
    postgres::{PgQueryResult, PgRow},
};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::ports::ledger::InvoiceRepo,
    domain::entities::{
        billing_period::BillingPeriod,
        invoice::{ExchangeRate, Invoice, InvoiceExtension, InvoiceItem, InvoiceStatus},
    },
};

pub(crate) const INVOICE_COLS: &str = r#"
    id, public_id, user_id, currency, status,
    first_total, second_total, first_period, second_period,
    rebill_times, rebill_date, access_expires_at, payments_count, extension
"#;

fn parse_period(raw: &str, column: &str, entity_id: Uuid) -> AppResult<BillingPeriod> {
    raw.parse().map_err(|e: String| {
        tracing::error!(column, %entity_id, raw, error = %e, "Stored billing period is invalid");
        AppError::Database(format!("invalid {} for {}", column, entity_id))
    })
}

fn parse_optional_period(
    raw: Option<String>,
    column: &str,
    entity_id: Uuid,
) -> AppResult<Option<BillingPeriod>> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_period(&s, column, entity_id))
        .transpose()
}

pub(crate) fn row_to_invoice(row: &PgRow) -> AppResult<Invoice> {
    let id: Uuid = row.get("id");
    let extension: serde_json::Value = row.get("extension");
    Ok(Invoice {
        id,
        public_id: row.get("public_id"),
        user_id: row.get("user_id"),
        currency: row.get("currency"),
        status: row.get("status"),
        first_total: row.get("first_total"),
        second_total: row.get("second_total"),
        first_period: parse_period(row.get("first_period"), "first_period", id)?,
        second_period: parse_optional_period(row.get("second_period"), "second_period", id)?,
        rebill_times: row.get("rebill_times"),
        rebill_date: row.get("rebill_date"),
        access_expires_at: row.get("access_expires_at"),
        payments_count: row.get("payments_count"),
        extension: parse_json_with_fallback::<InvoiceExtension>(
            &extension,
            "extension",
            "invoice",
            &id.to_string(),
        ),
    })
}

fn row_to_item(row: &PgRow) -> AppResult<InvoiceItem> {
    let id: Uuid = row.get("id");
    Ok(InvoiceItem {
        id,
        invoice_id: row.get("invoice_id"),
        title: row.get("title"),
        description: row.get("description"),
        qty: row.get("qty"),
        currency: row.get("currency"),
        first_total: row.get("first_total"),
        second_total: row.get("second_total"),
        first_period: parse_period(row.get("first_period"), "first_period", id)?,
        second_period: parse_optional_period(row.get("second_period"), "second_period", id)?,
        rebill_times: row.get("rebill_times"),
    })
}

impl PostgresPersistence {
    async fn find_invoice_where(&self, condition: &str, value: &str) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE {} LIMIT 1",
            INVOICE_COLS, condition
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }
}

pub(crate) fn ensure_updated(result: PgQueryResult) -> AppResult<()> {
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn find_by_public_id(&self, public_id: &str) -> AppResult<Option<Invoice>> {
        self.find_invoice_where("public_id = $1", public_id).await
    }

    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<Invoice>> {
        self.find_invoice_where("extension->>'subscription_id' = $1", subscription_id)
            .await
    }

    async fn find_by_receipt_id(&self, receipt_id: &str) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM invoices
            WHERE id = (SELECT invoice_id FROM payments WHERE receipt_id = $1 LIMIT 1)
            "#,
            INVOICE_COLS
        ))
        .bind(receipt_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Invoice> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLS))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row_to_invoice(&row)
    }

    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, invoice_id, title, description, qty, currency,
                   first_total, second_total, first_period, second_period, rebill_times
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn set_status(&self, invoice_id: Uuid, status: InvoiceStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE invoices SET status = $2 WHERE id = $1")
            .bind(invoice_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        ensure_updated(result)
    }

    async fn set_cancelled(&self, invoice_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'cancelled', rebill_date = NULL WHERE id = $1",
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result)
    }

    async fn set_rebill_date(
        &self,
        invoice_id: Uuid,
        rebill_date: Option<NaiveDate>,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE invoices SET rebill_date = $2 WHERE id = $1")
            .bind(invoice_id)
            .bind(rebill_date)
            .execute(&self.pool)
            .await?;
        ensure_updated(result)
    }

    async fn extend_access(&self, invoice_id: Uuid, until: NaiveDate) -> AppResult<NaiveDate> {
        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET access_expires_at = GREATEST(COALESCE(access_expires_at, $2), $2)
            WHERE id = $1
            RETURNING access_expires_at
            "#,
        )
        .bind(invoice_id)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<Option<NaiveDate>, _>("access_expires_at").unwrap_or(until))
    }

    async fn set_subscription_id(&self, invoice_id: Uuid, subscription_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET extension = jsonb_set(extension, '{subscription_id}', to_jsonb($2::text))
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result)
    }

    async fn set_billed_line_items(
        &self,
        invoice_id: Uuid,
        line_items: &[String],
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET extension = jsonb_set(extension, '{billed_line_items}', $2)
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(serde_json::json!(line_items))
        .execute(&self.pool)
        .await?;
        ensure_updated(result)
    }

    async fn set_exchange_rate_if_absent(
        &self,
        invoice_id: Uuid,
        rate: ExchangeRate,
    ) -> AppResult<ExchangeRate> {
        let rate_json = serde_json::to_value(&rate)
            .map_err(|e| AppError::Internal(format!("Failed to encode exchange rate: {}", e)))?;

        // The conditional update is atomic per row; whichever writer lands
        // first wins and everyone reads that value back.
        sqlx::query(
            r#"
            UPDATE invoices
            SET extension = jsonb_set(extension, '{exchange_rate}', $2)
            WHERE id = $1
              AND COALESCE(extension->'exchange_rate', 'null'::jsonb) = 'null'::jsonb
            "#,
        )
        .bind(invoice_id)
        .bind(&rate_json)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT extension->'exchange_rate' AS rate FROM invoices WHERE id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;
        decode_stored_rate(invoice_id, row.get("rate"))
    }
}

/// The stored rate is the only one payments may use, so an unreadable value
/// is an error rather than a reason to fall back to a fresh rate.
fn decode_stored_rate(
    invoice_id: Uuid,
    stored: Option<serde_json::Value>,
) -> AppResult<ExchangeRate> {
    let value = stored.filter(|v| !v.is_null()).ok_or_else(|| {
        tracing::error!(%invoice_id, "Exchange rate missing after conditional update");
        AppError::Internal(format!("exchange rate missing for {}", invoice_id))
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        tracing::error!(%invoice_id, raw = %value, error = %e, "Stored exchange rate is corrupt");
        AppError::Internal(format!("corrupt exchange rate for {}", invoice_id))
    })
}
