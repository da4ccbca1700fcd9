use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence,
        invoice::{INVOICE_COLS, row_to_invoice},
    },
    app_error::{AppError, AppResult},
    application::ports::ledger::PaymentRepo,
    domain::entities::{
        invoice::Invoice,
        payment::{NewChargeback, NewPayment, NewRefund, PaymentRecord},
    },
};

fn row_to_payment(row: &PgRow) -> PaymentRecord {
    PaymentRecord {
        id: row.get("id"),
        invoice_id: row.get("invoice_id"),
        user_id: row.get("user_id"),
        receipt_id: row.get("receipt_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        paid_at: row.get("paid_at"),
    }
}

/// Lock the invoice row for the rest of the transaction.
async fn lock_invoice(tx: &mut Transaction<'_, Postgres>, invoice_id: Uuid) -> AppResult<Invoice> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM invoices WHERE id = $1 FOR UPDATE",
        INVOICE_COLS
    ))
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::NotFound)?;
    row_to_invoice(&row)
}

async fn store_progress(tx: &mut Transaction<'_, Postgres>, invoice: &Invoice) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET payments_count = $2, status = $3, access_expires_at = $4, rebill_date = $5
        WHERE id = $1
        "#,
    )
    .bind(invoice.id)
    .bind(invoice.payments_count)
    .bind(invoice.status)
    .bind(invoice.access_expires_at)
    .bind(invoice.rebill_date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn add_payment(&self, invoice_id: Uuid, payment: NewPayment) -> AppResult<PaymentRecord> {
        let mut tx = self.pool.begin().await?;
        let mut invoice = lock_invoice(&mut tx, invoice_id).await?;

        let amount = payment
            .amount
            .unwrap_or_else(|| invoice.reference_amount());

        // A transaction that granted the free period is never a payment too.
        let granted_access = sqlx::query(
            "SELECT 1 FROM access_periods WHERE invoice_id = $1 AND transaction_id = $2",
        )
        .bind(invoice.id)
        .bind(&payment.receipt_id)
        .fetch_optional(&mut *tx)
        .await?;
        if granted_access.is_some() {
            return Err(AppError::Duplicate);
        }

        // A unique violation here rolls the whole transaction back on drop,
        // so a redelivered event never advances the invoice twice.
        let row = sqlx::query(
            r#"
            INSERT INTO payments (id, invoice_id, user_id, receipt_id, amount, currency, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, invoice_id, user_id, receipt_id, amount, currency, paid_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice.id)
        .bind(invoice.user_id)
        .bind(&payment.receipt_id)
        .bind(amount)
        .bind(&invoice.currency)
        .bind(payment.paid_at)
        .fetch_one(&mut *tx)
        .await?;

        invoice.apply_payment(payment.paid_at.date_naive(), payment.reset_rebill_date);
        store_progress(&mut tx, &invoice).await?;

        tx.commit().await?;
        Ok(row_to_payment(&row))
    }

    async fn add_access_period(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        begins_on: NaiveDate,
    ) -> AppResult<NaiveDate> {
        let mut tx = self.pool.begin().await?;
        let mut invoice = lock_invoice(&mut tx, invoice_id).await?;
        let expires_on = invoice.apply_free_access(begins_on);

        sqlx::query(
            r#"
            INSERT INTO access_periods (id, invoice_id, transaction_id, begins_on, expires_on)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice.id)
        .bind(transaction_id)
        .bind(begins_on)
        .bind(expires_on)
        .execute(&mut *tx)
        .await?;

        store_progress(&mut tx, &invoice).await?;
        tx.commit().await?;
        Ok(expires_on)
    }

    async fn find_payment(
        &self,
        invoice_id: Uuid,
        receipt_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, invoice_id, user_id, receipt_id, amount, currency, paid_at
            FROM payments
            WHERE invoice_id = $1 AND receipt_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(receipt_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_payment))
    }

    async fn add_refund(&self, invoice_id: Uuid, refund: NewRefund) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refunds (id, invoice_id, receipt_id, transaction_id, amount, refunded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(&refund.receipt_id)
        .bind(&refund.transaction_id)
        .bind(refund.amount)
        .bind(refund.refunded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_refund(
        &self,
        invoice_id: Uuid,
        transaction_id: &str,
        receipt_id: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM refunds WHERE invoice_id = $1 AND transaction_id = $2 AND receipt_id = $3",
        )
        .bind(invoice_id)
        .bind(transaction_id)
        .bind(receipt_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn add_chargeback(&self, invoice_id: Uuid, chargeback: NewChargeback) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chargebacks (id, invoice_id, receipt_id, transaction_id, received_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(&chargeback.receipt_id)
        .bind(&chargeback.transaction_id)
        .bind(chargeback.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
