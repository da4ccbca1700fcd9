use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence, app_error::AppResult,
    application::ports::ledger::InvoiceLogRepo, domain::entities::payment::InvoiceLogEntry,
};

#[async_trait]
impl InvoiceLogRepo for PostgresPersistence {
    async fn append(&self, entry: InvoiceLogEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_log (invoice_id, title, request, response, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.invoice_id)
        .bind(&entry.title)
        .bind(&entry.request)
        .bind(&entry.response)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
