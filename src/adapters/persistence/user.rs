use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, invoice::ensure_updated, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::ports::ledger::UserRepo,
    domain::entities::{
        payment::NewUserNote,
        user::{User, UserExtension, UserProfileBackfill},
    },
};

fn row_to_user(row: &PgRow) -> User {
    let id: Uuid = row.get("id");
    let extension: serde_json::Value = row.get("extension");
    User {
        id,
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        country: row.get("country"),
        postal_code: row.get("postal_code"),
        tax_id: row.get("tax_id"),
        is_locked: row.get("is_locked"),
        extension: parse_json_with_fallback::<UserExtension>(
            &extension,
            "extension",
            "user",
            &id.to_string(),
        ),
    }
}

#[async_trait]
impl UserRepo for PostgresPersistence {
    async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, country, postal_code, tax_id,
                   is_locked, extension
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_user(&row))
    }

    async fn backfill_profile(
        &self,
        user_id: Uuid,
        profile: &UserProfileBackfill,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, country, postal_code, tax_id,
                   is_locked, extension
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        let mut user = row_to_user(&row);
        profile.apply_to(&mut user);

        sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, country = $4, postal_code = $5, tax_id = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.country)
        .bind(&user.postal_code)
        .bind(&user.tax_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_paddle_refs(&self, user_id: Uuid, refs: &UserExtension) -> AppResult<()> {
        // jsonb_strip_nulls drops the `None` fields so `||` keeps the stored values.
        let patch = serde_json::to_value(refs)
            .map_err(|e| AppError::Internal(format!("Failed to encode Paddle refs: {}", e)))?;
        let result = sqlx::query(
            "UPDATE users SET extension = extension || jsonb_strip_nulls($2) WHERE id = $1",
        )
        .bind(user_id)
        .bind(patch)
        .execute(&self.pool)
        .await?;
        ensure_updated(result)
    }

    async fn set_locked(&self, user_id: Uuid, locked: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET is_locked = $2 WHERE id = $1")
            .bind(user_id)
            .bind(locked)
            .execute(&self.pool)
            .await?;
        ensure_updated(result)
    }

    async fn add_note(&self, user_id: Uuid, note: NewUserNote) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO user_notes (id, user_id, event_id, content) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&note.event_id)
        .bind(&note.content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
