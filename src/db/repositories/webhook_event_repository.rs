use sqlx::PgPool;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    pool: PgPool,
}

impl WebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records a webhook event id. Returns `false` if it was already processed.
    pub async fn record_if_new(&self, event_id: &str, event_type: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES ($1, $2, now())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to record webhook event: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    /// Allows an event to be retried after processing failed.
    pub async fn forget(&self, event_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to release webhook event: {}", e)))?;

        Ok(())
    }
}
