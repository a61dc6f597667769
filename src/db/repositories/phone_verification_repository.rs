use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PhoneVerification {
    pub id: Uuid,
    pub phone: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PhoneVerificationRepository {
    pool: PgPool,
}

impl PhoneVerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        phone: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PhoneVerification, AppError> {
        let verification = sqlx::query_as::<_, PhoneVerification>(
            r#"
            INSERT INTO phone_verifications (id, phone, code_hash, expires_at, attempts, created_at)
            VALUES ($1, $2, $3, $4, 0, now())
            RETURNING id, phone, code_hash, expires_at, attempts, verified_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to store phone verification: {}", e)))?;

        Ok(verification)
    }

    /// Latest unverified code sent to this phone.
    pub async fn latest_pending(&self, phone: &str) -> Result<Option<PhoneVerification>, AppError> {
        let verification = sqlx::query_as::<_, PhoneVerification>(
            r#"
            SELECT id, phone, code_hash, expires_at, attempts, verified_at, created_at
            FROM phone_verifications
            WHERE phone = $1 AND verified_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch phone verification: {}", e)))?;

        Ok(verification)
    }

    /// Counts one attempt against the code if it is unexpired and still under `max_attempts`.
    /// Returns the new attempt count, or `None` when no attempt may be made.
    pub async fn claim_attempt(&self, id: &Uuid, max_attempts: i32) -> Result<Option<i32>, AppError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE phone_verifications
            SET attempts = attempts + 1
            WHERE id = $1 AND attempts < $2 AND expires_at > now() AND verified_at IS NULL
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to record verification attempt: {}", e)))?;

        Ok(attempts)
    }

    /// Returns false when the code was already consumed by another request.
    pub async fn mark_verified(&self, id: &Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE phone_verifications SET verified_at = now() WHERE id = $1 AND verified_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark phone verified: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }
}
