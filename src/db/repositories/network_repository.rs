use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Network, NetworkSubscription, SubscriptionStatus};

const NETWORK_COLUMNS: &str = r#"
    id, name, slug, subscription_status, trial_ends_at, subscription_end_at,
    invoice_provider, billing_currency, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct NetworkRepository {
    pool: PgPool,
}

impl NetworkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a network in TRIAL until `trial_ends_at`.
    pub async fn create(
        &self,
        name: &str,
        slug: &str,
        billing_currency: &str,
        invoice_provider: Option<&str>,
        trial_ends_at: DateTime<Utc>,
    ) -> Result<Network, AppError> {
        let sql = format!(
            r#"
            INSERT INTO networks
                (id, name, slug, subscription_status, trial_ends_at, invoice_provider,
                 billing_currency, created_at, updated_at)
            VALUES ($1, $2, $3, 'TRIAL', $4, $5, $6, now(), now())
            RETURNING {}
            "#,
            NETWORK_COLUMNS
        );

        let network = sqlx::query_as::<_, Network>(&sql)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(slug)
            .bind(trial_ends_at)
            .bind(invoice_provider)
            .bind(billing_currency)
            .fetch_one(&self.pool)
            .await?;

        Ok(network)
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<Network>, AppError> {
        let sql = format!("SELECT {} FROM networks WHERE id = $1", NETWORK_COLUMNS);
        let network = sqlx::query_as::<_, Network>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch network: {}", e)))?;

        Ok(network)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Network>, AppError> {
        let sql = format!(
            "SELECT {} FROM networks ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            NETWORK_COLUMNS
        );
        let networks = sqlx::query_as::<_, Network>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list networks: {}", e)))?;

        Ok(networks)
    }

    pub async fn get_subscription(&self, id: &Uuid) -> Result<Option<NetworkSubscription>, AppError> {
        let subscription = sqlx::query_as::<_, NetworkSubscription>(
            r#"
            SELECT id, subscription_status, trial_ends_at, subscription_end_at
            FROM networks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch network subscription: {}", e)))?;

        Ok(subscription)
    }

    pub async fn update_subscription(
        &self,
        id: &Uuid,
        status: SubscriptionStatus,
        trial_ends_at: Option<DateTime<Utc>>,
        subscription_end_at: Option<DateTime<Utc>>,
    ) -> Result<Network, AppError> {
        let sql = format!(
            r#"
            UPDATE networks
            SET subscription_status = $2,
                trial_ends_at = $3,
                subscription_end_at = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            NETWORK_COLUMNS
        );

        sqlx::query_as::<_, Network>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(trial_ends_at)
            .bind(subscription_end_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update subscription: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Network {} not found", id)))
    }
}
