use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Driver;

#[derive(Debug, Clone)]
pub struct DriverRepository {
    pool: PgPool,
}

impl DriverRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        network_id: &Uuid,
        partner_company_id: &Uuid,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Driver, AppError> {
        let driver = sqlx::query_as::<_, Driver>(
            r#"
            INSERT INTO drivers (id, network_id, partner_company_id, name, phone, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, now())
            RETURNING id, network_id, partner_company_id, name, phone, phone_verified_at, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(network_id)
        .bind(partner_company_id)
        .bind(name)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;

        Ok(driver)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<Driver>, AppError> {
        let driver = sqlx::query_as::<_, Driver>(
            r#"
            SELECT id, network_id, partner_company_id, name, phone, phone_verified_at, is_active, created_at
            FROM drivers
            WHERE id = $1 AND network_id = $2
            "#,
        )
        .bind(id)
        .bind(network_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch driver: {}", e)))?;

        Ok(driver)
    }

    /// Lists drivers, optionally restricted to one partner company.
    pub async fn list(
        &self,
        network_id: &Uuid,
        partner_company_id: Option<&Uuid>,
    ) -> Result<Vec<Driver>, AppError> {
        let drivers = sqlx::query_as::<_, Driver>(
            r#"
            SELECT id, network_id, partner_company_id, name, phone, phone_verified_at, is_active, created_at
            FROM drivers
            WHERE network_id = $1
              AND ($2::uuid IS NULL OR partner_company_id = $2)
            ORDER BY name
            "#,
        )
        .bind(network_id)
        .bind(partner_company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list drivers: {}", e)))?;

        Ok(drivers)
    }

    /// Stamps the network's drivers with this phone number as verified. Returns the number of drivers updated.
    pub async fn mark_phone_verified(&self, network_id: &Uuid, phone: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE drivers
            SET phone_verified_at = now()
            WHERE network_id = $1 AND phone = $2 AND phone_verified_at IS NULL
            "#,
        )
        .bind(network_id)
        .bind(phone)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark phone verified: {}", e)))?;

        Ok(result.rows_affected())
    }
}
