use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ServicePackage;

#[derive(Debug, Clone)]
pub struct ServicePackageRepository {
    pool: PgPool,
}

impl ServicePackageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        network_id: &Uuid,
        name: &str,
        code: &str,
        price: &BigDecimal,
        currency: &str,
    ) -> Result<ServicePackage, AppError> {
        let package = sqlx::query_as::<_, ServicePackage>(
            r#"
            INSERT INTO service_packages (id, network_id, name, code, price, currency, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, now())
            RETURNING id, network_id, name, code, price, currency, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(network_id)
        .bind(name)
        .bind(code)
        .bind(price)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(package)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<ServicePackage>, AppError> {
        let package = sqlx::query_as::<_, ServicePackage>(
            r#"
            SELECT id, network_id, name, code, price, currency, is_active, created_at
            FROM service_packages
            WHERE id = $1 AND network_id = $2
            "#,
        )
        .bind(id)
        .bind(network_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch service package: {}", e)))?;

        Ok(package)
    }

    pub async fn list(&self, network_id: &Uuid) -> Result<Vec<ServicePackage>, AppError> {
        let packages = sqlx::query_as::<_, ServicePackage>(
            r#"
            SELECT id, network_id, name, code, price, currency, is_active, created_at
            FROM service_packages
            WHERE network_id = $1
            ORDER BY name
            "#,
        )
        .bind(network_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list service packages: {}", e)))?;

        Ok(packages)
    }

    /// Location-specific price override, if one is configured.
    pub async fn get_location_price(
        &self,
        location_id: &Uuid,
        service_package_id: &Uuid,
    ) -> Result<Option<(BigDecimal, String)>, AppError> {
        let price = sqlx::query_as::<_, (BigDecimal, String)>(
            r#"
            SELECT price, currency
            FROM location_service_prices
            WHERE location_id = $1 AND service_package_id = $2
            "#,
        )
        .bind(location_id)
        .bind(service_package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch location price: {}", e)))?;

        Ok(price)
    }
}
