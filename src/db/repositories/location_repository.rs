use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Location;

#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: PgPool,
}

impl LocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        network_id: &Uuid,
        name: &str,
        code: &str,
        city: Option<&str>,
    ) -> Result<Location, AppError> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (id, network_id, name, code, city, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, now())
            RETURNING id, network_id, name, code, city, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(network_id)
        .bind(name)
        .bind(code)
        .bind(city)
        .fetch_one(&self.pool)
        .await?;

        Ok(location)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<Location>, AppError> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, network_id, name, code, city, is_active, created_at
            FROM locations
            WHERE id = $1 AND network_id = $2
            "#,
        )
        .bind(id)
        .bind(network_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch location: {}", e)))?;

        Ok(location)
    }

    pub async fn list(&self, network_id: &Uuid) -> Result<Vec<Location>, AppError> {
        let locations = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, network_id, name, code, city, is_active, created_at
            FROM locations
            WHERE network_id = $1
            ORDER BY name
            "#,
        )
        .bind(network_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list locations: {}", e)))?;

        Ok(locations)
    }
}
