use sqlx::PgPool;

use crate::error::AppError;
use crate::models::{ExchangeRate, RateTable};

#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    pool: PgPool,
}

impl ExchangeRateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a fetched rate table, replacing any rates already stored for the same day.
    pub async fn upsert_table(&self, table: &RateTable) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for (currency, huf_per_unit) in &table.rates {
            sqlx::query(
                r#"
                INSERT INTO exchange_rates (currency, rate_date, huf_per_unit, source, fetched_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (currency, rate_date)
                DO UPDATE SET huf_per_unit = EXCLUDED.huf_per_unit,
                              source = EXCLUDED.source,
                              fetched_at = EXCLUDED.fetched_at
                "#,
            )
            .bind(currency)
            .bind(table.rate_date)
            .bind(huf_per_unit)
            .bind(table.source.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to store exchange rate {}: {}", currency, e)))?;
        }

        tx.commit().await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(table.rates.len())
    }

    /// Most recent stored rate for every currency.
    pub async fn latest(&self) -> Result<Vec<ExchangeRate>, AppError> {
        let rates = sqlx::query_as::<_, ExchangeRate>(
            r#"
            SELECT DISTINCT ON (currency) currency, huf_per_unit, source, rate_date, fetched_at
            FROM exchange_rates
            ORDER BY currency, rate_date DESC, fetched_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to load exchange rates: {}", e)))?;

        Ok(rates)
    }
}
