use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EntryMode, WashEvent, WashEventFilter, WashEventTransition};

const WASH_EVENT_COLUMNS: &str = r#"
    id, network_id, location_id, service_package_id, entry_mode, status,
    driver_id, partner_company_id, tractor_plate, trailer_plate,
    manual_driver_name, manual_company_name, price, currency, rejection_reason,
    invoice_id, created_by_user_id, created_at, authorized_at, started_at,
    completed_at, rejected_at, locked_at, updated_at
"#;

/// Validated, priced wash event ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewWashEvent {
    pub network_id: Uuid,
    pub location_id: Uuid,
    pub service_package_id: Uuid,
    pub entry_mode: EntryMode,
    pub driver_id: Option<Uuid>,
    pub partner_company_id: Option<Uuid>,
    pub tractor_plate: Option<String>,
    pub trailer_plate: Option<String>,
    pub manual_driver_name: Option<String>,
    pub manual_company_name: Option<String>,
    pub price: BigDecimal,
    pub currency: String,
    pub created_by_user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct WashEventRepository {
    pool: PgPool,
}

impl WashEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, event: &NewWashEvent) -> Result<WashEvent, AppError> {
        let sql = format!(
            r#"
            INSERT INTO wash_events
                (id, network_id, location_id, service_package_id, entry_mode, status,
                 driver_id, partner_company_id, tractor_plate, trailer_plate,
                 manual_driver_name, manual_company_name, price, currency,
                 created_by_user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'CREATED', $6, $7, $8, $9, $10, $11, $12, $13, $14, now(), now())
            RETURNING {}
            "#,
            WASH_EVENT_COLUMNS
        );

        let created = sqlx::query_as::<_, WashEvent>(&sql)
            .bind(Uuid::new_v4())
            .bind(event.network_id)
            .bind(event.location_id)
            .bind(event.service_package_id)
            .bind(event.entry_mode.as_str())
            .bind(event.driver_id)
            .bind(event.partner_company_id)
            .bind(&event.tractor_plate)
            .bind(&event.trailer_plate)
            .bind(&event.manual_driver_name)
            .bind(&event.manual_company_name)
            .bind(&event.price)
            .bind(&event.currency)
            .bind(event.created_by_user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create wash event: {}", e)))?;

        Ok(created)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<WashEvent>, AppError> {
        let sql = format!(
            "SELECT {} FROM wash_events WHERE id = $1 AND network_id = $2",
            WASH_EVENT_COLUMNS
        );
        let event = sqlx::query_as::<_, WashEvent>(&sql)
            .bind(id)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch wash event: {}", e)))?;

        Ok(event)
    }

    /// Returns one page of events plus the total matching count.
    pub async fn list(
        &self,
        network_id: &Uuid,
        filter: &WashEventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WashEvent>, i64), AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM wash_events");
        push_filters(&mut count_query, network_id, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count wash events: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM wash_events", WASH_EVENT_COLUMNS));
        push_filters(&mut query, network_id, filter);
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let items = query
            .build_query_as::<WashEvent>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list wash events: {}", e)))?;

        Ok((items, total))
    }

    /// Guarded status update. Returns `None` when the event is missing or not in an allowed source state.
    pub async fn transition(
        &self,
        network_id: &Uuid,
        id: &Uuid,
        transition: WashEventTransition,
        reason: Option<&str>,
    ) -> Result<Option<WashEvent>, AppError> {
        let allowed_from: Vec<String> = transition
            .allowed_from()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let sql = format!(
            r#"
            UPDATE wash_events
            SET status = $1,
                {} = now(),
                rejection_reason = COALESCE($2, rejection_reason),
                updated_at = now()
            WHERE id = $3 AND network_id = $4 AND status = ANY($5)
            RETURNING {}
            "#,
            transition.timestamp_column(),
            WASH_EVENT_COLUMNS
        );

        let updated = sqlx::query_as::<_, WashEvent>(&sql)
            .bind(transition.target().as_str())
            .bind(reason)
            .bind(id)
            .bind(network_id)
            .bind(&allowed_from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to transition wash event: {}", e)))?;

        Ok(updated)
    }

    /// Partner companies with completed, uninvoiced events in `[start, end)`.
    pub async fn partners_with_billable(
        &self,
        network_id: &Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let partners = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT partner_company_id
            FROM wash_events
            WHERE network_id = $1
              AND status = 'COMPLETED'
              AND invoice_id IS NULL
              AND partner_company_id IS NOT NULL
              AND completed_at >= $2 AND completed_at < $3
            ORDER BY partner_company_id
            "#,
        )
        .bind(network_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find billable partners: {}", e)))?;

        Ok(partners)
    }

    /// Locks the billable events of one partner for the duration of the transaction.
    pub async fn find_billable_with_executor(
        &self,
        network_id: &Uuid,
        partner_company_id: &Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<Vec<WashEvent>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM wash_events
            WHERE network_id = $1
              AND partner_company_id = $2
              AND status = 'COMPLETED'
              AND invoice_id IS NULL
              AND completed_at >= $3 AND completed_at < $4
            ORDER BY completed_at
            FOR UPDATE
            "#,
            WASH_EVENT_COLUMNS
        );

        let events = sqlx::query_as::<_, WashEvent>(&sql)
            .bind(network_id)
            .bind(partner_company_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_all(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to load billable wash events: {}", e)))?;

        Ok(events)
    }

    pub async fn assign_invoice_with_executor(
        &self,
        event_ids: &[Uuid],
        invoice_id: &Uuid,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE wash_events
            SET invoice_id = $1, updated_at = now()
            WHERE id = ANY($2) AND invoice_id IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(event_ids)
        .execute(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to assign invoice to wash events: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn release_invoice_with_executor(
        &self,
        invoice_id: &Uuid,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE wash_events SET invoice_id = NULL, updated_at = now() WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .execute(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to release wash events: {}", e)))?;

        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, network_id: &Uuid, filter: &WashEventFilter) {
    query.push(" WHERE network_id = ");
    query.push_bind(*network_id);

    if let Some(status) = filter.status {
        query.push(" AND status = ");
        query.push_bind(status.as_str());
    }
    if let Some(location_id) = filter.location_id {
        query.push(" AND location_id = ");
        query.push_bind(location_id);
    }
    if let Some(partner_company_id) = filter.partner_company_id {
        query.push(" AND partner_company_id = ");
        query.push_bind(partner_company_id);
    }
    if let Some(driver_id) = filter.driver_id {
        query.push(" AND driver_id = ");
        query.push_bind(driver_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at < ");
        query.push_bind(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WashEventStatus;

    #[test]
    fn test_filters_are_bound_not_interpolated() {
        let filter = WashEventFilter {
            status: Some(WashEventStatus::Completed),
            location_id: Some(Uuid::new_v4()),
            driver_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM wash_events");
        push_filters(&mut query, &Uuid::new_v4(), &filter);

        let sql = query.sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM wash_events WHERE network_id = $1 AND status = $2 AND location_id = $3 AND driver_id = $4"
        );
    }

    #[test]
    fn test_empty_filter_only_scopes_by_network() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM wash_events");
        push_filters(&mut query, &Uuid::new_v4(), &WashEventFilter::default());
        assert_eq!(query.sql(), "SELECT COUNT(*) FROM wash_events WHERE network_id = $1");
    }
}
