use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Invoice, InvoiceFilter, InvoiceLineItem, UsageSnapshot};

const INVOICE_COLUMNS: &str = r#"
    id, network_id, partner_company_id, period_start, period_end, currency,
    net_total, vat_total, gross_total, line_items, usage_snapshot, status,
    provider, external_id, invoice_number, issued_at, paid_at, cancelled_at,
    created_at, updated_at
"#;

/// Computed invoice content persisted as a draft.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub network_id: Uuid,
    pub partner_company_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency: String,
    pub net_total: BigDecimal,
    pub vat_total: BigDecimal,
    pub gross_total: BigDecimal,
    pub line_items: Vec<InvoiceLineItem>,
    pub usage_snapshot: UsageSnapshot,
}

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_with_executor(
        &self,
        id: &Uuid,
        invoice: &NewInvoice,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<Invoice, AppError> {
        let sql = format!(
            r#"
            INSERT INTO invoices
                (id, network_id, partner_company_id, period_start, period_end, currency,
                 net_total, vat_total, gross_total, line_items, usage_snapshot, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'DRAFT', now(), now())
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );

        let created = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .bind(invoice.network_id)
            .bind(invoice.partner_company_id)
            .bind(invoice.period_start)
            .bind(invoice.period_end)
            .bind(&invoice.currency)
            .bind(&invoice.net_total)
            .bind(&invoice.vat_total)
            .bind(&invoice.gross_total)
            .bind(Json(&invoice.line_items))
            .bind(Json(&invoice.usage_snapshot))
            .fetch_one(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create invoice: {}", e)))?;

        Ok(created)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<Invoice>, AppError> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE id = $1 AND network_id = $2",
            INVOICE_COLUMNS
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch invoice: {}", e)))?;

        Ok(invoice)
    }

    pub async fn list(
        &self,
        network_id: &Uuid,
        filter: &InvoiceFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Invoice>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM invoices WHERE network_id = ", INVOICE_COLUMNS));
        query.push_bind(*network_id);
        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status.as_str());
        }
        if let Some(partner_company_id) = filter.partner_company_id {
            query.push(" AND partner_company_id = ");
            query.push_bind(partner_company_id);
        }
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let invoices = query
            .build_query_as::<Invoice>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list invoices: {}", e)))?;

        Ok(invoices)
    }

    /// Records the provider's identifiers. Only drafts can be issued.
    pub async fn mark_issued(
        &self,
        id: &Uuid,
        provider: &str,
        external_id: &str,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let sql = format!(
            r#"
            UPDATE invoices
            SET status = 'ISSUED', provider = $2, external_id = $3, invoice_number = $4,
                issued_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'DRAFT'
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .bind(provider)
            .bind(external_id)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark invoice issued: {}", e)))?;

        Ok(invoice)
    }

    pub async fn mark_cancelled_with_executor(
        &self,
        id: &Uuid,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<Option<Invoice>, AppError> {
        let sql = format!(
            r#"
            UPDATE invoices
            SET status = 'CANCELLED', cancelled_at = now(), updated_at = now()
            WHERE id = $1 AND status IN ('DRAFT', 'ISSUED')
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to cancel invoice: {}", e)))?;

        Ok(invoice)
    }

    /// Marks an issued invoice paid, looked up by the provider's id.
    pub async fn mark_paid_by_external(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let sql = format!(
            r#"
            UPDATE invoices
            SET status = 'PAID', paid_at = now(), updated_at = now()
            WHERE provider = $1 AND external_id = $2 AND status = 'ISSUED'
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(provider)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark invoice paid: {}", e)))?;

        Ok(invoice)
    }
}
