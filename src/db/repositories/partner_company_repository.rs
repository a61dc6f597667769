use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{CreatePartnerCompanyRequest, PartnerCompany};

const PARTNER_COLUMNS: &str = r#"
    id, network_id, name, tax_number, eu_vat_number, email, country_code, postal_code,
    city, address_line, billing_currency, stripe_customer_id, is_active, created_at
"#;

#[derive(Debug, Clone)]
pub struct PartnerCompanyRepository {
    pool: PgPool,
}

impl PartnerCompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        network_id: &Uuid,
        request: &CreatePartnerCompanyRequest,
        billing_currency: &str,
    ) -> Result<PartnerCompany, AppError> {
        let sql = format!(
            r#"
            INSERT INTO partner_companies
                (id, network_id, name, tax_number, eu_vat_number, email, country_code, postal_code,
                 city, address_line, billing_currency, stripe_customer_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE, now())
            RETURNING {}
            "#,
            PARTNER_COLUMNS
        );

        let partner = sqlx::query_as::<_, PartnerCompany>(&sql)
            .bind(Uuid::new_v4())
            .bind(network_id)
            .bind(&request.name)
            .bind(&request.tax_number)
            .bind(&request.eu_vat_number)
            .bind(&request.email)
            .bind(request.country_code.to_uppercase())
            .bind(&request.postal_code)
            .bind(&request.city)
            .bind(&request.address_line)
            .bind(billing_currency)
            .bind(&request.stripe_customer_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(partner)
    }

    pub async fn get(&self, network_id: &Uuid, id: &Uuid) -> Result<Option<PartnerCompany>, AppError> {
        let sql = format!(
            "SELECT {} FROM partner_companies WHERE id = $1 AND network_id = $2",
            PARTNER_COLUMNS
        );
        let partner = sqlx::query_as::<_, PartnerCompany>(&sql)
            .bind(id)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch partner company: {}", e)))?;

        Ok(partner)
    }

    pub async fn list(&self, network_id: &Uuid) -> Result<Vec<PartnerCompany>, AppError> {
        let sql = format!(
            "SELECT {} FROM partner_companies WHERE network_id = $1 ORDER BY name",
            PARTNER_COLUMNS
        );
        let partners = sqlx::query_as::<_, PartnerCompany>(&sql)
            .bind(network_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list partner companies: {}", e)))?;

        Ok(partners)
    }
}
