use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub network_id: Uuid,
    pub name: String,
    pub code: String,
    pub city: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServicePackage {
    pub id: Uuid,
    pub network_id: Uuid,
    pub name: String,
    pub code: String,
    pub price: BigDecimal,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PartnerCompany {
    pub id: Uuid,
    pub network_id: Uuid,
    pub name: String,
    pub tax_number: Option<String>,
    pub eu_vat_number: Option<String>,
    pub email: Option<String>,
    pub country_code: String,
    pub postal_code: String,
    pub city: String,
    pub address_line: String,
    pub billing_currency: String,
    pub stripe_customer_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub network_id: Uuid,
    pub partner_company_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationRequest {
    pub name: String,
    pub code: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServicePackageRequest {
    pub name: String,
    pub code: String,
    pub price: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartnerCompanyRequest {
    pub name: String,
    pub tax_number: Option<String>,
    pub eu_vat_number: Option<String>,
    pub email: Option<String>,
    pub country_code: String,
    pub postal_code: String,
    pub city: String,
    pub address_line: String,
    pub billing_currency: Option<String>,
    pub stripe_customer_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriverRequest {
    pub partner_company_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}
