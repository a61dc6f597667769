use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Issued => "ISSUED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "ISSUED" => Ok(InvoiceStatus::Issued),
            "PAID" => Ok(InvoiceStatus::Paid),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            other => Err(AppError::Validation(format!("Unknown invoice status: {}", other))),
        }
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceProviderKind {
    Szamlazz,
    Billingo,
    Stripe,
}

impl InvoiceProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceProviderKind::Szamlazz => "szamlazz",
            InvoiceProviderKind::Billingo => "billingo",
            InvoiceProviderKind::Stripe => "stripe",
        }
    }
}

impl FromStr for InvoiceProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "szamlazz" => Ok(InvoiceProviderKind::Szamlazz),
            "billingo" => Ok(InvoiceProviderKind::Billingo),
            "stripe" => Ok(InvoiceProviderKind::Stripe),
            other => Err(AppError::Validation(format!("Unknown invoice provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineItem {
    pub service_package_id: Uuid,
    pub description: String,
    pub quantity: i64,
    /// Net unit price in the invoice currency.
    pub unit_price: BigDecimal,
    pub net_amount: BigDecimal,
    pub vat_rate_percent: u32,
    pub vat_amount: BigDecimal,
    pub gross_amount: BigDecimal,
    pub source_unit_price: BigDecimal,
    pub source_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshotEntry {
    pub wash_event_id: Uuid,
    pub service_package_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub price: BigDecimal,
    pub currency: String,
    pub converted_amount: BigDecimal,
}

/// Frozen record of the usage an invoice was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub invoice_currency: String,
    /// Cross rate (source currency -> invoice currency) applied per source currency.
    pub rates: BTreeMap<String, BigDecimal>,
    pub entries: Vec<UsageSnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub network_id: Uuid,
    pub partner_company_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency: String,
    pub net_total: BigDecimal,
    pub vat_total: BigDecimal,
    pub gross_total: BigDecimal,
    pub line_items: Json<Vec<InvoiceLineItem>>,
    pub usage_snapshot: Json<UsageSnapshot>,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub provider: Option<String>,
    pub external_id: Option<String>,
    pub invoice_number: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Billing party details handed to an invoice provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCustomer {
    pub name: String,
    pub email: Option<String>,
    pub tax_number: Option<String>,
    pub eu_vat_number: Option<String>,
    pub country_code: String,
    pub postal_code: String,
    pub city: String,
    pub address_line: String,
    pub stripe_customer_id: Option<String>,
}

/// Everything a provider needs to issue one invoice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub invoice_id: Uuid,
    pub customer: InvoiceCustomer,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub fulfillment_date: NaiveDate,
    pub due_date: NaiveDate,
    pub line_items: Vec<InvoiceLineItem>,
    pub net_total: BigDecimal,
    pub vat_total: BigDecimal,
    pub gross_total: BigDecimal,
    pub comment: String,
}

/// What a provider reports back after issuing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvoice {
    pub external_id: String,
    pub invoice_number: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriodRequest {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInvoiceRequest {
    pub partner_company_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub partner_company_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRunResponse {
    pub invoices: Vec<Invoice>,
    pub failures: Vec<BillingRunFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRunFailure {
    pub partner_company_id: Uuid,
    pub message: String,
}
