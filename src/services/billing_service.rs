use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, error, info, warn};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::settings::BillingConfig;
use crate::db::pool_ext::AcquireRetry;
use crate::db::repositories::{
    InvoiceRepository, NetworkRepository, NewInvoice, PartnerCompanyRepository, ServicePackageRepository,
    WashEventRepository,
};
use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, BillingPeriodRequest, BillingRunFailure, BillingRunResponse, GenerateInvoiceRequest,
    Invoice, InvoiceCustomer, InvoiceDraft, PartnerCompany, UserRole,
};
use crate::services::billing::aggregation::{AggregationInput, aggregate};
use crate::services::billing::provider::InvoiceProviderRegistry;
use crate::services::exchange_rate_service::ExchangeRateService;

const TX_BEGIN_ATTEMPTS: usize = 3;
const TX_BEGIN_BACKOFF_MS: u64 = 100;

pub(crate) fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::Validation(format!(
            "Billing period start {} must be before end {}",
            start, end
        )));
    }
    Ok(())
}

/// Provider payload for a stored invoice.
pub(crate) fn build_draft(
    invoice: &Invoice,
    partner: &PartnerCompany,
    issue_date: NaiveDate,
    payment_due_days: u32,
) -> InvoiceDraft {
    // Fulfilment is the last day of the billed period.
    let fulfillment_date = (invoice.period_end - Duration::seconds(1)).date_naive();
    InvoiceDraft {
        invoice_id: invoice.id,
        customer: InvoiceCustomer {
            name: partner.name.clone(),
            email: partner.email.clone(),
            tax_number: partner.tax_number.clone(),
            eu_vat_number: partner.eu_vat_number.clone(),
            country_code: partner.country_code.clone(),
            postal_code: partner.postal_code.clone(),
            city: partner.city.clone(),
            address_line: partner.address_line.clone(),
            stripe_customer_id: partner.stripe_customer_id.clone(),
        },
        currency: invoice.currency.clone(),
        issue_date,
        fulfillment_date,
        due_date: issue_date + Duration::days(i64::from(payment_due_days)),
        line_items: invoice.line_items.0.clone(),
        net_total: invoice.net_total.clone(),
        vat_total: invoice.vat_total.clone(),
        gross_total: invoice.gross_total.clone(),
        comment: format!(
            "Wash services {} - {}",
            invoice.period_start.date_naive(),
            fulfillment_date
        ),
    }
}

#[derive(Clone)]
pub struct BillingService {
    pub(crate) pool: PgPool,
    pub(crate) wash_events: WashEventRepository,
    pub(crate) invoices: InvoiceRepository,
    pub(crate) partners: PartnerCompanyRepository,
    pub(crate) packages: ServicePackageRepository,
    pub(crate) networks: NetworkRepository,
    pub(crate) exchange_rates: Arc<ExchangeRateService>,
    pub(crate) providers: Arc<InvoiceProviderRegistry>,
    pub(crate) config: BillingConfig,
}

impl BillingService {
    pub fn new(
        pool: PgPool,
        exchange_rates: Arc<ExchangeRateService>,
        providers: Arc<InvoiceProviderRegistry>,
        config: BillingConfig,
    ) -> Self {
        Self {
            wash_events: WashEventRepository::new(pool.clone()),
            invoices: InvoiceRepository::new(pool.clone()),
            partners: PartnerCompanyRepository::new(pool.clone()),
            packages: ServicePackageRepository::new(pool.clone()),
            networks: NetworkRepository::new(pool.clone()),
            pool,
            exchange_rates,
            providers,
            config,
        }
    }

    /// Builds, stores and issues one partner invoice for `[period_start, period_end)`.
    pub async fn generate_invoice(
        &self,
        user: &AuthenticatedUser,
        request: &GenerateInvoiceRequest,
    ) -> Result<Invoice, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let network_id = user.require_network()?;
        validate_period(request.period_start, request.period_end)?;

        let draft = self
            .create_draft(&network_id, &request.partner_company_id, request.period_start, request.period_end)
            .await?;
        self.issue(&draft).await
    }

    /// Generates an invoice for every partner with billable washes in the period.
    /// One partner failing does not stop the others.
    pub async fn run_billing_period(
        &self,
        user: &AuthenticatedUser,
        request: &BillingPeriodRequest,
    ) -> Result<BillingRunResponse, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let network_id = user.require_network()?;
        validate_period(request.period_start, request.period_end)?;

        let partner_ids = self
            .wash_events
            .partners_with_billable(&network_id, request.period_start, request.period_end)
            .await?;
        info!(
            "Billing run for network {} covers {} partner(s) in [{}, {})",
            network_id,
            partner_ids.len(),
            request.period_start,
            request.period_end
        );

        let mut invoices = Vec::with_capacity(partner_ids.len());
        let mut failures = Vec::new();
        for partner_id in partner_ids {
            let result = match self
                .create_draft(&network_id, &partner_id, request.period_start, request.period_end)
                .await
            {
                Ok(draft) => self.issue(&draft).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(invoice) => invoices.push(invoice),
                Err(e) => {
                    error!("Billing run failed for partner {}: {}", partner_id, e);
                    failures.push(BillingRunFailure {
                        partner_company_id: partner_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(BillingRunResponse { invoices, failures })
    }

    /// Stores the DRAFT invoice and claims its wash events in one transaction.
    async fn create_draft(
        &self,
        network_id: &Uuid,
        partner_company_id: &Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        let partner = self
            .partners
            .get(network_id, partner_company_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Partner company {} not found", partner_company_id)))?;

        let package_names: HashMap<Uuid, String> = self
            .packages
            .list(network_id)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut tx = AcquireRetry::begin_with_retry(&self.pool, TX_BEGIN_ATTEMPTS, TX_BEGIN_BACKOFF_MS).await?;

        let events = self
            .wash_events
            .find_billable_with_executor(network_id, partner_company_id, period_start, period_end, &mut tx)
            .await?;
        if events.is_empty() {
            return Err(AppError::NotFound(format!(
                "No billable wash events for partner {} in period",
                partner_company_id
            )));
        }

        let source_currencies: Vec<String> = events
            .iter()
            .map(|e| e.currency.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rates = self
            .exchange_rates
            .rates_to(&source_currencies, &partner.billing_currency)
            .await?;

        let computation = aggregate(&AggregationInput {
            events: &events,
            package_names: &package_names,
            invoice_currency: &partner.billing_currency,
            rates: &rates,
            vat_rate_percent: self.config.vat_rate_percent,
            period_start,
            period_end,
        })?;
        debug!(
            "Partner {} invoice: {} line(s), net {} {}",
            partner.id,
            computation.line_items.len(),
            computation.net_total,
            partner.billing_currency
        );

        let invoice_id = Uuid::new_v4();
        let new_invoice = NewInvoice {
            network_id: *network_id,
            partner_company_id: partner.id,
            period_start,
            period_end,
            currency: partner.billing_currency.clone(),
            net_total: computation.net_total,
            vat_total: computation.vat_total,
            gross_total: computation.gross_total,
            line_items: computation.line_items,
            usage_snapshot: computation.snapshot,
        };
        let invoice = self.invoices.insert_with_executor(&invoice_id, &new_invoice, &mut tx).await?;

        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let claimed = self
            .wash_events
            .assign_invoice_with_executor(&event_ids, &invoice_id, &mut tx)
            .await?;
        if claimed != event_ids.len() as u64 {
            warn!(
                "Invoice {} claimed {} of {} wash events, rolling back",
                invoice_id,
                claimed,
                event_ids.len()
            );
            return Err(AppError::Conflict(
                "Wash events were invoiced concurrently, retry the billing run".to_string(),
            ));
        }

        tx.commit().await?;
        info!(
            "Draft invoice {} created for partner {} with {} wash event(s)",
            invoice.id,
            partner.id,
            event_ids.len()
        );
        Ok(invoice)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{InvoiceLineItem, InvoiceStatus, UsageSnapshot};
    use bigdecimal::BigDecimal;
    use chrono::TimeZone;
    use sqlx::types::Json;
    use std::collections::BTreeMap;

    pub(crate) fn partner() -> PartnerCompany {
        PartnerCompany {
            id: Uuid::new_v4(),
            network_id: Uuid::new_v4(),
            name: "Kamion Kft".to_string(),
            tax_number: Some("12345678-2-13".to_string()),
            eu_vat_number: None,
            email: None,
            country_code: "HU".to_string(),
            postal_code: "1111".to_string(),
            city: "Budapest".to_string(),
            address_line: "Fő utca 1.".to_string(),
            billing_currency: "HUF".to_string(),
            stripe_customer_id: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn invoice(partner: &PartnerCompany) -> Invoice {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Invoice {
            id: Uuid::new_v4(),
            network_id: partner.network_id,
            partner_company_id: partner.id,
            period_start: start,
            period_end: end,
            currency: "HUF".to_string(),
            net_total: BigDecimal::from(10000),
            vat_total: BigDecimal::from(2700),
            gross_total: BigDecimal::from(12700),
            line_items: Json(vec![InvoiceLineItem {
                service_package_id: Uuid::nil(),
                description: "Exterior wash".to_string(),
                quantity: 1,
                unit_price: BigDecimal::from(10000),
                net_amount: BigDecimal::from(10000),
                vat_rate_percent: 27,
                vat_amount: BigDecimal::from(2700),
                gross_amount: BigDecimal::from(12700),
                source_unit_price: BigDecimal::from(10000),
                source_currency: "HUF".to_string(),
            }]),
            usage_snapshot: Json(UsageSnapshot {
                period_start: start,
                period_end: end,
                invoice_currency: "HUF".to_string(),
                rates: BTreeMap::new(),
                entries: Vec::new(),
            }),
            status: InvoiceStatus::Draft,
            provider: None,
            external_id: None,
            invoice_number: None,
            issued_at: None,
            paid_at: None,
            cancelled_at: None,
            created_at: end,
            updated_at: end,
        }
    }

    #[test]
    fn test_period_must_be_ordered() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert!(validate_period(start, start + Duration::days(1)).is_ok());
        assert!(validate_period(start, start).is_err());
        assert!(validate_period(start + Duration::days(1), start).is_err());
    }

    #[test]
    fn test_draft_dates_follow_period() {
        let partner = partner();
        let invoice = invoice(&partner);
        let issue_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let draft = build_draft(&invoice, &partner, issue_date, 8);

        assert_eq!(draft.fulfillment_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(draft.due_date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(draft.comment, "Wash services 2024-02-01 - 2024-02-29");
        assert_eq!(draft.customer.tax_number.as_deref(), Some("12345678-2-13"));
        assert_eq!(draft.line_items.len(), 1);
    }
}
