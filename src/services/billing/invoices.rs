use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

use crate::db::pool_ext::AcquireRetry;
use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, Invoice, InvoiceDraft, InvoiceFilter, InvoiceProviderKind, InvoiceStatus,
    IssuedInvoice, UserRole,
};
use crate::services::billing::provider::{InvoiceProvider, InvoiceProviderRegistry};
use crate::services::billing_service::{BillingService, build_draft};
use crate::services::wash_event_service::clamp_paging;

/// Partners only ever see their own company's invoices.
pub(crate) fn scope_invoice_filter(
    user: &AuthenticatedUser,
    filter: &InvoiceFilter,
) -> Result<InvoiceFilter, AppError> {
    user.require_role(&[UserRole::NetworkAdmin, UserRole::Partner])?;
    let mut scoped = filter.clone();
    if user.role == UserRole::Partner {
        let partner_id = user
            .partner_company_id
            .ok_or_else(|| AppError::Forbidden("Partner account has no company".to_string()))?;
        scoped.partner_company_id = Some(partner_id);
    }
    Ok(scoped)
}

impl BillingService {
    pub async fn list_invoices(
        &self,
        user: &AuthenticatedUser,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let network_id = user.require_network()?;
        let scoped = scope_invoice_filter(user, filter)?;
        let (limit, offset) = clamp_paging(filter.limit, filter.offset);
        self.invoices.list(&network_id, &scoped, limit, offset).await
    }

    pub async fn get_invoice(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<Invoice, AppError> {
        let network_id = user.require_network()?;
        user.require_role(&[UserRole::NetworkAdmin, UserRole::Partner])?;

        self.invoices
            .get(&network_id, id)
            .await?
            .filter(|invoice| user.role != UserRole::Partner || user.partner_company_id == Some(invoice.partner_company_id))
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))
    }

    /// Re-issues a DRAFT invoice, e.g. after an earlier provider failure.
    pub async fn issue_invoice(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<Invoice, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let invoice = self.get_invoice(user, id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(AppError::InvalidTransition(format!(
                "Cannot issue invoice in status {}",
                invoice.status
            )));
        }
        self.issue(&invoice).await
    }

    /// Hands a DRAFT to the network's provider. On failure the invoice stays DRAFT.
    pub(crate) async fn issue(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let network = self
            .networks
            .get_by_id(&invoice.network_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Network {} not found", invoice.network_id)))?;
        let partner = self
            .partners
            .get(&invoice.network_id, &invoice.partner_company_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Partner company {} not found", invoice.partner_company_id))
            })?;
        let provider = self.providers.resolve(network.invoice_provider.as_deref())?;

        let draft = build_draft(invoice, &partner, Utc::now().date_naive(), self.config.payment_due_days);
        let issued = submit_draft(provider.as_ref(), &draft).await?;

        let updated = self
            .invoices
            .mark_issued(&invoice.id, provider.kind().as_str(), &issued.external_id, &issued.invoice_number)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Invoice {} is no longer a draft", invoice.id)))?;

        info!(
            "Invoice {} issued via {} as {}",
            updated.id,
            provider.kind().as_str(),
            issued.invoice_number
        );
        Ok(updated)
    }

    /// Cancels at the provider when issued, then frees the wash events for re-billing.
    pub async fn cancel_invoice(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<Invoice, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let invoice = self.get_invoice(user, id).await?;

        cancel_at_provider(&self.providers, &invoice).await?;

        let mut tx = AcquireRetry::begin_with_retry(&self.pool, 3, 100).await?;
        let cancelled = self
            .invoices
            .mark_cancelled_with_executor(&invoice.id, &mut tx)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Invoice {} changed while cancelling", invoice.id)))?;
        let released = self
            .wash_events
            .release_invoice_with_executor(&invoice.id, &mut tx)
            .await?;
        tx.commit().await?;

        info!("Invoice {} cancelled, {} wash event(s) released", invoice.id, released);
        Ok(cancelled)
    }

    pub async fn get_invoice_pdf(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<(Invoice, Vec<u8>), AppError> {
        let invoice = self.get_invoice(user, id).await?;
        let (provider_name, external_id) = issued_reference(&invoice)?;
        let kind: InvoiceProviderKind = provider_name.parse()?;

        let pdf = self
            .providers
            .get(kind)?
            .get_invoice_pdf(external_id)
            .await?;
        Ok((invoice, pdf))
    }
}

/// Sends the draft to the provider. Nothing is persisted here, so a failure leaves the invoice DRAFT.
pub(crate) async fn submit_draft(
    provider: &dyn InvoiceProvider,
    draft: &InvoiceDraft,
) -> Result<IssuedInvoice, AppError> {
    provider.create_invoice(draft).await.map_err(|e| {
        error!(
            "Issuing invoice {} via {} failed, it stays DRAFT: {}",
            draft.invoice_id,
            provider.kind().as_str(),
            e
        );
        AppError::from(e)
    })
}

/// Which provider invoice has to be cancelled first. DRAFTs were never sent anywhere.
pub(crate) fn cancel_plan(invoice: &Invoice) -> Result<Option<(InvoiceProviderKind, &str)>, AppError> {
    match invoice.status {
        InvoiceStatus::Draft => Ok(None),
        InvoiceStatus::Issued => {
            let (provider_name, external_id) = issued_reference(invoice)?;
            Ok(Some((provider_name.parse()?, external_id)))
        }
        status => Err(AppError::InvalidTransition(format!(
            "Cannot cancel invoice in status {}",
            status
        ))),
    }
}

/// Cancels through the provider that issued the invoice, when there is one.
pub(crate) async fn cancel_at_provider(
    providers: &InvoiceProviderRegistry,
    invoice: &Invoice,
) -> Result<(), AppError> {
    if let Some((kind, external_id)) = cancel_plan(invoice)? {
        providers.get(kind)?.cancel_invoice(external_id).await?;
    }
    Ok(())
}

fn issued_reference(invoice: &Invoice) -> Result<(&str, &str), AppError> {
    match (invoice.provider.as_deref(), invoice.external_id.as_deref()) {
        (Some(provider), Some(external_id)) => Ok((provider, external_id)),
        _ => Err(AppError::Validation(format!(
            "Invoice {} has not been issued by a provider",
            invoice.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::billing::provider::tests::FakeProvider;
    use crate::services::billing_service::tests::{invoice, partner};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn issued_via(kind: InvoiceProviderKind) -> Invoice {
        let mut issued = invoice(&partner());
        issued.status = InvoiceStatus::Issued;
        issued.provider = Some(kind.as_str().to_string());
        issued.external_id = Some("ext-42".to_string());
        issued.invoice_number = Some("WN-2024-0042".to_string());
        issued
    }

    fn registry_with(fakes: &[Arc<FakeProvider>]) -> InvoiceProviderRegistry {
        let mut registry = InvoiceProviderRegistry::new(InvoiceProviderKind::Szamlazz);
        for fake in fakes {
            registry.register(fake.clone());
        }
        registry
    }

    fn user(role: UserRole, partner: Option<Uuid>) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role,
            network_id: Some(Uuid::new_v4()),
            location_id: None,
            partner_company_id: partner,
            driver_id: None,
        }
    }

    #[test]
    fn test_partner_filter_is_pinned_to_own_company() {
        let own = Uuid::new_v4();
        let filter = InvoiceFilter {
            partner_company_id: Some(Uuid::new_v4()),
            ..Default::default()
        };

        let scoped = scope_invoice_filter(&user(UserRole::Partner, Some(own)), &filter).unwrap();
        assert_eq!(scoped.partner_company_id, Some(own));

        let admin = scope_invoice_filter(&user(UserRole::NetworkAdmin, None), &filter).unwrap();
        assert_eq!(admin.partner_company_id, filter.partner_company_id);
    }

    #[test]
    fn test_operators_and_drivers_cannot_list_invoices() {
        for role in [UserRole::Operator, UserRole::Driver] {
            assert!(matches!(
                scope_invoice_filter(&user(role, None), &InvoiceFilter::default()),
                Err(AppError::Forbidden(_))
            ));
        }
    }

    #[actix_web::test]
    async fn test_provider_failure_propagates_without_issuing() {
        let partner = partner();
        let draft_invoice = invoice(&partner);
        let draft = build_draft(&draft_invoice, &partner, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 8);
        let failing = FakeProvider {
            fail_create: true,
            ..FakeProvider::new(InvoiceProviderKind::Billingo)
        };

        let err = submit_draft(&failing, &draft).await.unwrap_err();
        assert!(matches!(err, AppError::External(_)));
        assert_eq!(*failing.calls.lock().unwrap(), vec![format!("create:{}", draft_invoice.id)]);

        // Still a draft, so a retry is allowed and succeeds once the provider is back
        assert_eq!(cancel_plan(&draft_invoice).unwrap(), None);
        let healthy = FakeProvider::new(InvoiceProviderKind::Billingo);
        let issued = submit_draft(&healthy, &draft).await.unwrap();
        assert_eq!(issued.external_id, format!("ext-{}", draft_invoice.id));
    }

    #[actix_web::test]
    async fn test_cancelling_draft_skips_provider() {
        let fake = Arc::new(FakeProvider::new(InvoiceProviderKind::Szamlazz));
        let registry = registry_with(&[fake.clone()]);

        cancel_at_provider(&registry, &invoice(&partner())).await.unwrap();
        assert!(fake.calls.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_cancelling_issued_invoice_uses_issuing_provider() {
        let default = Arc::new(FakeProvider::new(InvoiceProviderKind::Szamlazz));
        let stripe = Arc::new(FakeProvider::new(InvoiceProviderKind::Stripe));
        let registry = registry_with(&[default.clone(), stripe.clone()]);

        cancel_at_provider(&registry, &issued_via(InvoiceProviderKind::Stripe))
            .await
            .unwrap();
        assert_eq!(*stripe.calls.lock().unwrap(), vec!["cancel:ext-42".to_string()]);
        assert!(default.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_paid_and_cancelled_invoices_cannot_be_cancelled() {
        for status in [InvoiceStatus::Paid, InvoiceStatus::Cancelled] {
            let mut closed = issued_via(InvoiceProviderKind::Stripe);
            closed.status = status;
            assert!(matches!(cancel_plan(&closed), Err(AppError::InvalidTransition(_))));
        }
    }

    #[test]
    fn test_issued_invoice_without_reference_is_rejected() {
        let mut broken = issued_via(InvoiceProviderKind::Billingo);
        broken.external_id = None;
        assert!(matches!(cancel_plan(&broken), Err(AppError::Validation(_))));
    }
}
