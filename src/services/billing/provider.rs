use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use reqwest::Client;

use crate::clients::{BillingoClient, ClientError, StripeClient, SzamlazzClient};
use crate::config::settings::AppSettings;
use crate::error::AppError;
use crate::models::{InvoiceDraft, InvoiceProviderKind, IssuedInvoice};

/// An external invoicing system.
#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    fn kind(&self) -> InvoiceProviderKind;

    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError>;

    /// Cancels or voids the invoice identified by the provider's external id.
    async fn cancel_invoice(&self, external_id: &str) -> Result<(), ClientError>;

    async fn get_invoice_pdf(&self, external_id: &str) -> Result<Vec<u8>, ClientError>;
}

#[async_trait]
impl InvoiceProvider for SzamlazzClient {
    fn kind(&self) -> InvoiceProviderKind {
        InvoiceProviderKind::Szamlazz
    }

    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        SzamlazzClient::create_invoice(self, draft).await
    }

    async fn cancel_invoice(&self, external_id: &str) -> Result<(), ClientError> {
        let storno = SzamlazzClient::cancel_invoice(self, external_id, Utc::now().date_naive()).await?;
        info!("Számlázz.hu invoice {} reversed by {}", external_id, storno);
        Ok(())
    }

    async fn get_invoice_pdf(&self, external_id: &str) -> Result<Vec<u8>, ClientError> {
        self.download_pdf(external_id).await
    }
}

#[async_trait]
impl InvoiceProvider for BillingoClient {
    fn kind(&self) -> InvoiceProviderKind {
        InvoiceProviderKind::Billingo
    }

    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        BillingoClient::create_invoice(self, draft).await
    }

    async fn cancel_invoice(&self, external_id: &str) -> Result<(), ClientError> {
        BillingoClient::cancel_invoice(self, external_id).await.map(|_| ())
    }

    async fn get_invoice_pdf(&self, external_id: &str) -> Result<Vec<u8>, ClientError> {
        self.download_pdf(external_id).await
    }
}

#[async_trait]
impl InvoiceProvider for StripeClient {
    fn kind(&self) -> InvoiceProviderKind {
        InvoiceProviderKind::Stripe
    }

    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        StripeClient::create_invoice(self, draft).await
    }

    async fn cancel_invoice(&self, external_id: &str) -> Result<(), ClientError> {
        self.void_invoice(external_id).await
    }

    async fn get_invoice_pdf(&self, external_id: &str) -> Result<Vec<u8>, ClientError> {
        self.download_pdf(external_id).await
    }
}

/// Configured providers, selected by network override or the platform default.
#[derive(Clone)]
pub struct InvoiceProviderRegistry {
    providers: HashMap<InvoiceProviderKind, Arc<dyn InvoiceProvider>>,
    default_kind: InvoiceProviderKind,
}

impl InvoiceProviderRegistry {
    pub fn new(default_kind: InvoiceProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            default_kind,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn InvoiceProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Builds every provider whose credentials are present; the rest are skipped.
    pub fn from_settings(client: Client, settings: &AppSettings) -> Result<Self, AppError> {
        let default_kind: InvoiceProviderKind = settings.billing.default_provider.parse()?;
        let mut registry = Self::new(default_kind);

        let built: [Result<Arc<dyn InvoiceProvider>, ClientError>; 3] = [
            SzamlazzClient::new(client.clone(), &settings.szamlazz).map(|c| Arc::new(c) as Arc<dyn InvoiceProvider>),
            BillingoClient::new(client.clone(), &settings.billingo).map(|c| Arc::new(c) as Arc<dyn InvoiceProvider>),
            StripeClient::new(client, &settings.stripe).map(|c| Arc::new(c) as Arc<dyn InvoiceProvider>),
        ];
        for provider in built {
            match provider {
                Ok(provider) => {
                    info!("Invoice provider {} configured", provider.kind().as_str());
                    registry.register(provider);
                }
                Err(e) => warn!("Invoice provider skipped: {}", e),
            }
        }

        if !registry.providers.contains_key(&default_kind) {
            warn!(
                "Default invoice provider {} is not configured; invoices can only be issued via network overrides",
                default_kind.as_str()
            );
        }
        Ok(registry)
    }

    pub fn get(&self, kind: InvoiceProviderKind) -> Result<Arc<dyn InvoiceProvider>, AppError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Configuration(format!("Invoice provider {} is not configured", kind.as_str())))
    }

    /// The provider a network issues through.
    pub fn resolve(&self, network_override: Option<&str>) -> Result<Arc<dyn InvoiceProvider>, AppError> {
        let kind = match network_override {
            Some(name) => name.parse()?,
            None => self.default_kind,
        };
        self.get(kind)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records calls and answers with canned results.
    pub(crate) struct FakeProvider {
        pub kind: InvoiceProviderKind,
        pub fail_create: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        pub(crate) fn new(kind: InvoiceProviderKind) -> Self {
            Self {
                kind,
                fail_create: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InvoiceProvider for FakeProvider {
        fn kind(&self) -> InvoiceProviderKind {
            self.kind
        }

        async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
            self.calls.lock().unwrap().push(format!("create:{}", draft.invoice_id));
            if self.fail_create {
                return Err(ClientError::Api {
                    service: "Fake",
                    status: 500,
                    body: "down".to_string(),
                });
            }
            Ok(IssuedInvoice {
                external_id: format!("ext-{}", draft.invoice_id),
                invoice_number: "FAKE-1".to_string(),
            })
        }

        async fn cancel_invoice(&self, external_id: &str) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(format!("cancel:{}", external_id));
            Ok(())
        }

        async fn get_invoice_pdf(&self, external_id: &str) -> Result<Vec<u8>, ClientError> {
            self.calls.lock().unwrap().push(format!("pdf:{}", external_id));
            Ok(b"%PDF".to_vec())
        }
    }

    #[test]
    fn test_resolve_prefers_network_override() {
        let mut registry = InvoiceProviderRegistry::new(InvoiceProviderKind::Szamlazz);
        registry.register(Arc::new(FakeProvider::new(InvoiceProviderKind::Szamlazz)));
        registry.register(Arc::new(FakeProvider::new(InvoiceProviderKind::Stripe)));

        assert_eq!(registry.resolve(None).unwrap().kind(), InvoiceProviderKind::Szamlazz);
        assert_eq!(registry.resolve(Some("stripe")).unwrap().kind(), InvoiceProviderKind::Stripe);
        assert_eq!(registry.resolve(Some("Stripe")).unwrap().kind(), InvoiceProviderKind::Stripe);
    }

    #[test]
    fn test_unconfigured_or_unknown_provider_fails() {
        let registry = InvoiceProviderRegistry::new(InvoiceProviderKind::Billingo);

        assert!(matches!(registry.resolve(None), Err(AppError::Configuration(_))));
        assert!(matches!(registry.resolve(Some("paypal")), Err(AppError::Validation(_))));
    }
}
