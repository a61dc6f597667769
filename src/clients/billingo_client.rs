use bigdecimal::ToPrimitive;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clients::{ClientError, api_error};
use crate::config::settings::BillingoConfig;
use crate::models::{InvoiceCustomer, InvoiceDraft, IssuedInvoice};

const SERVICE: &str = "Billingo";

#[derive(Debug, Deserialize)]
struct BillingoPartner {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct BillingoDocument {
    id: i64,
    #[serde(default)]
    invoice_number: Option<String>,
}

#[derive(Debug, Serialize)]
struct DocumentItem {
    name: String,
    unit_price: f64,
    unit_price_type: &'static str,
    quantity: i64,
    unit: &'static str,
    vat: String,
}

/// Billingo API v3 client.
#[derive(Debug, Clone)]
pub struct BillingoClient {
    client: Client,
    api_key: String,
    block_id: i64,
    api_url: String,
}

impl BillingoClient {
    pub fn new(client: Client, config: &BillingoConfig) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("BILLINGO_API_KEY must be set".to_string()))?;
        let block_id = config
            .block_id
            .ok_or_else(|| ClientError::NotConfigured("BILLINGO_BLOCK_ID must be set".to_string()))?;

        Ok(Self {
            client,
            api_key,
            block_id,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates the buyer as a Billingo partner, then issues the invoice document.
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        let partner_id = self.create_partner(&draft.customer).await?;
        debug!("Billingo partner {} created for invoice {}", partner_id, draft.invoice_id);

        let items = draft
            .line_items
            .iter()
            .map(|line| {
                let unit_price = line.unit_price.to_f64().ok_or_else(|| {
                    ClientError::invalid(SERVICE, format!("unit price {} is not representable", line.unit_price))
                })?;
                Ok(DocumentItem {
                    name: line.description.clone(),
                    unit_price,
                    unit_price_type: "net",
                    quantity: line.quantity,
                    unit: "db",
                    vat: format!("{}%", line.vat_rate_percent),
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;
        let language = if draft.currency == "HUF" { "hu" } else { "en" };

        let body = json!({
            "partner_id": partner_id,
            "block_id": self.block_id,
            "type": "invoice",
            "fulfillment_date": draft.fulfillment_date,
            "due_date": draft.due_date,
            "payment_method": "wire_transfer",
            "language": language,
            "currency": draft.currency,
            "electronic": true,
            "paid": false,
            "comment": draft.comment,
            "items": items,
        });

        let document: BillingoDocument = self
            .send_json(self.client.post(format!("{}/documents", self.api_url)).json(&body))
            .await?;

        let invoice_number = document
            .invoice_number
            .ok_or_else(|| ClientError::invalid(SERVICE, "document has no invoice number"))?;

        info!("Billingo issued document {} ({}) for {}", document.id, invoice_number, draft.invoice_id);
        Ok(IssuedInvoice {
            external_id: document.id.to_string(),
            invoice_number,
        })
    }

    /// Issues a cancellation document for `document_id`.
    pub async fn cancel_invoice(&self, document_id: &str) -> Result<String, ClientError> {
        let cancellation: BillingoDocument = self
            .send_json(
                self.client
                    .post(format!("{}/documents/{}/cancel", self.api_url, document_id)),
            )
            .await?;

        info!("Billingo cancelled document {} with {}", document_id, cancellation.id);
        Ok(cancellation.id.to_string())
    }

    pub async fn download_pdf(&self, document_id: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/documents/{}/download", self.api_url, document_id)),
            )
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;
        Ok(bytes.to_vec())
    }

    async fn create_partner(&self, customer: &InvoiceCustomer) -> Result<i64, ClientError> {
        let emails: Vec<&str> = customer.email.as_deref().into_iter().collect();
        let body = json!({
            "name": customer.name,
            "address": {
                "country_code": customer.country_code,
                "post_code": customer.postal_code,
                "city": customer.city,
                "address": customer.address_line,
            },
            "emails": emails,
            "taxcode": customer.tax_number.as_deref().or(customer.eu_vat_number.as_deref()).unwrap_or_default(),
        });

        let partner: BillingoPartner = self
            .send_json(self.client.post(format!("{}/partners", self.api_url)).json(&body))
            .await?;
        Ok(partner.id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::invalid(SERVICE, e.to_string()))
    }
}
