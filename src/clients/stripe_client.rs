use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::clients::{ClientError, api_error};
use crate::config::settings::StripeConfig;
use crate::models::{InvoiceCustomer, InvoiceDraft, IssuedInvoice};
use crate::utils::stripe_currency_utils::decimal_to_stripe_cents;

const SERVICE: &str = "Stripe";

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    id: String,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    invoice_pdf: Option<String>,
}

/// Form-encoded Stripe REST client covering the invoice lifecycle.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl StripeClient {
    pub fn new(client: Client, config: &StripeConfig) -> Result<Self, ClientError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("STRIPE_SECRET_KEY must be set".to_string()))?;

        Ok(Self {
            client,
            secret_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a draft invoice, attaches one invoice item per line and finalizes it.
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        let customer_id = match &draft.customer.stripe_customer_id {
            Some(id) => id.clone(),
            None => self.create_customer(&draft.customer).await?,
        };
        let currency = draft.currency.to_lowercase();
        let days_until_due = (draft.due_date - draft.issue_date).num_days().max(0).to_string();
        let invoice_id = draft.invoice_id.to_string();

        let invoice: StripeInvoice = self
            .post_form(
                "/invoices",
                &[
                    ("customer", customer_id.as_str()),
                    ("currency", currency.as_str()),
                    ("collection_method", "send_invoice"),
                    ("days_until_due", days_until_due.as_str()),
                    ("auto_advance", "false"),
                    ("pending_invoice_items_behavior", "exclude"),
                    ("description", draft.comment.as_str()),
                    ("metadata[washnet_invoice_id]", invoice_id.as_str()),
                ],
            )
            .await?;
        debug!("Stripe draft invoice {} created for {}", invoice.id, draft.invoice_id);

        for line in &draft.line_items {
            let amount = decimal_to_stripe_cents(&line.gross_amount, &draft.currency)
                .map_err(|e| ClientError::invalid(SERVICE, e.to_string()))?
                .to_string();
            let description = format!("{} x{}", line.description, line.quantity);

            let _: StripeObject = self
                .post_form(
                    "/invoiceitems",
                    &[
                        ("customer", customer_id.as_str()),
                        ("invoice", invoice.id.as_str()),
                        ("currency", currency.as_str()),
                        ("amount", amount.as_str()),
                        ("description", description.as_str()),
                    ],
                )
                .await?;
        }

        let finalized: StripeInvoice = self
            .post_form(&format!("/invoices/{}/finalize", invoice.id), &[("auto_advance", "true")])
            .await?;

        let invoice_number = finalized
            .number
            .ok_or_else(|| ClientError::invalid(SERVICE, "finalized invoice has no number"))?;

        info!("Stripe finalized invoice {} ({}) for {}", finalized.id, invoice_number, draft.invoice_id);
        Ok(IssuedInvoice {
            external_id: finalized.id,
            invoice_number,
        })
    }

    pub async fn void_invoice(&self, stripe_invoice_id: &str) -> Result<(), ClientError> {
        let voided: StripeInvoice = self
            .post_form(&format!("/invoices/{}/void", stripe_invoice_id), &[])
            .await?;
        info!("Stripe voided invoice {}", voided.id);
        Ok(())
    }

    /// Downloads the hosted PDF of a finalized invoice.
    pub async fn download_pdf(&self, stripe_invoice_id: &str) -> Result<Vec<u8>, ClientError> {
        let invoice: StripeInvoice = self
            .send_json(
                self.client
                    .get(format!("{}/invoices/{}", self.api_url, stripe_invoice_id)),
            )
            .await?;

        let pdf_url = invoice
            .invoice_pdf
            .ok_or_else(|| ClientError::invalid(SERVICE, "invoice has no PDF yet"))?;

        let response = self
            .client
            .get(&pdf_url)
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

    async fn create_customer(&self, customer: &InvoiceCustomer) -> Result<String, ClientError> {
        let mut params = vec![
            ("name", customer.name.as_str()),
            ("address[country]", customer.country_code.as_str()),
            ("address[postal_code]", customer.postal_code.as_str()),
            ("address[city]", customer.city.as_str()),
            ("address[line1]", customer.address_line.as_str()),
        ];
        if let Some(email) = customer.email.as_deref() {
            params.push(("email", email));
        }

        let created: StripeObject = self.post_form("/customers", &params).await?;
        info!("Created Stripe customer {} for {}", created.id, customer.name);
        Ok(created.id)
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.send_json(
            self.client
                .post(format!("{}{}", self.api_url, path))
                .form(params),
        )
        .await
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request
            .bearer_auth(&self.secret_key)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvoiceLineItem;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use std::str::FromStr;
    use uuid::Uuid;

    fn client(api_url: String) -> StripeClient {
        StripeClient::new(
            Client::new(),
            &StripeConfig {
                secret_key: Some("sk_test_123".to_string()),
                webhook_secret: None,
                api_url,
            },
        )
        .unwrap()
    }

    fn draft() -> InvoiceDraft {
        InvoiceDraft {
            invoice_id: Uuid::nil(),
            customer: InvoiceCustomer {
                name: "Spedition GmbH".to_string(),
                email: None,
                tax_number: None,
                eu_vat_number: Some("DE123456789".to_string()),
                country_code: "DE".to_string(),
                postal_code: "80331".to_string(),
                city: "München".to_string(),
                address_line: "Hauptstraße 5".to_string(),
                stripe_customer_id: Some("cus_123".to_string()),
            },
            currency: "EUR".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            fulfillment_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            line_items: vec![InvoiceLineItem {
                service_package_id: Uuid::nil(),
                description: "Exterior wash".to_string(),
                quantity: 2,
                unit_price: BigDecimal::from_str("25.40").unwrap(),
                net_amount: BigDecimal::from_str("50.80").unwrap(),
                vat_rate_percent: 27,
                vat_amount: BigDecimal::from_str("13.72").unwrap(),
                gross_amount: BigDecimal::from_str("64.52").unwrap(),
                source_unit_price: BigDecimal::from(10000),
                source_currency: "HUF".to_string(),
            }],
            net_total: BigDecimal::from_str("50.80").unwrap(),
            vat_total: BigDecimal::from_str("13.72").unwrap(),
            gross_total: BigDecimal::from_str("64.52").unwrap(),
            comment: "Washes 2024-02".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_invoice_flow() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/invoices")
            .match_header("authorization", "Bearer sk_test_123")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("customer".into(), "cus_123".into()),
                Matcher::UrlEncoded("currency".into(), "eur".into()),
                Matcher::UrlEncoded("days_until_due".into(), "8".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"in_1","number":null}"#)
            .create_async()
            .await;
        let item = server
            .mock("POST", "/invoiceitems")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("invoice".into(), "in_1".into()),
                Matcher::UrlEncoded("amount".into(), "6452".into()),
                Matcher::UrlEncoded("description".into(), "Exterior wash x2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"ii_1"}"#)
            .create_async()
            .await;
        let finalize = server
            .mock("POST", "/invoices/in_1/finalize")
            .with_status(200)
            .with_body(r#"{"id":"in_1","number":"WASH-0001","invoice_pdf":null}"#)
            .create_async()
            .await;

        let issued = client(server.url()).create_invoice(&draft()).await.unwrap();

        create.assert_async().await;
        item.assert_async().await;
        finalize.assert_async().await;
        assert_eq!(issued.external_id, "in_1");
        assert_eq!(issued.invoice_number, "WASH-0001");
    }

    #[tokio::test]
    async fn test_void_invoice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/invoices/in_1/void")
            .with_status(200)
            .with_body(r#"{"id":"in_1","status":"void"}"#)
            .create_async()
            .await;

        client(server.url()).void_invoice("in_1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_pdf_follows_hosted_link() {
        let mut server = mockito::Server::new_async().await;
        let pdf_url = format!("{}/pdf/in_1", server.url());
        server
            .mock("GET", "/invoices/in_1")
            .with_status(200)
            .with_body(format!(r#"{{"id":"in_1","number":"WASH-0001","invoice_pdf":"{}"}}"#, pdf_url))
            .create_async()
            .await;
        server
            .mock("GET", "/pdf/in_1")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.4")
            .create_async()
            .await;

        let bytes = client(server.url()).download_pdf("in_1").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4".to_vec());
    }
}
