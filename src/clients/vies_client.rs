use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::clients::{ClientError, api_error};

const SERVICE: &str = "VIES";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckVatRequest<'a> {
    country_code: &'a str,
    vat_number: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckVatResponse {
    country_code: String,
    vat_number: String,
    valid: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// Result of an EU VAT number lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VatValidation {
    pub country_code: String,
    pub vat_number: String,
    pub valid: bool,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ViesClient {
    client: Client,
    api_url: String,
}

impl ViesClient {
    pub fn new(client: Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn check_vat_number(
        &self,
        country_code: &str,
        vat_number: &str,
    ) -> Result<VatValidation, ClientError> {
        let url = format!("{}/check-vat-number", self.api_url);

        let response = self
            .client
            .post(&url)
            .json(&CheckVatRequest { country_code, vat_number })
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let body: CheckVatResponse = response
            .json()
            .await
            .map_err(|e| ClientError::invalid(SERVICE, e.to_string()))?;

        Ok(VatValidation {
            country_code: body.country_code,
            vat_number: body.vat_number,
            valid: body.valid,
            name: body.name.filter(|n| !is_redacted(n)),
            address: body.address.filter(|a| !is_redacted(a)),
        })
    }
}

/// VIES answers "---" for trader details a member state does not disclose.
fn is_redacted(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == "---"
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_check_vat_number() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/check-vat-number")
            .match_body(Matcher::Json(serde_json::json!({
                "countryCode": "HU",
                "vatNumber": "12345678"
            })))
            .with_status(200)
            .with_body(
                r#"{"countryCode":"HU","vatNumber":"12345678","requestDate":"2024-03-01T10:00:00.000Z","valid":true,"name":"KAMION KFT","address":"---"}"#,
            )
            .create_async()
            .await;

        let client = ViesClient::new(Client::new(), server.url());
        let result = client.check_vat_number("HU", "12345678").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            result,
            VatValidation {
                country_code: "HU".to_string(),
                vat_number: "12345678".to_string(),
                valid: true,
                name: Some("KAMION KFT".to_string()),
                address: None,
            }
        );
    }
}
