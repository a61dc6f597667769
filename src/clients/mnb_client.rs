use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;

use crate::clients::{ClientError, api_error};
use crate::models::{RateSource, RateTable};
use crate::utils::financial_validation::normalize_rate;

const SERVICE: &str = "MNB";
const SOAP_ACTION: &str = "http://www.mnb.hu/webservices/MNBArfolyamServiceSoap/GetCurrentExchangeRates";
const SOAP_ENVELOPE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:web="http://www.mnb.hu/webservices/">
  <soapenv:Header/>
  <soapenv:Body>
    <web:GetCurrentExchangeRates/>
  </soapenv:Body>
</soapenv:Envelope>"#;

const RESULT_OPEN: &str = "<GetCurrentExchangeRatesResult>";
const RESULT_CLOSE: &str = "</GetCurrentExchangeRatesResult>";

#[derive(Debug, Deserialize)]
struct MnbCurrentExchangeRates {
    #[serde(rename = "Day")]
    day: MnbDay,
}

#[derive(Debug, Deserialize)]
struct MnbDay {
    #[serde(rename = "@date")]
    date: String,
    #[serde(rename = "Rate", default)]
    rates: Vec<MnbRate>,
}

#[derive(Debug, Deserialize)]
struct MnbRate {
    #[serde(rename = "@unit")]
    unit: String,
    #[serde(rename = "@curr")]
    currency: String,
    #[serde(rename = "$text")]
    value: String,
}

/// Magyar Nemzeti Bank SOAP rate service. Quotes are already HUF per unit.
#[derive(Debug, Clone)]
pub struct MnbClient {
    client: Client,
    url: String,
}

impl MnbClient {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }

    pub async fn fetch_current_rates(&self) -> Result<RateTable, ClientError> {
        debug!("Fetching current exchange rates from MNB");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(SOAP_ENVELOPE)
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        parse_soap_response(&body)
    }
}

/// Extracts the escaped rate document from the SOAP envelope and parses it.
fn parse_soap_response(body: &str) -> Result<RateTable, ClientError> {
    let start = body
        .find(RESULT_OPEN)
        .ok_or_else(|| ClientError::invalid(SERVICE, "missing GetCurrentExchangeRatesResult"))?
        + RESULT_OPEN.len();
    let end = body[start..]
        .find(RESULT_CLOSE)
        .ok_or_else(|| ClientError::invalid(SERVICE, "unterminated GetCurrentExchangeRatesResult"))?
        + start;

    let inner = quick_xml::escape::unescape(&body[start..end])
        .map_err(|e| ClientError::invalid(SERVICE, format!("bad escaping: {}", e)))?;

    parse_rates_document(&inner)
}

fn parse_rates_document(xml: &str) -> Result<RateTable, ClientError> {
    let document: MnbCurrentExchangeRates = quick_xml::de::from_str(xml)
        .map_err(|e| ClientError::invalid(SERVICE, format!("bad rate document: {}", e)))?;

    let rate_date = NaiveDate::parse_from_str(&document.day.date, "%Y-%m-%d")
        .map_err(|e| ClientError::invalid(SERVICE, format!("bad date '{}': {}", document.day.date, e)))?;

    let mut rates = Vec::with_capacity(document.day.rates.len());
    for rate in document.day.rates {
        match quote_per_unit(&rate) {
            Some(huf_per_unit) => rates.push((rate.currency.to_uppercase(), huf_per_unit)),
            None => warn!("Skipping unparseable MNB rate for {}: {} / {}", rate.currency, rate.value, rate.unit),
        }
    }

    if rates.is_empty() {
        return Err(ClientError::invalid(SERVICE, "no rates in response"));
    }

    Ok(RateTable {
        source: RateSource::Mnb,
        rate_date,
        rates,
    })
}

/// MNB quotes use a decimal comma and may be per 100 units (JPY, KRW).
fn quote_per_unit(rate: &MnbRate) -> Option<BigDecimal> {
    let value = BigDecimal::from_str(&rate.value.trim().replace(',', ".")).ok()?;
    let unit = BigDecimal::from_str(rate.unit.trim()).ok()?;
    if unit <= BigDecimal::from(0) || value <= BigDecimal::from(0) {
        return None;
    }
    Some(normalize_rate(&(value / unit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOAP_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <GetCurrentExchangeRatesResponse xmlns="http://www.mnb.hu/webservices/" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <GetCurrentExchangeRatesResult>&lt;MNBCurrentExchangeRates&gt;&lt;Day date="2024-03-01"&gt;&lt;Rate unit="1" curr="EUR"&gt;393,21&lt;/Rate&gt;&lt;Rate unit="100" curr="JPY"&gt;241,35&lt;/Rate&gt;&lt;Rate unit="1" curr="USD"&gt;363,05&lt;/Rate&gt;&lt;/Day&gt;&lt;/MNBCurrentExchangeRates&gt;</GetCurrentExchangeRatesResult>
    </GetCurrentExchangeRatesResponse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn test_parse_soap_response() {
        let table = parse_soap_response(SOAP_RESPONSE).unwrap();
        assert_eq!(table.source, RateSource::Mnb);
        assert_eq!(table.rate_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            table.rates,
            vec![
                ("EUR".to_string(), BigDecimal::from_str("393.210000").unwrap()),
                ("JPY".to_string(), BigDecimal::from_str("2.413500").unwrap()),
                ("USD".to_string(), BigDecimal::from_str("363.050000").unwrap()),
            ]
        );
    }

    #[test]
    fn test_missing_result_is_invalid() {
        let err = parse_soap_response("<s:Envelope/>").unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_posts_soap_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/arfolyamok.asmx")
            .match_header("SOAPAction", SOAP_ACTION)
            .with_status(200)
            .with_header("content-type", "text/xml; charset=utf-8")
            .with_body(SOAP_RESPONSE)
            .create_async()
            .await;

        let client = MnbClient::new(Client::new(), format!("{}/arfolyamok.asmx", server.url()));
        let table = client.fetch_current_rates().await.unwrap();

        mock.assert_async().await;
        assert_eq!(table.rates.len(), 3);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = MnbClient::new(Client::new(), server.url());
        let err = client.fetch_current_rates().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 503, .. }));
    }
}
