use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;

use crate::clients::{ClientError, api_error};
use crate::models::{RateSource, RateTable};
use crate::utils::financial_validation::normalize_rate;

const SERVICE: &str = "ECB";

#[derive(Debug, Deserialize)]
struct EcbEnvelope {
    #[serde(rename = "Cube")]
    cube: EcbOuterCube,
}

#[derive(Debug, Deserialize)]
struct EcbOuterCube {
    #[serde(rename = "Cube")]
    day: EcbDayCube,
}

#[derive(Debug, Deserialize)]
struct EcbDayCube {
    #[serde(rename = "@time")]
    time: String,
    #[serde(rename = "Cube", default)]
    rates: Vec<EcbRateCube>,
}

#[derive(Debug, Deserialize)]
struct EcbRateCube {
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "@rate")]
    rate: String,
}

/// European Central Bank daily reference feed. Quotes are per EUR and get
/// crossed through EUR/HUF.
#[derive(Debug, Clone)]
pub struct EcbClient {
    client: Client,
    url: String,
}

impl EcbClient {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }

    pub async fn fetch_daily_rates(&self) -> Result<RateTable, ClientError> {
        debug!("Fetching daily reference rates from ECB");

        let response = self
            .client
            .get(&self.url)
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

        parse_daily_feed(&body)
    }
}

fn parse_daily_feed(xml: &str) -> Result<RateTable, ClientError> {
    let envelope: EcbEnvelope = quick_xml::de::from_str(xml)
        .map_err(|e| ClientError::invalid(SERVICE, format!("bad feed: {}", e)))?;
    let day = envelope.cube.day;

    let rate_date = NaiveDate::parse_from_str(&day.time, "%Y-%m-%d")
        .map_err(|e| ClientError::invalid(SERVICE, format!("bad date '{}': {}", day.time, e)))?;

    let mut per_eur = Vec::with_capacity(day.rates.len());
    for cube in day.rates {
        match BigDecimal::from_str(cube.rate.trim()) {
            Ok(rate) if rate > BigDecimal::from(0) => per_eur.push((cube.currency.to_uppercase(), rate)),
            _ => warn!("Skipping unparseable ECB rate for {}: {}", cube.currency, cube.rate),
        }
    }

    let huf_per_eur = per_eur
        .iter()
        .find(|(currency, _)| currency == "HUF")
        .map(|(_, rate)| rate.clone())
        .ok_or_else(|| ClientError::invalid(SERVICE, "feed has no HUF quote"))?;

    let mut rates = vec![("EUR".to_string(), normalize_rate(&huf_per_eur))];
    rates.extend(
        per_eur
            .into_iter()
            .filter(|(currency, _)| currency != "HUF")
            .map(|(currency, units_per_eur)| (currency, normalize_rate(&(&huf_per_eur / units_per_eur)))),
    );

    Ok(RateTable {
        source: RateSource::Ecb,
        rate_date,
        rates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAILY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
  <gesmes:subject>Reference rates</gesmes:subject>
  <gesmes:Sender>
    <gesmes:name>European Central Bank</gesmes:name>
  </gesmes:Sender>
  <Cube>
    <Cube time='2024-03-01'>
      <Cube currency='USD' rate='1.0800'/>
      <Cube currency='HUF' rate='394.50'/>
      <Cube currency='PLN' rate='4.3250'/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

    #[test]
    fn test_feed_is_crossed_to_forint() {
        let table = parse_daily_feed(DAILY_FEED).unwrap();
        assert_eq!(table.source, RateSource::Ecb);
        assert_eq!(table.rate_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            table.rates,
            vec![
                ("EUR".to_string(), BigDecimal::from_str("394.5").unwrap()),
                ("USD".to_string(), BigDecimal::from_str("365.277778").unwrap()),
                ("PLN".to_string(), BigDecimal::from_str("91.213873").unwrap()),
            ]
        );
    }

    #[test]
    fn test_feed_without_forint_is_rejected() {
        let feed = DAILY_FEED.replace("<Cube currency='HUF' rate='394.50'/>", "");
        let err = parse_daily_feed(&feed).unwrap_err();
        assert!(err.to_string().contains("HUF"));
    }

    #[tokio::test]
    async fn test_fetch_daily_rates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/stats/eurofxref/eurofxref-daily.xml")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(DAILY_FEED)
            .create_async()
            .await;

        let client = EcbClient::new(
            Client::new(),
            format!("{}/stats/eurofxref/eurofxref-daily.xml", server.url()),
        );
        let table = client.fetch_daily_rates().await.unwrap();

        mock.assert_async().await;
        assert_eq!(table.rates[0].0, "EUR");
    }
}
