use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    Mnb,
    Ecb,
    Fallback,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Mnb => "MNB",
            RateSource::Ecb => "ECB",
            RateSource::Fallback => "FALLBACK",
        }
    }
}

impl TryFrom<String> for RateSource {
    type Error = crate::error::AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "MNB" => Ok(RateSource::Mnb),
            "ECB" => Ok(RateSource::Ecb),
            "FALLBACK" => Ok(RateSource::Fallback),
            other => Err(crate::error::AppError::Validation(format!(
                "Unknown rate source: {}",
                other
            ))),
        }
    }
}

/// Forint value of one unit of `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub currency: String,
    pub huf_per_unit: BigDecimal,
    #[sqlx(try_from = "String")]
    pub source: RateSource,
    pub rate_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

/// A full set of rates from one fetch.
#[derive(Debug, Clone)]
pub struct RateTable {
    pub source: RateSource,
    pub rate_date: NaiveDate,
    pub rates: Vec<(String, BigDecimal)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuery {
    pub amount: BigDecimal,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub amount: BigDecimal,
    pub from: String,
    pub to: String,
    pub rate: BigDecimal,
    pub converted: BigDecimal,
}
