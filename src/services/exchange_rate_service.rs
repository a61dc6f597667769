use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, One};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::clients::{ClientError, EcbClient, MnbClient};
use crate::db::repositories::ExchangeRateRepository;
use crate::error::AppError;
use crate::models::{ConversionResponse, ExchangeRate, RateSource, RateTable};
use crate::utils::financial_validation::{
    normalize_rate, round_money, validate_conversion_amount, validate_currency_code, validate_rate,
};

pub const BASE_CURRENCY: &str = "HUF";

/// Forint per unit, used when neither feed nor the database has rates.
const FALLBACK_RATES: &[(&str, &str)] = &[
    ("EUR", "395.00"),
    ("USD", "365.00"),
    ("GBP", "460.00"),
    ("CHF", "410.00"),
    ("CZK", "15.80"),
    ("PLN", "91.50"),
    ("RON", "79.40"),
];

/// Drops rates that fail validation and normalizes the rest. Only these are cached and stored.
pub(crate) fn accepted_rates(table: RateTable) -> RateTable {
    let rates = table
        .rates
        .into_iter()
        .filter_map(|(currency, rate)| match validate_rate(&currency, &rate) {
            Ok(()) => Some((currency, normalize_rate(&rate))),
            Err(e) => {
                warn!("Skipping {} rate from {}: {}", currency, table.source.as_str(), e);
                None
            }
        })
        .collect();
    RateTable { rates, ..table }
}

pub fn fallback_rates() -> HashMap<String, BigDecimal> {
    FALLBACK_RATES
        .iter()
        .filter_map(|(code, rate)| BigDecimal::from_str(rate).ok().map(|r| (code.to_string(), r)))
        .collect()
}

fn huf_per_unit(rates: &HashMap<String, BigDecimal>, currency: &str) -> Result<BigDecimal, AppError> {
    if currency == BASE_CURRENCY {
        return Ok(BigDecimal::one());
    }
    rates
        .get(currency)
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("No exchange rate for {}", currency)))
}

/// Units of `to` per unit of `from`, pivoting through HUF.
pub fn cross_rate(rates: &HashMap<String, BigDecimal>, from: &str, to: &str) -> Result<BigDecimal, AppError> {
    if from == to {
        return Ok(BigDecimal::one());
    }
    let from_huf = huf_per_unit(rates, from)?;
    let to_huf = huf_per_unit(rates, to)?;
    Ok(normalize_rate(&(from_huf / to_huf)))
}

/// Converts through HUF and rounds to the minor unit of `to`.
pub fn convert_with(
    rates: &HashMap<String, BigDecimal>,
    amount: &BigDecimal,
    from: &str,
    to: &str,
) -> Result<BigDecimal, AppError> {
    if from == to {
        return Ok(round_money(amount, to));
    }
    let from_huf = huf_per_unit(rates, from)?;
    let to_huf = huf_per_unit(rates, to)?;
    Ok(round_money(&(amount * from_huf / to_huf), to))
}

pub struct ExchangeRateService {
    repository: ExchangeRateRepository,
    mnb: MnbClient,
    ecb: EcbClient,
    primary: RateSource,
    cache: RwLock<HashMap<String, BigDecimal>>,
}

impl ExchangeRateService {
    pub fn new(repository: ExchangeRateRepository, mnb: MnbClient, ecb: EcbClient, primary: RateSource) -> Self {
        Self {
            repository,
            mnb,
            ecb,
            primary,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn fetch(&self, source: RateSource) -> Result<RateTable, ClientError> {
        match source {
            RateSource::Ecb => self.ecb.fetch_daily_rates().await,
            _ => self.mnb.fetch_current_rates().await,
        }
    }

    /// Pulls fresh rates from the primary feed, then the secondary one, and
    /// falls back to stored or hardcoded rates when both fail.
    pub async fn refresh_rates(&self) -> Result<RateSource, AppError> {
        let secondary = match self.primary {
            RateSource::Ecb => RateSource::Mnb,
            _ => RateSource::Ecb,
        };

        let mut fetched = None;
        for source in [self.primary, secondary] {
            match self.fetch(source).await {
                Ok(table) if !table.rates.is_empty() => {
                    fetched = Some(table);
                    break;
                }
                Ok(_) => warn!("{} returned no exchange rates", source.as_str()),
                Err(e) => warn!("Exchange rate fetch from {} failed: {}", source.as_str(), e),
            }
        }

        let Some(table) = fetched else {
            let source = self.reload_from_store().await?;
            warn!("All exchange rate feeds failed, serving {} rates", source.as_str());
            return Ok(source);
        };

        let table = accepted_rates(table);
        if let Err(e) = self.repository.upsert_table(&table).await {
            error!("Failed to persist {} exchange rates: {}", table.source.as_str(), e);
        }

        let count = table.rates.len();
        *self.cache.write().await = table.rates.iter().cloned().collect();
        info!(
            "Refreshed {} exchange rates from {} for {}",
            count,
            table.source.as_str(),
            table.rate_date
        );
        Ok(table.source)
    }

    async fn reload_from_store(&self) -> Result<RateSource, AppError> {
        let stored = self.repository.latest().await.unwrap_or_else(|e| {
            error!("Failed to load stored exchange rates: {}", e);
            Vec::new()
        });

        let (rates, source) = if stored.is_empty() {
            (fallback_rates(), RateSource::Fallback)
        } else {
            let source = stored.first().map(|r| r.source).unwrap_or(RateSource::Fallback);
            (
                stored.into_iter().map(|r| (r.currency, r.huf_per_unit)).collect(),
                source,
            )
        };

        *self.cache.write().await = rates;
        Ok(source)
    }

    async fn rates(&self) -> Result<HashMap<String, BigDecimal>, AppError> {
        {
            let cache = self.cache.read().await;
            if !cache.is_empty() {
                return Ok(cache.clone());
            }
        }
        self.reload_from_store().await?;
        Ok(self.cache.read().await.clone())
    }

    pub async fn get_rate(&self, from: &str, to: &str) -> Result<BigDecimal, AppError> {
        let from = validate_currency_code(from)?;
        let to = validate_currency_code(to)?;
        cross_rate(&self.rates().await?, &from, &to)
    }

    pub async fn convert(&self, amount: &BigDecimal, from: &str, to: &str) -> Result<BigDecimal, AppError> {
        validate_conversion_amount(amount)?;
        let from = validate_currency_code(from)?;
        let to = validate_currency_code(to)?;
        convert_with(&self.rates().await?, amount, &from, &to)
    }

    pub async fn conversion(&self, amount: &BigDecimal, from: &str, to: &str) -> Result<ConversionResponse, AppError> {
        validate_conversion_amount(amount)?;
        let from = validate_currency_code(from)?;
        let to = validate_currency_code(to)?;
        let rates = self.rates().await?;

        Ok(ConversionResponse {
            amount: amount.clone(),
            rate: cross_rate(&rates, &from, &to)?,
            converted: convert_with(&rates, amount, &from, &to)?,
            from,
            to,
        })
    }

    /// Snapshot of the cross rates to `target` for the given currencies.
    pub async fn rates_to(&self, currencies: &[String], target: &str) -> Result<HashMap<String, BigDecimal>, AppError> {
        let rates = self.rates().await?;
        currencies
            .iter()
            .map(|c| cross_rate(&rates, c, target).map(|r| (c.clone(), r)))
            .collect()
    }

    /// Latest stored rates, or the fallback table stamped as such.
    pub async fn current_rates(&self) -> Result<Vec<ExchangeRate>, AppError> {
        let stored = self.repository.latest().await?;
        if !stored.is_empty() {
            return Ok(stored);
        }

        let now = Utc::now();
        let mut rates: Vec<ExchangeRate> = fallback_rates()
            .into_iter()
            .map(|(currency, huf_per_unit)| ExchangeRate {
                currency,
                huf_per_unit,
                source: RateSource::Fallback,
                rate_date: now.date_naive(),
                fetched_at: now,
            })
            .collect();
        rates.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(rates)
    }
}

/// Schedules the nightly refresh and returns the running scheduler.
pub async fn start_refresh_job(service: Arc<ExchangeRateService>, cron: &str) -> Result<JobScheduler, AppError> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create job scheduler: {}", e)))?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = service.refresh_rates().await {
                error!("Scheduled exchange rate refresh failed: {}", e);
            }
        })
    })
    .map_err(|e| AppError::Configuration(format!("Invalid exchange rate cron '{}': {}", cron, e)))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to schedule exchange rate refresh: {}", e)))?;
    scheduler
        .start()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to start job scheduler: {}", e)))?;

    info!("Exchange rate refresh scheduled with '{}'", cron);
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rates() -> HashMap<String, BigDecimal> {
        let mut rates = HashMap::new();
        rates.insert("EUR".to_string(), BigDecimal::from_str("395.12").unwrap());
        rates.insert("USD".to_string(), BigDecimal::from_str("364.80").unwrap());
        rates.insert("JPY".to_string(), BigDecimal::from_str("2.4512").unwrap());
        rates
    }

    #[test]
    fn test_rejected_rates_are_neither_cached_nor_stored() {
        let table = RateTable {
            source: RateSource::Mnb,
            rate_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            rates: vec![
                ("EUR".to_string(), BigDecimal::from_str("395.123456789").unwrap()),
                ("USD".to_string(), BigDecimal::from(0)),
                ("GBP".to_string(), BigDecimal::from(-460)),
            ],
        };

        let accepted = accepted_rates(table);
        assert_eq!(accepted.source, RateSource::Mnb);
        assert_eq!(accepted.rates.len(), 1);
        assert_eq!(accepted.rates[0].0, "EUR");
        assert_eq!(accepted.rates[0].1, normalize_rate(&BigDecimal::from_str("395.123456789").unwrap()));
    }

    #[test]
    fn test_convert_huf_to_eur_rounds_to_cents() {
        let converted = convert_with(&rates(), &BigDecimal::from(10000), "HUF", "EUR").unwrap();
        assert_eq!(converted, BigDecimal::from_str("25.31").unwrap());
    }

    #[test]
    fn test_convert_to_huf_has_no_decimals() {
        let converted = convert_with(&rates(), &BigDecimal::from_str("25.40").unwrap(), "EUR", "HUF").unwrap();
        assert_eq!(converted, BigDecimal::from(10036));
    }

    #[test]
    fn test_cross_rate_pivots_through_huf() {
        let rate = cross_rate(&rates(), "EUR", "USD").unwrap();
        assert_eq!(rate, BigDecimal::from_str("1.083114").unwrap());
        assert_eq!(cross_rate(&rates(), "EUR", "EUR").unwrap(), BigDecimal::one());
    }

    #[test]
    fn test_unknown_currency_is_rejected() {
        assert!(matches!(
            convert_with(&rates(), &BigDecimal::from(1), "HUF", "XAU"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_fallback_table_covers_eur() {
        let fallback = fallback_rates();
        assert_eq!(fallback.len(), FALLBACK_RATES.len());
        assert!(fallback.contains_key("EUR"));
    }

    proptest! {
        #[test]
        fn prop_huf_eur_huf_round_trip(amount in 0i64..50_000_000) {
            let rates = rates();
            let huf = BigDecimal::from(amount);
            let eur = convert_with(&rates, &huf, "HUF", "EUR").unwrap();
            let back = convert_with(&rates, &eur, "EUR", "HUF").unwrap();

            // Half a cent at the EUR rate plus half a forint.
            let tolerance = rates["EUR"].clone() / BigDecimal::from(200) + BigDecimal::one();
            prop_assert!((back - huf).abs() <= tolerance);
        }
    }
}
