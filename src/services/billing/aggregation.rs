use std::collections::{BTreeMap, HashMap};

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{InvoiceLineItem, UsageSnapshot, UsageSnapshotEntry, WashEvent};
use crate::utils::financial_validation::round_money;

/// Amounts and frozen usage for one partner invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceComputation {
    pub line_items: Vec<InvoiceLineItem>,
    pub net_total: BigDecimal,
    pub vat_total: BigDecimal,
    pub gross_total: BigDecimal,
    pub snapshot: UsageSnapshot,
}

pub struct AggregationInput<'a> {
    pub events: &'a [WashEvent],
    pub package_names: &'a HashMap<Uuid, String>,
    pub invoice_currency: &'a str,
    /// Cross rate from each source currency into `invoice_currency`.
    pub rates: &'a HashMap<String, BigDecimal>,
    pub vat_rate_percent: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Groups events per service package and unit price, converts each unit price
/// into the invoice currency and applies VAT per line.
///
/// Every event contributes exactly its converted unit price, so the net total
/// equals the sum of the snapshot's converted amounts.
pub fn aggregate(input: &AggregationInput<'_>) -> Result<InvoiceComputation, AppError> {
    if input.events.is_empty() {
        return Err(AppError::Validation("No billable wash events in period".to_string()));
    }

    let currency = input.invoice_currency;
    let mut groups: BTreeMap<(Uuid, String, BigDecimal), Vec<&WashEvent>> = BTreeMap::new();
    for event in input.events {
        groups
            .entry((event.service_package_id, event.currency.clone(), event.price.clone()))
            .or_default()
            .push(event);
    }

    let vat_factor = BigDecimal::from(input.vat_rate_percent) / BigDecimal::from(100);
    let mut line_items = Vec::with_capacity(groups.len());
    let mut entries = Vec::with_capacity(input.events.len());
    let mut used_rates = BTreeMap::new();

    for ((package_id, source_currency, source_price), events) in groups {
        let rate = input.rates.get(&source_currency).ok_or_else(|| {
            AppError::Validation(format!("No exchange rate from {} to {}", source_currency, currency))
        })?;
        used_rates.insert(source_currency.clone(), rate.clone());

        let unit_price = round_money(&(&source_price * rate), currency);
        let quantity = events.len() as i64;
        let net_amount = round_money(&(&unit_price * BigDecimal::from(quantity)), currency);
        let vat_amount = round_money(&(&net_amount * &vat_factor), currency);
        let gross_amount = &net_amount + &vat_amount;

        for event in events {
            // completed_at is always set on COMPLETED events
            let completed_at = event.completed_at.unwrap_or(event.updated_at);
            entries.push(UsageSnapshotEntry {
                wash_event_id: event.id,
                service_package_id: package_id,
                completed_at,
                price: event.price.clone(),
                currency: event.currency.clone(),
                converted_amount: unit_price.clone(),
            });
        }

        line_items.push(InvoiceLineItem {
            service_package_id: package_id,
            description: input
                .package_names
                .get(&package_id)
                .cloned()
                .unwrap_or_else(|| "Wash service".to_string()),
            quantity,
            unit_price,
            net_amount,
            vat_rate_percent: input.vat_rate_percent,
            vat_amount,
            gross_amount,
            source_unit_price: source_price,
            source_currency,
        });
    }

    line_items.sort_by(|a, b| {
        a.description
            .cmp(&b.description)
            .then_with(|| a.unit_price.cmp(&b.unit_price))
    });
    entries.sort_by_key(|e| (e.completed_at, e.wash_event_id));

    let net_total = line_items
        .iter()
        .fold(BigDecimal::zero(), |acc, line| acc + &line.net_amount);
    let vat_total = line_items
        .iter()
        .fold(BigDecimal::zero(), |acc, line| acc + &line.vat_amount);
    let gross_total = &net_total + &vat_total;

    Ok(InvoiceComputation {
        line_items,
        net_total,
        vat_total,
        gross_total,
        snapshot: UsageSnapshot {
            period_start: input.period_start,
            period_end: input.period_end,
            invoice_currency: currency.to_string(),
            rates: used_rates,
            entries,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryMode, WashEventStatus};
    use bigdecimal::One;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn event(package: Uuid, price: &str, currency: &str, minutes: i64) -> WashEvent {
        let at = start() + Duration::minutes(minutes);
        WashEvent {
            id: Uuid::new_v4(),
            network_id: Uuid::nil(),
            location_id: Uuid::nil(),
            service_package_id: package,
            entry_mode: EntryMode::QrDriver,
            status: WashEventStatus::Completed,
            driver_id: None,
            partner_company_id: Some(Uuid::nil()),
            tractor_plate: Some("ABC123".to_string()),
            trailer_plate: None,
            manual_driver_name: None,
            manual_company_name: None,
            price: dec(price),
            currency: currency.to_string(),
            rejection_reason: None,
            invoice_id: None,
            created_by_user_id: Uuid::nil(),
            created_at: at,
            authorized_at: Some(at),
            started_at: Some(at),
            completed_at: Some(at),
            rejected_at: None,
            locked_at: None,
            updated_at: at,
        }
    }

    fn input<'a>(
        events: &'a [WashEvent],
        names: &'a HashMap<Uuid, String>,
        currency: &'a str,
        rates: &'a HashMap<String, BigDecimal>,
    ) -> AggregationInput<'a> {
        AggregationInput {
            events,
            package_names: names,
            invoice_currency: currency,
            rates,
            vat_rate_percent: 27,
            period_start: start(),
            period_end: start() + Duration::days(29),
        }
    }

    #[test]
    fn test_groups_by_package_and_price_in_huf() {
        let exterior = Uuid::new_v4();
        let interior = Uuid::new_v4();
        let names = HashMap::from([
            (exterior, "Exterior wash".to_string()),
            (interior, "Interior wash".to_string()),
        ]);
        let rates = HashMap::from([("HUF".to_string(), BigDecimal::one())]);
        let events = vec![
            event(exterior, "10000", "HUF", 1),
            event(exterior, "10000", "HUF", 2),
            event(exterior, "12000", "HUF", 3),
            event(interior, "8000", "HUF", 4),
        ];

        let result = aggregate(&input(&events, &names, "HUF", &rates)).unwrap();

        let summary: Vec<_> = result
            .line_items
            .iter()
            .map(|l| (l.description.as_str(), l.quantity, l.net_amount.clone(), l.vat_amount.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Exterior wash", 2, dec("20000"), dec("5400")),
                ("Exterior wash", 1, dec("12000"), dec("3240")),
                ("Interior wash", 1, dec("8000"), dec("2160")),
            ]
        );
        assert_eq!(result.net_total, dec("40000"));
        assert_eq!(result.vat_total, dec("10800"));
        assert_eq!(result.gross_total, dec("50800"));
        assert_eq!(result.snapshot.entries.len(), 4);
    }

    #[test]
    fn test_net_total_equals_sum_of_converted_fees() {
        let package = Uuid::new_v4();
        let names = HashMap::new();
        let rates = HashMap::from([
            ("HUF".to_string(), dec("0.002531")),
            ("EUR".to_string(), BigDecimal::one()),
        ]);
        let events = vec![
            event(package, "10000", "HUF", 1),
            event(package, "10000", "HUF", 5),
            event(package, "7990", "HUF", 9),
            event(package, "30.00", "EUR", 12),
        ];

        let result = aggregate(&input(&events, &names, "EUR", &rates)).unwrap();

        let converted_sum = result
            .snapshot
            .entries
            .iter()
            .fold(BigDecimal::zero(), |acc, e| acc + &e.converted_amount);
        assert_eq!(result.net_total, converted_sum);
        assert_eq!(converted_sum, dec("25.31") * BigDecimal::from(2) + dec("20.22") + dec("30.00"));
        assert_eq!(result.gross_total, &result.net_total + &result.vat_total);
        assert_eq!(result.snapshot.rates.len(), 2);
        assert!(result.line_items.iter().all(|l| l.description == "Wash service"));
    }

    #[test]
    fn test_missing_rate_is_rejected() {
        let package = Uuid::new_v4();
        let names = HashMap::new();
        let rates = HashMap::new();
        let events = vec![event(package, "10", "USD", 1)];

        assert!(matches!(
            aggregate(&input(&events, &names, "HUF", &rates)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_period_is_rejected() {
        let names = HashMap::new();
        let rates = HashMap::new();
        assert!(aggregate(&input(&[], &names, "HUF", &rates)).is_err());
    }
}
