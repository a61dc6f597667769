use std::env;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub subscription: SubscriptionConfig,
    pub billing: BillingConfig,
    pub szamlazz: SzamlazzConfig,
    pub billingo: BillingoConfig,
    pub stripe: StripeConfig,
    pub exchange_rates: ExchangeRateConfig,
    pub twilio: TwilioConfig,
    pub vies: ViesConfig,
    pub sms: SmsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime, which doubles as the session timeout.
    pub token_duration_minutes: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub default_trial_days: u32,
    /// Write requests under these prefixes skip the subscription guard.
    pub exempt_path_prefixes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingConfig {
    pub default_provider: String,
    pub vat_rate_percent: u32,
    pub payment_due_days: u32,
    pub default_currency: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SzamlazzConfig {
    pub agent_key: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingoConfig {
    pub api_key: Option<String>,
    pub block_id: Option<i64>,
    pub api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExchangeRateConfig {
    pub primary_source: String,
    pub refresh_cron: String,
    pub mnb_url: String,
    pub ecb_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViesConfig {
    pub api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmsConfig {
    pub code_ttl_seconds: i64,
    pub max_attempts: i32,
}

fn parse_value<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, AppError> {
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::Configuration(format!("{} must be {}", key, expected)))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let lookup = &lookup;

        // App config
        let app_name = lookup("APP_NAME").unwrap_or_else(|| "washnet".to_string());
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        // Database config
        let database_url = optional(lookup, "DATABASE_URL")
            .ok_or_else(|| AppError::Configuration("DATABASE_URL must be set".to_string()))?;
        let max_connections = parse_value(lookup, "DATABASE_MAX_CONNECTIONS", "10", "a valid number")?;
        let run_migrations = parse_value(lookup, "RUN_MIGRATIONS", "true", "true or false")?;

        // Server config
        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = parse_value(lookup, "SERVER_PORT", "8080", "a valid port number")?;
        let cors_origins = list(&lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string()));

        // Auth config
        let jwt_secret = optional(lookup, "JWT_SECRET")
            .ok_or_else(|| AppError::Configuration("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.len() < 32 {
            return Err(AppError::Configuration(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }
        let token_duration_minutes =
            parse_value(lookup, "JWT_ACCESS_TOKEN_DURATION_MINUTES", "60", "a valid number")?;

        // Rate limiting
        let rate_limit_window_ms = parse_value(lookup, "RATE_LIMIT_WINDOW_MS", "60000", "a valid number")?;
        let rate_limit_max_requests = parse_value(lookup, "RATE_LIMIT_MAX_REQUESTS", "120", "a valid number")?;

        // Subscription defaults
        let default_trial_days = parse_value(lookup, "DEFAULT_TRIAL_DAYS", "14", "a valid number")?;
        let exempt_path_prefixes = list(
            &lookup("SUBSCRIPTION_EXEMPT_PATHS")
                .unwrap_or_else(|| "/api/networks/current/subscription".to_string()),
        );

        // Billing
        let default_provider = lookup("BILLING_PROVIDER")
            .unwrap_or_else(|| "szamlazz".to_string())
            .to_lowercase();
        if !matches!(default_provider.as_str(), "szamlazz" | "billingo" | "stripe") {
            return Err(AppError::Configuration(format!(
                "BILLING_PROVIDER must be one of szamlazz, billingo, stripe (got '{}')",
                default_provider
            )));
        }
        let vat_rate_percent = parse_value(lookup, "BILLING_VAT_RATE_PERCENT", "27", "a valid number")?;
        let payment_due_days = parse_value(lookup, "BILLING_PAYMENT_DUE_DAYS", "8", "a valid number")?;
        let default_currency = lookup("BILLING_DEFAULT_CURRENCY")
            .unwrap_or_else(|| "HUF".to_string())
            .to_uppercase();

        // Exchange rates
        let primary_source = lookup("EXCHANGE_RATE_SOURCE")
            .unwrap_or_else(|| "mnb".to_string())
            .to_lowercase();
        if !matches!(primary_source.as_str(), "mnb" | "ecb") {
            return Err(AppError::Configuration(
                "EXCHANGE_RATE_SOURCE must be mnb or ecb".to_string(),
            ));
        }

        let billingo_block_id = match optional(lookup, "BILLINGO_BLOCK_ID") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                AppError::Configuration("BILLINGO_BLOCK_ID must be a valid number".to_string())
            })?),
            None => None,
        };

        Ok(Self {
            app: AppConfig {
                name: app_name,
                environment,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                run_migrations,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig {
                jwt_secret,
                token_duration_minutes,
            },
            rate_limit: RateLimitConfig {
                window_ms: rate_limit_window_ms,
                max_requests: rate_limit_max_requests,
            },
            subscription: SubscriptionConfig {
                default_trial_days,
                exempt_path_prefixes,
            },
            billing: BillingConfig {
                default_provider,
                vat_rate_percent,
                payment_due_days,
                default_currency,
            },
            szamlazz: SzamlazzConfig {
                agent_key: optional(lookup, "SZAMLAZZ_AGENT_KEY"),
                api_url: lookup("SZAMLAZZ_API_URL")
                    .unwrap_or_else(|| "https://www.szamlazz.hu/szamla/".to_string()),
            },
            billingo: BillingoConfig {
                api_key: optional(lookup, "BILLINGO_API_KEY"),
                block_id: billingo_block_id,
                api_url: lookup("BILLINGO_API_URL")
                    .unwrap_or_else(|| "https://api.billingo.hu/v3".to_string()),
            },
            stripe: StripeConfig {
                secret_key: optional(lookup, "STRIPE_SECRET_KEY"),
                webhook_secret: optional(lookup, "STRIPE_WEBHOOK_SECRET"),
                api_url: lookup("STRIPE_API_URL")
                    .unwrap_or_else(|| "https://api.stripe.com/v1".to_string()),
            },
            exchange_rates: ExchangeRateConfig {
                primary_source,
                refresh_cron: lookup("EXCHANGE_RATE_REFRESH_CRON")
                    .unwrap_or_else(|| "0 0 2 * * *".to_string()),
                mnb_url: lookup("MNB_API_URL")
                    .unwrap_or_else(|| "http://www.mnb.hu/arfolyamok.asmx".to_string()),
                ecb_url: lookup("ECB_API_URL").unwrap_or_else(|| {
                    "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml".to_string()
                }),
            },
            twilio: TwilioConfig {
                account_sid: optional(lookup, "TWILIO_ACCOUNT_SID"),
                auth_token: optional(lookup, "TWILIO_AUTH_TOKEN"),
                from_number: optional(lookup, "TWILIO_FROM_NUMBER"),
                api_url: lookup("TWILIO_API_URL")
                    .unwrap_or_else(|| "https://api.twilio.com/2010-04-01".to_string()),
            },
            vies: ViesConfig {
                api_url: lookup("VIES_API_URL").unwrap_or_else(|| {
                    "https://ec.europa.eu/taxation_customs/vies/rest-api".to_string()
                }),
            },
            sms: SmsConfig {
                code_ttl_seconds: parse_value(lookup, "SMS_CODE_TTL_SECONDS", "600", "a valid number")?,
                max_attempts: parse_value(lookup, "SMS_MAX_ATTEMPTS", "5", "a valid number")?,
            },
        })
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> AppSettings {
    AppSettings::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/washnet_test".to_string()),
        "JWT_SECRET" => Some("test-secret-that-is-long-enough-for-hs256".to_string()),
        _ => None,
    })
    .expect("test settings should load")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_applied() {
        let settings = test_settings();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.billing.default_provider, "szamlazz");
        assert_eq!(settings.billing.vat_rate_percent, 27);
        assert_eq!(settings.exchange_rates.refresh_cron, "0 0 2 * * *");
        assert_eq!(settings.auth.token_duration_minutes, 60);
        assert!(!settings.app.is_production());
        assert_eq!(settings.server.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result = AppSettings::from_lookup(lookup_from(&[(
            "JWT_SECRET",
            "test-secret-that-is-long-enough-for-hs256",
        )]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_short_jwt_secret_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("JWT_SECRET", "short"),
        ]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_unknown_billing_provider_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("JWT_SECRET", "test-secret-that-is-long-enough-for-hs256"),
            ("BILLING_PROVIDER", "paypal"),
        ]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("JWT_SECRET", "test-secret-that-is-long-enough-for-hs256"),
            ("ENVIRONMENT", "Production"),
            ("BILLING_PROVIDER", "Billingo"),
            ("BILLINGO_BLOCK_ID", "4411"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("SERVER_PORT", "9000"),
        ]))
        .unwrap();
        assert!(settings.app.is_production());
        assert_eq!(settings.billing.default_provider, "billingo");
        assert_eq!(settings.billingo.block_id, Some(4411));
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.cors_origins.len(), 2);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("JWT_SECRET", "test-secret-that-is-long-enough-for-hs256"),
            ("SERVER_PORT", "not-a-port"),
        ]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
