use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;
use uuid::Uuid;

use crate::db::repositories::NetworkRepository;
use crate::error::AppError;
use crate::models::{
    CreateNetworkRequest, InvoiceProviderKind, Network, NetworkSubscription, SubscriptionStatus,
    SubscriptionStatusResponse, UpdateSubscriptionRequest,
};
use crate::utils::financial_validation::validate_currency_code;

/// Outcome of checking a network's subscription against the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAccess {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl WriteAccess {
    fn granted() -> Self {
        Self { allowed: true, reason: None }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a network may perform write operations at `now`.
///
/// ACTIVE passes until `subscription_end_at` (open-ended when unset), TRIAL
/// passes until `trial_ends_at`, SUSPENDED and CANCELLED never pass.
pub fn evaluate_write_access(
    status: SubscriptionStatus,
    trial_ends_at: Option<DateTime<Utc>>,
    subscription_end_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> WriteAccess {
    match status {
        SubscriptionStatus::Active => match subscription_end_at {
            Some(end) if end < now => WriteAccess::denied(format!("Subscription ended at {}", end)),
            _ => WriteAccess::granted(),
        },
        SubscriptionStatus::Trial => match trial_ends_at {
            Some(end) if end < now => WriteAccess::denied(format!("Trial expired at {}", end)),
            Some(_) => WriteAccess::granted(),
            None => WriteAccess::denied("Trial has no end date"),
        },
        SubscriptionStatus::Suspended => WriteAccess::denied("Subscription is suspended"),
        SubscriptionStatus::Cancelled => WriteAccess::denied("Subscription is cancelled"),
    }
}

/// Whole days left until the relevant deadline, if one applies.
fn days_remaining(subscription: &NetworkSubscription, now: DateTime<Utc>) -> Option<i64> {
    let deadline = match subscription.subscription_status {
        SubscriptionStatus::Trial => subscription.trial_ends_at,
        SubscriptionStatus::Active => subscription.subscription_end_at,
        _ => None,
    }?;
    Some((deadline - now).num_days().max(0))
}

/// Where the subscription guard reads network state from.
#[async_trait]
pub trait NetworkStatusSource: Send + Sync {
    async fn subscription(&self, network_id: &Uuid) -> Result<Option<NetworkSubscription>, AppError>;
}

#[async_trait]
impl NetworkStatusSource for NetworkRepository {
    async fn subscription(&self, network_id: &Uuid) -> Result<Option<NetworkSubscription>, AppError> {
        self.get_subscription(network_id).await
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    networks: NetworkRepository,
    default_trial_days: u32,
    default_currency: String,
}

impl SubscriptionService {
    pub fn new(networks: NetworkRepository, default_trial_days: u32, default_currency: String) -> Self {
        Self {
            networks,
            default_trial_days,
            default_currency,
        }
    }

    pub async fn get_status(&self, network_id: &Uuid) -> Result<SubscriptionStatusResponse, AppError> {
        let subscription = self
            .networks
            .get_subscription(network_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Network {} not found", network_id)))?;

        Ok(status_response(&subscription, Utc::now()))
    }

    /// Creates a tenant in TRIAL for the configured number of days.
    pub async fn create_network(&self, request: &CreateNetworkRequest) -> Result<Network, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Network name is required".to_string()));
        }
        let slug = request.slug.trim().to_lowercase();
        if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(AppError::Validation(format!("Invalid network slug '{}'", request.slug)));
        }
        let currency = match request.billing_currency.as_deref() {
            Some(code) => validate_currency_code(code)?,
            None => self.default_currency.clone(),
        };
        let provider = request
            .invoice_provider
            .as_deref()
            .map(str::parse::<InvoiceProviderKind>)
            .transpose()?;

        let trial_ends_at = Utc::now() + Duration::days(i64::from(self.default_trial_days));
        let network = self
            .networks
            .create(name, &slug, &currency, provider.map(|p| p.as_str()), trial_ends_at)
            .await?;

        info!("Created network {} ({}) with trial until {}", network.id, network.slug, trial_ends_at);
        Ok(network)
    }

    pub async fn update_subscription(
        &self,
        network_id: &Uuid,
        request: &UpdateSubscriptionRequest,
    ) -> Result<Network, AppError> {
        if request.status == SubscriptionStatus::Trial && request.trial_ends_at.is_none() {
            return Err(AppError::Validation("trialEndsAt is required for TRIAL".to_string()));
        }
        if let (Some(end), SubscriptionStatus::Active) = (request.subscription_end_at, request.status) {
            if end < Utc::now() {
                return Err(AppError::Validation("subscriptionEndAt is in the past".to_string()));
            }
        }

        let network = self
            .networks
            .update_subscription(
                network_id,
                request.status,
                request.trial_ends_at,
                request.subscription_end_at,
            )
            .await?;

        info!("Network {} subscription set to {}", network_id, request.status);
        Ok(network)
    }
}

fn status_response(subscription: &NetworkSubscription, now: DateTime<Utc>) -> SubscriptionStatusResponse {
    let access = evaluate_write_access(
        subscription.subscription_status,
        subscription.trial_ends_at,
        subscription.subscription_end_at,
        now,
    );

    SubscriptionStatusResponse {
        network_id: subscription.id,
        status: subscription.subscription_status,
        trial_ends_at: subscription.trial_ends_at,
        subscription_end_at: subscription.subscription_end_at,
        write_access: access.allowed,
        reason: access.reason,
        days_remaining: days_remaining(subscription, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expired_trial_blocks_writes() {
        let access = evaluate_write_access(
            SubscriptionStatus::Trial,
            Some(now() - Duration::seconds(1)),
            None,
            now(),
        );
        assert!(!access.allowed);
        assert!(access.reason.unwrap().contains("Trial expired"));
    }

    #[test]
    fn test_running_trial_allows_writes() {
        let access = evaluate_write_access(SubscriptionStatus::Trial, Some(now() + Duration::days(3)), None, now());
        assert_eq!(access, WriteAccess::granted());
    }

    #[test]
    fn test_trial_without_end_is_blocked() {
        assert!(!evaluate_write_access(SubscriptionStatus::Trial, None, None, now()).allowed);
    }

    #[test]
    fn test_active_subscription() {
        assert!(evaluate_write_access(SubscriptionStatus::Active, None, None, now()).allowed);
        assert!(evaluate_write_access(SubscriptionStatus::Active, None, Some(now() + Duration::days(30)), now()).allowed);
        assert!(!evaluate_write_access(SubscriptionStatus::Active, None, Some(now() - Duration::days(1)), now()).allowed);
    }

    #[test]
    fn test_suspended_and_cancelled_never_pass() {
        let future = Some(now() + Duration::days(365));
        for status in [SubscriptionStatus::Suspended, SubscriptionStatus::Cancelled] {
            assert!(!evaluate_write_access(status, future, future, now()).allowed);
        }
    }

    #[test]
    fn test_status_response_counts_days() {
        let subscription = NetworkSubscription {
            id: Uuid::new_v4(),
            subscription_status: SubscriptionStatus::Trial,
            trial_ends_at: Some(now() + Duration::days(5) + Duration::hours(3)),
            subscription_end_at: None,
        };
        let response = status_response(&subscription, now());
        assert!(response.write_access);
        assert_eq!(response.days_remaining, Some(5));
        assert_eq!(response.reason, None);
    }
}
