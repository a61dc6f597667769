use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clients::TwilioClient;
use crate::config::settings::SmsConfig;
use crate::db::repositories::{DriverRepository, PhoneVerification, PhoneVerificationRepository};
use crate::error::AppError;
use crate::models::{SendCodeResponse, VerifyCodeResponse};
use crate::utils::input_validation::normalize_phone;

const CODE_LENGTH: usize = 6;

fn generate_code() -> String {
    let value: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:0width$}", value, width = CODE_LENGTH)
}

pub(crate) fn hash_code(phone: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeCheck {
    Accepted,
    Expired,
    TooManyAttempts,
    Mismatch,
}

/// Outcome once the attempt has been counted atomically. A lost claim means the
/// budget ran out, possibly to concurrent requests.
pub(crate) fn settle_attempt(check: CodeCheck, claimed_attempts: Option<i32>) -> CodeCheck {
    match (check, claimed_attempts) {
        (CodeCheck::Accepted | CodeCheck::Mismatch, None) => CodeCheck::TooManyAttempts,
        (check, _) => check,
    }
}

pub(crate) fn check_code(
    verification: &PhoneVerification,
    code: &str,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> CodeCheck {
    if verification.expires_at < now {
        return CodeCheck::Expired;
    }
    if verification.attempts >= max_attempts {
        return CodeCheck::TooManyAttempts;
    }
    let submitted = hash_code(&verification.phone, code.trim());
    if bool::from(submitted.as_bytes().ct_eq(verification.code_hash.as_bytes())) {
        CodeCheck::Accepted
    } else {
        CodeCheck::Mismatch
    }
}

#[derive(Clone)]
pub struct SmsVerificationService {
    verifications: PhoneVerificationRepository,
    drivers: DriverRepository,
    twilio: Option<TwilioClient>,
    config: SmsConfig,
}

impl SmsVerificationService {
    pub fn new(
        verifications: PhoneVerificationRepository,
        drivers: DriverRepository,
        twilio: Option<TwilioClient>,
        config: SmsConfig,
    ) -> Self {
        Self {
            verifications,
            drivers,
            twilio,
            config,
        }
    }

    pub async fn send_code(&self, raw_phone: &str) -> Result<SendCodeResponse, AppError> {
        let phone = normalize_phone(raw_phone)?;
        let twilio = self
            .twilio
            .as_ref()
            .ok_or_else(|| AppError::Configuration("SMS delivery is not configured".to_string()))?;

        let code = generate_code();
        let expires_at = Utc::now() + Duration::seconds(self.config.code_ttl_seconds);
        self.verifications
            .create(&phone, &hash_code(&phone, &code), expires_at)
            .await?;

        let body = format!(
            "Your verification code is {}. It expires in {} minutes.",
            code,
            self.config.code_ttl_seconds / 60
        );
        twilio.send_sms(&phone, &body).await?;

        info!("Verification code sent to {}", mask_phone(&phone));
        Ok(SendCodeResponse { phone, expires_at })
    }

    pub async fn verify_code(
        &self,
        network_id: &Uuid,
        raw_phone: &str,
        code: &str,
    ) -> Result<VerifyCodeResponse, AppError> {
        let phone = normalize_phone(raw_phone)?;
        let verification = self
            .verifications
            .latest_pending(&phone)
            .await?
            .ok_or_else(|| AppError::NotFound("No pending verification for this phone".to_string()))?;

        let max_attempts = self.config.max_attempts;
        let mut outcome = check_code(&verification, code, max_attempts, Utc::now());
        if matches!(outcome, CodeCheck::Accepted | CodeCheck::Mismatch) {
            let claimed = self
                .verifications
                .claim_attempt(&verification.id, max_attempts)
                .await?;
            outcome = settle_attempt(outcome, claimed);
        }

        match outcome {
            CodeCheck::Accepted => {}
            CodeCheck::Expired => {
                return Err(AppError::Validation("Verification code has expired".to_string()));
            }
            CodeCheck::TooManyAttempts => {
                return Err(AppError::TooManyRequests(
                    "Too many verification attempts, request a new code".to_string(),
                ));
            }
            CodeCheck::Mismatch => {
                warn!("Wrong verification code for {}", mask_phone(&phone));
                return Err(AppError::Validation("Invalid verification code".to_string()));
            }
        }

        if !self.verifications.mark_verified(&verification.id).await? {
            return Err(AppError::Conflict("Verification code was already used".to_string()));
        }
        let drivers_updated = self.drivers.mark_phone_verified(network_id, &phone).await?;
        info!(
            "Phone {} verified in network {}, {} driver(s) updated",
            mask_phone(&phone),
            network_id,
            drivers_updated
        );

        Ok(VerifyCodeResponse {
            phone,
            verified: true,
            drivers_updated,
        })
    }
}

fn mask_phone(phone: &str) -> String {
    let visible = phone.len().saturating_sub(4);
    format!("{}{}", "*".repeat(visible), &phone[visible..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verification(code: &str, attempts: i32, expires_in: Duration) -> PhoneVerification {
        let phone = "+36301234567".to_string();
        PhoneVerification {
            id: Uuid::new_v4(),
            code_hash: hash_code(&phone, code),
            phone,
            expires_at: Utc::now() + expires_in,
            attempts,
            verified_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_binds_code_to_phone() {
        assert_eq!(hash_code("+36301234567", "123456"), hash_code("+36301234567", "123456"));
        assert_ne!(hash_code("+36301234567", "123456"), hash_code("+36301234568", "123456"));
        assert_eq!(hash_code("+36301234567", "123456").len(), 64);
    }

    #[test]
    fn test_check_code_outcomes() {
        let now = Utc::now();
        assert_eq!(check_code(&verification("123456", 0, Duration::minutes(5)), "123456", 5, now), CodeCheck::Accepted);
        assert_eq!(check_code(&verification("123456", 0, Duration::minutes(5)), " 123456 ", 5, now), CodeCheck::Accepted);
        assert_eq!(check_code(&verification("123456", 0, Duration::minutes(5)), "654321", 5, now), CodeCheck::Mismatch);
        assert_eq!(check_code(&verification("123456", 5, Duration::minutes(5)), "123456", 5, now), CodeCheck::TooManyAttempts);
        assert_eq!(check_code(&verification("123456", 0, Duration::minutes(-1)), "123456", 5, now), CodeCheck::Expired);
    }

    #[test]
    fn test_lost_attempt_claim_is_too_many_attempts() {
        assert_eq!(settle_attempt(CodeCheck::Accepted, Some(5)), CodeCheck::Accepted);
        assert_eq!(settle_attempt(CodeCheck::Mismatch, Some(1)), CodeCheck::Mismatch);
        // A correct guess still loses once concurrent requests used up the budget
        assert_eq!(settle_attempt(CodeCheck::Accepted, None), CodeCheck::TooManyAttempts);
        assert_eq!(settle_attempt(CodeCheck::Mismatch, None), CodeCheck::TooManyAttempts);
    }

    #[test]
    fn test_mask_phone_keeps_last_digits() {
        assert_eq!(mask_phone("+36301234567"), "********4567");
    }
}
