use crate::error::AppError;
use crate::models::auth_jwt_claims::Claims;
use crate::models::{AuthenticatedUser, UserRole};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, error, info, trace};
use std::sync::OnceLock;
use uuid::Uuid;

// Default access token lifetime in minutes
pub const DEFAULT_TOKEN_DURATION_MINUTES: i64 = 60;

// Issuer name for JWT tokens
pub const JWT_ISSUER: &str = "washnet";

// Global static holders for JWT keys
static JWT_ENCODING_KEY: OnceLock<EncodingKey> = OnceLock::new();
static JWT_DECODING_KEY: OnceLock<DecodingKey> = OnceLock::new();

/// Initialize the JWT keys from the secret
/// This should be called once at application startup
pub fn init_jwt_keys(jwt_secret_str: &str) -> Result<(), AppError> {
    info!("Initializing JWT keys from configuration");

    let jwt_secret = jwt_secret_str.as_bytes();

    JWT_ENCODING_KEY.set(EncodingKey::from_secret(jwt_secret))
        .map_err(|_| AppError::Internal("JWT_ENCODING_KEY was already initialized".to_string()))?;

    JWT_DECODING_KEY.set(DecodingKey::from_secret(jwt_secret))
        .map_err(|_| AppError::Internal("JWT_DECODING_KEY was already initialized".to_string()))?;

    info!("JWT keys initialized successfully");
    Ok(())
}

fn get_encoding_key() -> Result<&'static EncodingKey, AppError> {
    JWT_ENCODING_KEY.get()
        .ok_or_else(|| AppError::Configuration("JWT encoding key not initialized.".to_string()))
}

fn get_decoding_key() -> Result<&'static DecodingKey, AppError> {
    JWT_DECODING_KEY.get()
        .ok_or_else(|| AppError::Configuration("JWT decoding key not initialized.".to_string()))
}

/// Issues an access token carrying the user's role and tenant context.
pub fn generate_token(user: &AuthenticatedUser, token_duration_minutes: i64) -> Result<String, AppError> {
    let iat = Utc::now();
    let lifetime = Duration::try_minutes(token_duration_minutes)
        .filter(|d| *d > Duration::zero())
        .unwrap_or_else(|| Duration::minutes(DEFAULT_TOKEN_DURATION_MINUTES));
    let exp = iat
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::Internal("Failed to calculate JWT expiration time".to_string()))?;

    let claims = Claims {
        sub: user.user_id.to_string(),
        exp: exp.timestamp() as usize,
        iat: iat.timestamp() as usize,
        iss: Some(JWT_ISSUER.to_string()),
        role: user.role.as_str().to_string(),
        network_id: user.network_id.map(|id| id.to_string()),
        location_id: user.location_id.map(|id| id.to_string()),
        partner_company_id: user.partner_company_id.map(|id| id.to_string()),
        driver_id: user.driver_id.map(|id| id.to_string()),
        jti: Uuid::new_v4().to_string(),
    };

    debug!("Generating JWT token for user {} (exp: {})", user.user_id, exp);
    encode(&Header::new(Algorithm::HS256), &claims, get_encoding_key()?)
        .map_err(|e| {
            error!("Failed to generate JWT token: {}", e);
            AppError::Internal(format!("Token generation failed: {}", e))
        })
}

/// Verify a JWT token and extract the claims
pub fn verify_token(token: &str) -> Result<Claims, AppError> {
    trace!("Verifying JWT token");

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[JWT_ISSUER]);

    let token_data = decode::<Claims>(token, get_decoding_key()?, &validation)
        .map_err(|err| {
            debug!("JWT validation failed: {}", err);
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Auth("Token has expired".to_string())
                },
                jsonwebtoken::errors::ErrorKind::InvalidToken => AppError::Auth("Invalid token format".to_string()),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AppError::Auth("Invalid token signature".to_string()),
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AppError::Auth("Invalid token issuer".to_string()),
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => AppError::Auth("Token not yet valid (immature)".to_string()),
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => AppError::Auth(format!("Token missing required claim: {}", claim)),
                _ => AppError::Auth(format!("Token validation failed: {:?}", err.kind())),
            }
        })?;

    debug!("JWT token verified successfully for user {}", token_data.claims.sub);
    Ok(token_data.claims)
}

/// Turns verified claims into the request identity.
pub fn claims_to_user(claims: &Claims) -> Result<AuthenticatedUser, AppError> {
    let parse_id = |field: &str, value: &Option<String>| -> Result<Option<Uuid>, AppError> {
        value
            .as_deref()
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::Auth(format!("Invalid {} in token", field)))
            })
            .transpose()
    };

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Auth("Invalid subject in token".to_string()))?;
    let role: UserRole = claims
        .role
        .parse()
        .map_err(|_| AppError::Auth(format!("Unknown role in token: {}", claims.role)))?;

    Ok(AuthenticatedUser {
        user_id,
        role,
        network_id: parse_id("networkId", &claims.network_id)?,
        location_id: parse_id("locationId", &claims.location_id)?,
        partner_company_id: parse_id("partnerCompanyId", &claims.partner_company_id)?,
        driver_id: parse_id("driverId", &claims.driver_id)?,
    })
}

#[cfg(test)]
pub(crate) const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

/// Initializes the process-wide keys for tests; safe to call repeatedly.
#[cfg(test)]
pub(crate) fn init_test_keys() {
    let _ = init_jwt_keys(TEST_JWT_SECRET);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Operator,
            network_id: Some(Uuid::new_v4()),
            location_id: Some(Uuid::new_v4()),
            partner_company_id: None,
            driver_id: None,
        }
    }

    #[test]
    fn test_token_round_trip_keeps_tenant_context() {
        init_test_keys();
        let user = operator();

        let token = generate_token(&user, 60).unwrap();
        let claims = verify_token(&token).unwrap();
        let decoded = claims_to_user(&claims).unwrap();

        assert_eq!(claims.iss.as_deref(), Some(JWT_ISSUER));
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(decoded.user_id, user.user_id);
        assert_eq!(decoded.role, UserRole::Operator);
        assert_eq!(decoded.network_id, user.network_id);
        assert_eq!(decoded.location_id, user.location_id);
        assert_eq!(decoded.driver_id, None);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        init_test_keys();
        let token = generate_token(&operator(), 60).unwrap();
        let (unsigned, _) = token.rsplit_once('.').unwrap();
        let tampered = format!("{}.invalidsignature", unsigned);

        assert!(matches!(verify_token(&tampered), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_unknown_role_claim_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            iat: 0,
            iss: None,
            role: "SUPERUSER".to_string(),
            network_id: None,
            location_id: None,
            partner_company_id: None,
            driver_id: None,
            jti: "x".to_string(),
        };
        assert!(matches!(claims_to_user(&claims), Err(AppError::Auth(_))));
    }
}
