pub mod jwt;
pub mod password;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::db::repositories::UserRepository;
use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub role: UserRole,
    pub user: AuthenticatedUser,
}

/// Password login issuing short-lived access tokens.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    token_duration_minutes: i64,
}

impl AuthService {
    pub fn new(users: UserRepository, token_duration_minutes: i64) -> Self {
        Self {
            users,
            token_duration_minutes,
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AppError> {
        let invalid = || AppError::Auth("Invalid email or password".to_string());

        let user = match self.users.get_by_email(request.email.trim()).await? {
            Some(user) => user,
            None => {
                // Same work as a real check so unknown emails are not distinguishable by timing
                let _ = password::verify_password(&request.password, DUMMY_HASH);
                return Err(invalid());
            }
        };

        if !password::verify_password(&request.password, &user.password_hash) {
            warn!("Failed login for user {}", user.id);
            return Err(invalid());
        }
        if !user.is_active {
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }

        let identity = AuthenticatedUser {
            user_id: user.id,
            role: user.role,
            network_id: user.network_id,
            location_id: user.location_id,
            partner_company_id: user.partner_company_id,
            driver_id: user.driver_id,
        };
        let access_token = jwt::generate_token(&identity, self.token_duration_minutes)?;
        self.users.touch_last_login(&user.id).await?;

        info!("User {} logged in as {}", user.id, user.role);
        Ok(LoginResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.token_duration_minutes * 60,
            role: identity.role,
            user: identity,
        })
    }
}

const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$0Yl5Hn2Wq8gmhQ9S8qT0qfXz2cUukz4S7m2ZUFFRb0A";
