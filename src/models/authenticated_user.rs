use actix_web::{dev::Payload, Error, FromRequest, HttpRequest, HttpMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::{ready, Ready};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    PlatformAdmin,
    NetworkAdmin,
    Operator,
    Partner,
    Driver,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::PlatformAdmin => "PLATFORM_ADMIN",
            UserRole::NetworkAdmin => "NETWORK_ADMIN",
            UserRole::Operator => "OPERATOR",
            UserRole::Partner => "PARTNER",
            UserRole::Driver => "DRIVER",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLATFORM_ADMIN" => Ok(UserRole::PlatformAdmin),
            "NETWORK_ADMIN" => Ok(UserRole::NetworkAdmin),
            "OPERATOR" => Ok(UserRole::Operator),
            "PARTNER" => Ok(UserRole::Partner),
            "DRIVER" => Ok(UserRole::Driver),
            other => Err(AppError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identity and tenant context of the caller, placed in request extensions by
/// the authentication middleware.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub network_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub partner_company_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
}

impl AuthenticatedUser {
    pub fn is_platform_admin(&self) -> bool {
        self.role == UserRole::PlatformAdmin
    }

    /// The tenant the caller acts in. Every tenant-scoped operation goes through here.
    pub fn require_network(&self) -> Result<Uuid, AppError> {
        self.network_id
            .ok_or_else(|| AppError::Forbidden("No network context for this account".to_string()))
    }

    pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
            ready(Ok(user.clone()))
        } else {
            ready(Err(actix_web::error::ErrorUnauthorized("Not authenticated")))
        }
    }
}
