use serde::{Deserialize, Serialize};

/// JWT claims structure that will be encoded/decoded for authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
    pub iss: Option<String>,
    /// One of the `UserRole` names, e.g. "OPERATOR"
    pub role: String,
    pub network_id: Option<String>,
    pub location_id: Option<String>,
    pub partner_company_id: Option<String>,
    pub driver_id: Option<String>,
    /// JWT ID (unique identifier for the token)
    pub jti: String,
}
