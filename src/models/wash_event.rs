use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WashEventStatus {
    Created,
    Authorized,
    InProgress,
    Completed,
    Rejected,
    Locked,
}

impl WashEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WashEventStatus::Created => "CREATED",
            WashEventStatus::Authorized => "AUTHORIZED",
            WashEventStatus::InProgress => "IN_PROGRESS",
            WashEventStatus::Completed => "COMPLETED",
            WashEventStatus::Rejected => "REJECTED",
            WashEventStatus::Locked => "LOCKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WashEventStatus::Completed | WashEventStatus::Rejected | WashEventStatus::Locked
        )
    }

    /// Whether a single step from `self` to `next` exists in the lifecycle graph.
    pub fn can_transition_to(&self, next: WashEventStatus) -> bool {
        WashEventTransition::ALL
            .iter()
            .any(|t| t.target() == next && t.allowed_from().contains(self))
    }
}

impl fmt::Display for WashEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WashEventStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(WashEventStatus::Created),
            "AUTHORIZED" => Ok(WashEventStatus::Authorized),
            "IN_PROGRESS" => Ok(WashEventStatus::InProgress),
            "COMPLETED" => Ok(WashEventStatus::Completed),
            "REJECTED" => Ok(WashEventStatus::Rejected),
            "LOCKED" => Ok(WashEventStatus::Locked),
            other => Err(AppError::Validation(format!("Unknown wash event status: {}", other))),
        }
    }
}

impl TryFrom<String> for WashEventStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A guarded step in the wash event lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WashEventTransition {
    Authorize,
    Start,
    Complete,
    Reject,
    Lock,
}

impl WashEventTransition {
    pub const ALL: [WashEventTransition; 5] = [
        WashEventTransition::Authorize,
        WashEventTransition::Start,
        WashEventTransition::Complete,
        WashEventTransition::Reject,
        WashEventTransition::Lock,
    ];

    pub fn target(&self) -> WashEventStatus {
        match self {
            WashEventTransition::Authorize => WashEventStatus::Authorized,
            WashEventTransition::Start => WashEventStatus::InProgress,
            WashEventTransition::Complete => WashEventStatus::Completed,
            WashEventTransition::Reject => WashEventStatus::Rejected,
            WashEventTransition::Lock => WashEventStatus::Locked,
        }
    }

    pub fn allowed_from(&self) -> &'static [WashEventStatus] {
        match self {
            WashEventTransition::Authorize => &[WashEventStatus::Created],
            WashEventTransition::Start => &[WashEventStatus::Authorized],
            WashEventTransition::Complete => &[WashEventStatus::InProgress],
            WashEventTransition::Reject | WashEventTransition::Lock => {
                &[WashEventStatus::Created, WashEventStatus::Authorized]
            }
        }
    }

    /// Column stamped with the transition time. Fixed identifiers only, never user input.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            WashEventTransition::Authorize => "authorized_at",
            WashEventTransition::Start => "started_at",
            WashEventTransition::Complete => "completed_at",
            WashEventTransition::Reject => "rejected_at",
            WashEventTransition::Lock => "locked_at",
        }
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, WashEventTransition::Reject | WashEventTransition::Lock)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryMode {
    QrDriver,
    ManualOperator,
}

impl EntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::QrDriver => "QR_DRIVER",
            EntryMode::ManualOperator => "MANUAL_OPERATOR",
        }
    }
}

impl TryFrom<String> for EntryMode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "QR_DRIVER" => Ok(EntryMode::QrDriver),
            "MANUAL_OPERATOR" => Ok(EntryMode::ManualOperator),
            other => Err(AppError::Validation(format!("Unknown entry mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WashEvent {
    pub id: Uuid,
    pub network_id: Uuid,
    pub location_id: Uuid,
    pub service_package_id: Uuid,
    #[sqlx(try_from = "String")]
    pub entry_mode: EntryMode,
    #[sqlx(try_from = "String")]
    pub status: WashEventStatus,
    pub driver_id: Option<Uuid>,
    pub partner_company_id: Option<Uuid>,
    pub tractor_plate: Option<String>,
    pub trailer_plate: Option<String>,
    pub manual_driver_name: Option<String>,
    pub manual_company_name: Option<String>,
    pub price: BigDecimal,
    pub currency: String,
    pub rejection_reason: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWashEventRequest {
    pub location_id: Uuid,
    pub service_package_id: Uuid,
    pub entry_mode: EntryMode,
    pub driver_id: Option<Uuid>,
    pub tractor_plate: Option<String>,
    pub trailer_plate: Option<String>,
    pub manual_driver_name: Option<String>,
    pub manual_company_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WashEventFilter {
    pub status: Option<WashEventStatus>,
    pub location_id: Option<Uuid>,
    pub partner_company_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionReasonRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WashEventListResponse {
    pub items: Vec<WashEvent>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
