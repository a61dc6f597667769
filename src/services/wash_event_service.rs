use log::{debug, info, warn};
use uuid::Uuid;

use crate::db::repositories::{
    DriverRepository, LocationRepository, NewWashEvent, ServicePackageRepository, WashEventRepository,
};
use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, CreateWashEventRequest, EntryMode, UserRole, WashEvent, WashEventFilter,
    WashEventListResponse, WashEventTransition,
};
use crate::utils::input_validation::{normalize_optional_plate, normalize_plate, required_text};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

const MAX_NAME_LENGTH: usize = 200;
const MAX_REASON_LENGTH: usize = 500;

/// Clamps paging input to `1..=MAX_PAGE_SIZE` and a non-negative offset.
pub fn clamp_paging(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Narrows a caller-supplied filter to what the caller's role may see.
pub fn scope_filter(user: &AuthenticatedUser, filter: &WashEventFilter) -> Result<WashEventFilter, AppError> {
    let mut scoped = filter.clone();
    match user.role {
        UserRole::Driver => {
            let driver_id = user
                .driver_id
                .ok_or_else(|| AppError::Forbidden("Driver account has no driver profile".to_string()))?;
            scoped.driver_id = Some(driver_id);
        }
        UserRole::Partner => {
            let partner_id = user
                .partner_company_id
                .ok_or_else(|| AppError::Forbidden("Partner account has no company".to_string()))?;
            scoped.partner_company_id = Some(partner_id);
        }
        UserRole::Operator => {
            let location_id = user
                .location_id
                .ok_or_else(|| AppError::Forbidden("Operator account has no location".to_string()))?;
            scoped.location_id = Some(location_id);
        }
        UserRole::NetworkAdmin | UserRole::PlatformAdmin => {}
    }
    Ok(scoped)
}

/// Whether the caller may read `event` at all.
pub fn can_view(user: &AuthenticatedUser, event: &WashEvent) -> bool {
    match user.role {
        UserRole::Driver => user.driver_id.is_some() && event.driver_id == user.driver_id,
        UserRole::Partner => {
            user.partner_company_id.is_some() && event.partner_company_id == user.partner_company_id
        }
        UserRole::Operator => user.location_id == Some(event.location_id),
        UserRole::NetworkAdmin | UserRole::PlatformAdmin => true,
    }
}

/// Operators act on their own location only; locking is reserved to network admins.
pub fn check_transition_permission(
    user: &AuthenticatedUser,
    transition: WashEventTransition,
    location_id: &Uuid,
) -> Result<(), AppError> {
    match (user.role, transition) {
        (UserRole::NetworkAdmin, _) => Ok(()),
        (UserRole::Operator, WashEventTransition::Lock) => Err(AppError::Forbidden(
            "Only network admins may lock wash events".to_string(),
        )),
        (UserRole::Operator, _) if user.location_id.as_ref() == Some(location_id) => Ok(()),
        (UserRole::Operator, _) => Err(AppError::Forbidden(
            "Operators may only act on wash events at their own location".to_string(),
        )),
        (role, _) => Err(AppError::Forbidden(format!(
            "Role {} may not change wash event status",
            role
        ))),
    }
}

fn check_create_permission(user: &AuthenticatedUser, request: &CreateWashEventRequest) -> Result<(), AppError> {
    match (user.role, request.entry_mode) {
        (UserRole::Driver, EntryMode::QrDriver) => Ok(()),
        (UserRole::Driver, EntryMode::ManualOperator) => Err(AppError::Forbidden(
            "Drivers may only register QR wash events".to_string(),
        )),
        (UserRole::Operator, _) => {
            if user.location_id != Some(request.location_id) {
                return Err(AppError::Forbidden(
                    "Operators may only register washes at their own location".to_string(),
                ));
            }
            Ok(())
        }
        (UserRole::NetworkAdmin, _) => Ok(()),
        (role, _) => Err(AppError::Forbidden(format!("Role {} may not register washes", role))),
    }
}

fn optional_text(raw: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => required_text(field, Some(value), MAX_NAME_LENGTH).map(Some),
    }
}

#[derive(Clone)]
pub struct WashEventService {
    wash_events: WashEventRepository,
    locations: LocationRepository,
    packages: ServicePackageRepository,
    drivers: DriverRepository,
}

impl WashEventService {
    pub fn new(
        wash_events: WashEventRepository,
        locations: LocationRepository,
        packages: ServicePackageRepository,
        drivers: DriverRepository,
    ) -> Self {
        Self {
            wash_events,
            locations,
            packages,
            drivers,
        }
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        request: &CreateWashEventRequest,
    ) -> Result<WashEvent, AppError> {
        let network_id = user.require_network()?;
        check_create_permission(user, request)?;

        let requested_driver = match (user.role, request.entry_mode) {
            (UserRole::Driver, _) => {
                let own = user
                    .driver_id
                    .ok_or_else(|| AppError::Forbidden("Driver account has no driver profile".to_string()))?;
                if request.driver_id.is_some_and(|id| id != own) {
                    return Err(AppError::Forbidden(
                        "Drivers may only register washes for themselves".to_string(),
                    ));
                }
                Some(own)
            }
            (_, EntryMode::QrDriver) => Some(request.driver_id.ok_or_else(|| {
                AppError::Validation("driverId is required for QR_DRIVER entries".to_string())
            })?),
            (_, EntryMode::ManualOperator) => request.driver_id,
        };

        let tractor_plate = match request.entry_mode {
            EntryMode::ManualOperator => {
                let raw = request.tractor_plate.as_deref().ok_or_else(|| {
                    AppError::Validation("tractorPlate is required for MANUAL_OPERATOR entries".to_string())
                })?;
                Some(normalize_plate("tractorPlate", raw)?)
            }
            EntryMode::QrDriver => normalize_optional_plate("tractorPlate", request.tractor_plate.as_deref())?,
        };
        let trailer_plate = normalize_optional_plate("trailerPlate", request.trailer_plate.as_deref())?;

        let location = self
            .locations
            .get(&network_id, &request.location_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location {} not found", request.location_id)))?;
        if !location.is_active {
            return Err(AppError::Validation(format!("Location {} is not active", location.code)));
        }

        let package = self
            .packages
            .get(&network_id, &request.service_package_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Service package {} not found", request.service_package_id))
            })?;
        if !package.is_active {
            return Err(AppError::Validation(format!("Service package {} is not active", package.code)));
        }

        let (driver_id, partner_company_id) = match requested_driver {
            Some(driver_id) => {
                let driver = self
                    .drivers
                    .get(&network_id, &driver_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Driver {} not found", driver_id)))?;
                if !driver.is_active {
                    return Err(AppError::Validation(format!("Driver {} is not active", driver_id)));
                }
                (Some(driver.id), Some(driver.partner_company_id))
            }
            None => (None, None),
        };

        let (price, currency) = match self
            .packages
            .get_location_price(&location.id, &package.id)
            .await?
        {
            Some(location_price) => {
                debug!("Using location price override for package {} at {}", package.code, location.code);
                location_price
            }
            None => (package.price.clone(), package.currency.clone()),
        };

        let new_event = NewWashEvent {
            network_id,
            location_id: location.id,
            service_package_id: package.id,
            entry_mode: request.entry_mode,
            driver_id,
            partner_company_id,
            tractor_plate,
            trailer_plate,
            manual_driver_name: optional_text(request.manual_driver_name.as_deref(), "manualDriverName")?,
            manual_company_name: optional_text(request.manual_company_name.as_deref(), "manualCompanyName")?,
            price,
            currency,
            created_by_user_id: user.user_id,
        };

        let event = self.wash_events.create(&new_event).await?;
        info!(
            "Wash event {} created at location {} ({}) by user {}",
            event.id, location.code, event.entry_mode.as_str(), user.user_id
        );
        Ok(event)
    }

    pub async fn get(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<WashEvent, AppError> {
        let network_id = user.require_network()?;
        let event = self
            .wash_events
            .get(&network_id, id)
            .await?
            .filter(|event| can_view(user, event))
            .ok_or_else(|| AppError::NotFound(format!("Wash event {} not found", id)))?;
        Ok(event)
    }

    pub async fn list(
        &self,
        user: &AuthenticatedUser,
        filter: &WashEventFilter,
    ) -> Result<WashEventListResponse, AppError> {
        let network_id = user.require_network()?;
        let scoped = scope_filter(user, filter)?;
        let (limit, offset) = clamp_paging(filter.limit, filter.offset);

        let (items, total) = self.wash_events.list(&network_id, &scoped, limit, offset).await?;
        Ok(WashEventListResponse {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn transition(
        &self,
        user: &AuthenticatedUser,
        id: &Uuid,
        transition: WashEventTransition,
        reason: Option<&str>,
    ) -> Result<WashEvent, AppError> {
        let network_id = user.require_network()?;

        let reason = if transition.requires_reason() {
            Some(required_text("reason", reason, MAX_REASON_LENGTH)?)
        } else {
            None
        };

        let current = self
            .wash_events
            .get(&network_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wash event {} not found", id)))?;
        check_transition_permission(user, transition, &current.location_id)?;

        match self
            .wash_events
            .transition(&network_id, id, transition, reason.as_deref())
            .await?
        {
            Some(updated) => {
                info!(
                    "Wash event {} moved {} -> {} by user {}",
                    id, current.status, updated.status, user.user_id
                );
                Ok(updated)
            }
            None => {
                // The row may have moved on between the read and the guarded update.
                let latest = self
                    .wash_events
                    .get(&network_id, id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Wash event {} not found", id)))?;
                warn!(
                    "Rejected transition of wash event {} from {} to {}",
                    id, latest.status, transition.target()
                );
                Err(AppError::InvalidTransition(format!(
                    "Cannot move wash event from {} to {}",
                    latest.status,
                    transition.target()
                )))
            }
        }
    }
}
