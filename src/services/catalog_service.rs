use log::info;

use crate::db::repositories::{
    DriverRepository, LocationRepository, PartnerCompanyRepository, ServicePackageRepository,
};
use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, CreateDriverRequest, CreateLocationRequest, CreatePartnerCompanyRequest,
    CreateServicePackageRequest, Driver, Location, PartnerCompany, ServicePackage, UserRole,
};
use crate::utils::financial_validation::{round_money, validate_currency_code, validate_price};
use crate::utils::input_validation::{normalize_phone, required_text, split_eu_vat_number};

const MAX_NAME_LENGTH: usize = 200;
const MAX_CODE_LENGTH: usize = 32;

const STAFF: &[UserRole] = &[UserRole::NetworkAdmin, UserRole::Operator];

/// Locations, service packages, partner companies and drivers of a network.
#[derive(Clone)]
pub struct CatalogService {
    locations: LocationRepository,
    packages: ServicePackageRepository,
    partners: PartnerCompanyRepository,
    drivers: DriverRepository,
    default_currency: String,
}

impl CatalogService {
    pub fn new(
        locations: LocationRepository,
        packages: ServicePackageRepository,
        partners: PartnerCompanyRepository,
        drivers: DriverRepository,
        default_currency: String,
    ) -> Self {
        Self {
            locations,
            packages,
            partners,
            drivers,
            default_currency,
        }
    }

    pub async fn list_locations(&self, user: &AuthenticatedUser) -> Result<Vec<Location>, AppError> {
        let network_id = user.require_network()?;
        self.locations.list(&network_id).await
    }

    pub async fn create_location(
        &self,
        user: &AuthenticatedUser,
        request: &CreateLocationRequest,
    ) -> Result<Location, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let network_id = user.require_network()?;
        let name = required_text("name", Some(request.name.as_str()), MAX_NAME_LENGTH)?;
        let code = required_text("code", Some(request.code.as_str()), MAX_CODE_LENGTH)?.to_uppercase();
        let city = request.city.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let location = self.locations.create(&network_id, &name, &code, city).await?;
        info!("Location {} ({}) created in network {}", location.id, location.code, network_id);
        Ok(location)
    }

    pub async fn list_service_packages(&self, user: &AuthenticatedUser) -> Result<Vec<ServicePackage>, AppError> {
        let network_id = user.require_network()?;
        self.packages.list(&network_id).await
    }

    pub async fn create_service_package(
        &self,
        user: &AuthenticatedUser,
        request: &CreateServicePackageRequest,
    ) -> Result<ServicePackage, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let network_id = user.require_network()?;
        let name = required_text("name", Some(request.name.as_str()), MAX_NAME_LENGTH)?;
        let code = required_text("code", Some(request.code.as_str()), MAX_CODE_LENGTH)?.to_uppercase();
        let currency = validate_currency_code(&request.currency)?;
        validate_price(&request.price, &currency, "service package")?;
        let price = round_money(&request.price, &currency);

        let package = self
            .packages
            .create(&network_id, &name, &code, &price, &currency)
            .await?;
        info!("Service package {} ({} {}) created", package.code, package.price, package.currency);
        Ok(package)
    }

    pub async fn list_partner_companies(&self, user: &AuthenticatedUser) -> Result<Vec<PartnerCompany>, AppError> {
        let network_id = user.require_network()?;
        match user.role {
            UserRole::Partner => {
                let partner_id = user
                    .partner_company_id
                    .ok_or_else(|| AppError::Forbidden("Partner account has no company".to_string()))?;
                Ok(self.partners.get(&network_id, &partner_id).await?.into_iter().collect())
            }
            _ => {
                user.require_role(STAFF)?;
                self.partners.list(&network_id).await
            }
        }
    }

    pub async fn create_partner_company(
        &self,
        user: &AuthenticatedUser,
        request: &CreatePartnerCompanyRequest,
    ) -> Result<PartnerCompany, AppError> {
        user.require_role(&[UserRole::NetworkAdmin])?;
        let network_id = user.require_network()?;
        required_text("name", Some(request.name.as_str()), MAX_NAME_LENGTH)?;
        if request.country_code.trim().len() != 2 {
            return Err(AppError::Validation("countryCode must be a two-letter ISO code".to_string()));
        }
        if let Some(vat) = request.eu_vat_number.as_deref() {
            split_eu_vat_number(vat)?;
        }
        let billing_currency = match request.billing_currency.as_deref() {
            Some(code) => validate_currency_code(code)?,
            None => self.default_currency.clone(),
        };

        let partner = self
            .partners
            .create(&network_id, request, &billing_currency)
            .await?;
        info!("Partner company {} created, billed in {}", partner.id, partner.billing_currency);
        Ok(partner)
    }

    pub async fn list_drivers(&self, user: &AuthenticatedUser) -> Result<Vec<Driver>, AppError> {
        let network_id = user.require_network()?;
        match user.role {
            UserRole::Partner => {
                let partner_id = user
                    .partner_company_id
                    .ok_or_else(|| AppError::Forbidden("Partner account has no company".to_string()))?;
                self.drivers.list(&network_id, Some(&partner_id)).await
            }
            _ => {
                user.require_role(STAFF)?;
                self.drivers.list(&network_id, None).await
            }
        }
    }

    /// Network admins register drivers for any partner; partners for their own company.
    pub async fn create_driver(
        &self,
        user: &AuthenticatedUser,
        request: &CreateDriverRequest,
    ) -> Result<Driver, AppError> {
        user.require_role(&[UserRole::NetworkAdmin, UserRole::Partner])?;
        let network_id = user.require_network()?;
        if user.role == UserRole::Partner && user.partner_company_id != Some(request.partner_company_id) {
            return Err(AppError::Forbidden(
                "Partners may only register drivers for their own company".to_string(),
            ));
        }

        self.partners
            .get(&network_id, &request.partner_company_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Partner company {} not found", request.partner_company_id))
            })?;

        let name = required_text("name", Some(request.name.as_str()), MAX_NAME_LENGTH)?;
        let phone = match request.phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(normalize_phone(raw)?),
        };

        let driver = self
            .drivers
            .create(&network_id, &request.partner_company_id, &name, phone.as_deref())
            .await?;
        info!("Driver {} registered for partner {}", driver.id, driver.partner_company_id);
        Ok(driver)
    }
}
