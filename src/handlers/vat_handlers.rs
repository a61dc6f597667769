use actix_web::{HttpResponse, post, web};
use log::info;

use crate::clients::ViesClient;
use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole, VatValidationRequest};
use crate::utils::input_validation::split_eu_vat_number;

/// Looks up an EU VAT number in VIES.
#[post("/validate")]
pub async fn validate_vat_number(
    user: AuthenticatedUser,
    vies: web::Data<ViesClient>,
    request: web::Json<VatValidationRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[UserRole::PlatformAdmin, UserRole::NetworkAdmin, UserRole::Partner])?;
    let (country_code, number) = split_eu_vat_number(&request.vat_number)?;

    let validation = vies.check_vat_number(&country_code, &number).await?;
    info!(
        "VIES lookup for {}{}: valid={}",
        validation.country_code, validation.vat_number, validation.valid
    );
    Ok(HttpResponse::Ok().json(validation))
}
