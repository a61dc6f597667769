use actix_web::{HttpResponse, get, post, web};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, ConvertQuery, UserRole};
use crate::services::exchange_rate_service::ExchangeRateService;

#[get("")]
pub async fn list_rates(
    _user: AuthenticatedUser,
    service: web::Data<ExchangeRateService>,
) -> Result<HttpResponse, AppError> {
    let rates = service.current_rates().await?;
    Ok(HttpResponse::Ok().json(rates))
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    pub from: String,
    pub to: String,
}

#[get("/rate")]
pub async fn get_rate(
    _user: AuthenticatedUser,
    service: web::Data<ExchangeRateService>,
    query: web::Query<RateQuery>,
) -> Result<HttpResponse, AppError> {
    let rate = service.get_rate(&query.from, &query.to).await?;
    Ok(HttpResponse::Ok().json(json!({
        "from": query.from.to_uppercase(),
        "to": query.to.to_uppercase(),
        "rate": rate,
    })))
}

#[get("/convert")]
pub async fn convert(
    _user: AuthenticatedUser,
    service: web::Data<ExchangeRateService>,
    query: web::Query<ConvertQuery>,
) -> Result<HttpResponse, AppError> {
    let response = service.conversion(&query.amount, &query.from, &query.to).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Manual refresh outside the nightly schedule.
#[post("/refresh")]
pub async fn refresh_rates(
    user: AuthenticatedUser,
    service: web::Data<ExchangeRateService>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[UserRole::PlatformAdmin, UserRole::NetworkAdmin])?;
    let source = service.refresh_rates().await?;
    info!("Exchange rates refreshed by {} from {}", user.user_id, source.as_str());
    Ok(HttpResponse::Ok().json(json!({ "source": source })))
}
