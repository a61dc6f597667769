use actix_web::{HttpResponse, get, patch, post, web};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, CreateNetworkRequest, UpdateSubscriptionRequest, UserRole};
use crate::services::subscription_service::SubscriptionService;

#[get("/current/subscription")]
pub async fn get_current_subscription(
    user: AuthenticatedUser,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, AppError> {
    let network_id = user.require_network()?;
    let status = service.get_status(&network_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[post("")]
pub async fn create_network(
    user: AuthenticatedUser,
    service: web::Data<SubscriptionService>,
    request: web::Json<CreateNetworkRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[UserRole::PlatformAdmin])?;
    let network = service.create_network(&request).await?;
    Ok(HttpResponse::Created().json(network))
}

#[patch("/{id}/subscription")]
pub async fn update_subscription(
    user: AuthenticatedUser,
    service: web::Data<SubscriptionService>,
    path: web::Path<Uuid>,
    request: web::Json<UpdateSubscriptionRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[UserRole::PlatformAdmin])?;
    let network = service.update_subscription(&path, &request).await?;
    Ok(HttpResponse::Ok().json(network))
}
