use actix_web::{HttpResponse, get, post, web};

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::auth::{AuthService, LoginRequest};

#[post("/login")]
pub async fn login(
    auth_service: web::Data<AuthService>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let response = auth_service.login(&request).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Identity carried by the caller's token.
#[get("/me")]
pub async fn me(user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(user))
}
