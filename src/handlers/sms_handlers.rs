use actix_web::{HttpResponse, post, web};

use crate::error::AppError;
use crate::models::{AuthenticatedUser, SendCodeRequest, VerifyCodeRequest};
use crate::services::sms_verification_service::SmsVerificationService;

#[post("/send-code")]
pub async fn send_code(
    _user: AuthenticatedUser,
    service: web::Data<SmsVerificationService>,
    request: web::Json<SendCodeRequest>,
) -> Result<HttpResponse, AppError> {
    let response = service.send_code(&request.phone).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/verify")]
pub async fn verify_code(
    user: AuthenticatedUser,
    service: web::Data<SmsVerificationService>,
    request: web::Json<VerifyCodeRequest>,
) -> Result<HttpResponse, AppError> {
    let network_id = user.require_network()?;
    let response = service
        .verify_code(&network_id, &request.phone, &request.code)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::SmsConfig;
    use crate::db::repositories::{DriverRepository, PhoneVerificationRepository};
    use crate::models::UserRole;
    use actix_web::dev::Service;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;
    use actix_web::{App, HttpMessage};
    use sqlx::PgPool;
    use uuid::Uuid;

    // Verification stamps drivers of the caller's own network, so a caller without one is refused
    // before any row is touched.
    #[actix_web::test]
    async fn test_verify_requires_network_context() {
        let pool = PgPool::connect_lazy("postgres://localhost/washnet_unused").unwrap();
        let service = SmsVerificationService::new(
            PhoneVerificationRepository::new(pool.clone()),
            DriverRepository::new(pool),
            None,
            SmsConfig {
                code_ttl_seconds: 300,
                max_attempts: 5,
            },
        );

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .wrap_fn(|req, srv| {
                    req.extensions_mut().insert(AuthenticatedUser {
                        user_id: Uuid::new_v4(),
                        role: UserRole::PlatformAdmin,
                        network_id: None,
                        location_id: None,
                        partner_company_id: None,
                        driver_id: None,
                    });
                    srv.call(req)
                })
                .service(verify_code),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/verify")
            .set_json(serde_json::json!({ "phone": "+36301234567", "code": "123456" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
