use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures_util::future::{ok, ready, Ready};
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::auth::jwt;

// Marker to indicate the request has already been through this middleware
#[derive(Debug)]
struct AuthProcessed;

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub(crate) fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let value = header.ok_or_else(|| AppError::Auth("Missing Authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid Authorization format, expected Bearer token".to_string()))?
        .trim();
    if token.is_empty() {
        return Err(AppError::Auth("Empty Bearer token".to_string()));
    }
    Ok(token)
}

/// JWT authentication. Places the caller's `AuthenticatedUser` into request extensions.
#[derive(Clone, Default)]
pub struct SecureAuthentication;

impl<S, B> Transform<S, ServiceRequest> for SecureAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecureAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SecureAuthenticationMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct SecureAuthenticationMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SecureAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if req.extensions().get::<AuthProcessed>().is_some() {
            debug!("Request already processed by auth middleware, skipping");
            return Box::pin(service.call(req));
        }
        req.extensions_mut().insert(AuthProcessed);

        // CORS pre-flight carries no credentials
        if req.method() == actix_web::http::Method::OPTIONS {
            return Box::pin(service.call(req));
        }

        let header = req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok());
        let user = bearer_token(header)
            .and_then(jwt::verify_token)
            .and_then(|claims| jwt::claims_to_user(&claims));

        match user {
            Ok(user) => {
                debug!(
                    "Authenticated user {} ({}) for {} {}",
                    user.user_id,
                    user.role,
                    req.method(),
                    req.path()
                );
                req.extensions_mut().insert::<AuthenticatedUser>(user);
                Box::pin(service.call(req))
            }
            Err(e) => {
                warn!("Authentication failed for {}: {}", req.path(), e);
                Box::pin(ready(Err(Error::from(e))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::auth::jwt::{generate_token, init_test_keys};
    use actix_web::test as actix_test;
    use actix_web::{web, App, HttpResponse};
    use uuid::Uuid;

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.role.as_str())
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer   ")).is_err());
    }

    #[actix_web::test]
    async fn test_valid_token_reaches_handler() {
        init_test_keys();
        let token = generate_token(
            &AuthenticatedUser {
                user_id: Uuid::new_v4(),
                role: UserRole::NetworkAdmin,
                network_id: Some(Uuid::new_v4()),
                location_id: None,
                partner_company_id: None,
                driver_id: None,
            },
            60,
        )
        .unwrap();

        let app = actix_test::init_service(
            App::new()
                .wrap(SecureAuthentication)
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(actix_test::read_body(resp).await, "NETWORK_ADMIN");
    }

    #[actix_web::test]
    async fn test_missing_token_is_unauthorized() {
        let app = actix_test::init_service(
            App::new()
                .wrap(SecureAuthentication)
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/me").to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), actix_web::http::StatusCode::UNAUTHORIZED);
    }
}
