use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, HttpMessage,
};
use chrono::Utc;
use futures_util::future::{ok, Ready};
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::subscription_service::{evaluate_write_access, NetworkStatusSource};

fn is_write_method(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Blocks write requests of networks whose trial or subscription is not in good standing.
///
/// Must run after `SecureAuthentication` so the caller's identity is available.
#[derive(Clone)]
pub struct SubscriptionGuard {
    source: Arc<dyn NetworkStatusSource>,
    exempt_prefixes: Arc<Vec<String>>,
}

impl SubscriptionGuard {
    pub fn new(source: Arc<dyn NetworkStatusSource>, exempt_prefixes: Vec<String>) -> Self {
        Self {
            source,
            exempt_prefixes: Arc::new(exempt_prefixes),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SubscriptionGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SubscriptionGuardMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SubscriptionGuardMiddleware {
            service: Rc::new(service),
            source: self.source.clone(),
            exempt_prefixes: self.exempt_prefixes.clone(),
        })
    }
}

pub struct SubscriptionGuardMiddleware<S> {
    service: Rc<S>,
    source: Arc<dyn NetworkStatusSource>,
    exempt_prefixes: Arc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for SubscriptionGuardMiddleware<S>
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

        if !is_write_method(req.method())
            || self.exempt_prefixes.iter().any(|prefix| req.path().starts_with(prefix.as_str()))
        {
            return Box::pin(service.call(req));
        }

        let network_id = match req.extensions().get::<AuthenticatedUser>() {
            Some(user) if !user.is_platform_admin() => user.network_id,
            _ => None,
        };
        let Some(network_id) = network_id else {
            return Box::pin(service.call(req));
        };

        let source = self.source.clone();
        Box::pin(async move {
            let subscription = source
                .subscription(&network_id)
                .await?
                .ok_or_else(|| AppError::Forbidden(format!("Network {} not found", network_id)))?;

            let access = evaluate_write_access(
                subscription.subscription_status,
                subscription.trial_ends_at,
                subscription.subscription_end_at,
                Utc::now(),
            );
            if !access.allowed {
                let reason = access.reason.unwrap_or_else(|| "Subscription inactive".to_string());
                warn!(
                    "Blocked {} {} for network {}: {}",
                    req.method(),
                    req.path(),
                    network_id,
                    reason
                );
                return Err(AppError::SubscriptionInactive(reason).into());
            }

            debug!("Subscription check passed for network {}", network_id);
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NetworkSubscription, SubscriptionStatus, UserRole};
    use actix_web::test as actix_test;
    use actix_web::{http::StatusCode, web, App, HttpResponse};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use uuid::Uuid;

    struct FixedStatus {
        status: SubscriptionStatus,
        trial_ends_at: Option<DateTime<Utc>>,
    }

    #[async_trait]
    impl NetworkStatusSource for FixedStatus {
        async fn subscription(&self, network_id: &Uuid) -> Result<Option<NetworkSubscription>, AppError> {
            Ok(Some(NetworkSubscription {
                id: *network_id,
                subscription_status: self.status,
                trial_ends_at: self.trial_ends_at,
                subscription_end_at: None,
            }))
        }
    }

    // Stands in for SecureAuthentication.
    fn with_user(role: UserRole) -> impl Fn(&ServiceRequest) + Clone {
        move |req: &ServiceRequest| {
            req.extensions_mut().insert(AuthenticatedUser {
                user_id: Uuid::new_v4(),
                role,
                network_id: Some(Uuid::new_v4()),
                location_id: None,
                partner_company_id: None,
                driver_id: None,
            });
        }
    }

    async fn status_for(
        source: FixedStatus,
        role: UserRole,
        method: Method,
        path: &str,
    ) -> StatusCode {
        let inject = with_user(role);
        let app = actix_test::init_service(
            App::new()
                .wrap(SubscriptionGuard::new(
                    Arc::new(source),
                    vec!["/api/networks/current/subscription".to_string()],
                ))
                .wrap_fn(move |req, srv| {
                    inject(&req);
                    srv.call(req)
                })
                .default_service(web::to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = actix_test::TestRequest::default().method(method).uri(path).to_request();
        match actix_test::try_call_service(&app, req).await {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    fn expired_trial() -> FixedStatus {
        FixedStatus {
            status: SubscriptionStatus::Trial,
            trial_ends_at: Some(Utc::now() - Duration::days(1)),
        }
    }

    #[actix_web::test]
    async fn test_expired_trial_blocks_writes() {
        let status = status_for(expired_trial(), UserRole::Operator, Method::POST, "/api/wash-events").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_running_trial_allows_writes() {
        let source = FixedStatus {
            status: SubscriptionStatus::Trial,
            trial_ends_at: Some(Utc::now() + Duration::days(3)),
        };
        let status = status_for(source, UserRole::Operator, Method::POST, "/api/wash-events").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_reads_pass_when_blocked() {
        let status = status_for(expired_trial(), UserRole::Operator, Method::GET, "/api/wash-events").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_platform_admin_and_exempt_paths_bypass() {
        let admin = status_for(expired_trial(), UserRole::PlatformAdmin, Method::POST, "/api/networks").await;
        assert_eq!(admin, StatusCode::OK);

        let exempt = status_for(
            expired_trial(),
            UserRole::NetworkAdmin,
            Method::POST,
            "/api/networks/current/subscription",
        )
        .await;
        assert_eq!(exempt, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_suspended_network_is_blocked() {
        let source = FixedStatus {
            status: SubscriptionStatus::Suspended,
            trial_ends_at: None,
        };
        let status = status_for(source, UserRole::NetworkAdmin, Method::PATCH, "/api/catalog/locations").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
