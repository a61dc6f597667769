use actix_web::web;
use crate::handlers;

/// Configures API routes that REQUIRE JWT authentication.
/// Mounted under the "/api" scope and wrapped with SecureAuthentication and
/// SubscriptionGuard in main.rs.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth") // Base path: /api/auth
            .service(handlers::auth_handlers::me)
    );

    // Wash events (/api/wash-events/*)
    cfg.service(
        web::scope("/wash-events")
            .service(handlers::wash_event_handlers::create_wash_event)
            .service(handlers::wash_event_handlers::list_wash_events)
            .service(handlers::wash_event_handlers::get_wash_event)
            .service(handlers::wash_event_handlers::authorize_wash_event)
            .service(handlers::wash_event_handlers::start_wash_event)
            .service(handlers::wash_event_handlers::complete_wash_event)
            .service(handlers::wash_event_handlers::reject_wash_event)
            .service(handlers::wash_event_handlers::lock_wash_event)
    );

    // Billing routes (/api/billing/*)
    cfg.service(
        web::scope("/billing")
            .service(handlers::billing_handlers::generate_invoice)
            .service(handlers::billing_handlers::run_billing_period)
            .service(handlers::billing_handlers::list_invoices)
            .service(handlers::billing_handlers::get_invoice)
            .service(handlers::billing_handlers::issue_invoice)
            .service(handlers::billing_handlers::cancel_invoice)
            .service(handlers::billing_handlers::get_invoice_pdf)
    );

    cfg.service(
        web::scope("/exchange-rates")
            .service(handlers::exchange_rate_handlers::list_rates)
            .service(handlers::exchange_rate_handlers::get_rate)
            .service(handlers::exchange_rate_handlers::convert)
            .service(handlers::exchange_rate_handlers::refresh_rates)
    );

    cfg.service(
        web::scope("/sms")
            .service(handlers::sms_handlers::send_code)
            .service(handlers::sms_handlers::verify_code)
    );

    // Tenant administration (/api/networks/*)
    cfg.service(
        web::scope("/networks")
            .service(handlers::network_handlers::get_current_subscription)
            .service(handlers::network_handlers::create_network)
            .service(handlers::network_handlers::update_subscription)
    );

    cfg.service(
        web::scope("/catalog")
            .service(handlers::catalog_handlers::list_locations)
            .service(handlers::catalog_handlers::create_location)
            .service(handlers::catalog_handlers::list_service_packages)
            .service(handlers::catalog_handlers::create_service_package)
            .service(handlers::catalog_handlers::list_partner_companies)
            .service(handlers::catalog_handlers::create_partner_company)
            .service(handlers::catalog_handlers::list_drivers)
            .service(handlers::catalog_handlers::create_driver)
    );

    cfg.service(
        web::scope("/vat")
            .service(handlers::vat_handlers::validate_vat_number)
    );
}

/// Configures public authentication routes (not part of /api).
/// Mounted under the "/auth" scope in main.rs.
pub fn configure_public_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::auth_handlers::login);
}

/// Configures webhook routes that DO NOT require JWT authentication.
/// Mounted under the "/webhooks" scope in main.rs.
pub fn configure_webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::webhook_handlers::stripe_webhook);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;
    use actix_web::{App, http::StatusCode};

    // Without services registered every route still resolves; missing app data
    // surfaces as a 500 rather than a 404.
    #[actix_web::test]
    async fn test_routes_are_registered() {
        let app = actix_test::init_service(
            App::new()
                .service(web::scope("/api").configure(configure_routes))
                .service(web::scope("/auth").configure(configure_public_auth_routes))
                .service(web::scope("/webhooks").configure(configure_webhook_routes)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api/no-such-route").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        for (method, uri) in [
            ("GET", "/api/exchange-rates"),
            ("POST", "/api/billing/periods/run"),
            ("PATCH", "/api/networks/00000000-0000-0000-0000-000000000000/subscription"),
            ("POST", "/webhooks/stripe"),
        ] {
            let req = actix_test::TestRequest::default()
                .method(method.parse().unwrap())
                .uri(uri)
                .to_request();
            let status = actix_test::call_service(&app, req).await.status();
            assert_ne!(status, StatusCode::NOT_FOUND, "{} {} is not routed", method, uri);
        }
    }
}
