use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use dotenv::dotenv;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use washnet_server::clients::{EcbClient, MnbClient, TwilioClient, ViesClient};
use washnet_server::config::AppSettings;
use washnet_server::db::repositories::{
    DriverRepository, ExchangeRateRepository, InvoiceRepository, LocationRepository,
    NetworkRepository, PartnerCompanyRepository, PhoneVerificationRepository,
    ServicePackageRepository, UserRepository, WashEventRepository, WebhookEventRepository,
};
use washnet_server::db::{create_pool, run_migrations, verify_connection};
use washnet_server::error::set_mask_server_errors;
use washnet_server::handlers;
use washnet_server::middleware::{
    RateLimitStorage, SecureAuthentication, SubscriptionGuard, create_ip_rate_limiter,
    create_user_rate_limiter, start_memory_store_cleanup_task,
};
use washnet_server::models::RateSource;
use washnet_server::routes;
use washnet_server::services::auth::{AuthService, jwt};
use washnet_server::services::billing::InvoiceProviderRegistry;
use washnet_server::services::billing_service::BillingService;
use washnet_server::services::catalog_service::CatalogService;
use washnet_server::services::exchange_rate_service::{ExchangeRateService, start_refresh_job};
use washnet_server::services::sms_verification_service::SmsVerificationService;
use washnet_server::services::stripe_webhook::StripeWebhookService;
use washnet_server::services::subscription_service::{NetworkStatusSource, SubscriptionService};
use washnet_server::services::wash_event_service::WashEventService;
use washnet_server::utils::http_client::new_api_client;

const RATE_LIMIT_CLEANUP_INTERVAL_SECS: u64 = 300;

fn exit_on_error<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::error!("{}: {}", what, e);
            log::error!("Cannot start server");
            std::process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load application settings
    let app_settings = exit_on_error(AppSettings::from_env(), "Failed to load application settings");
    set_mask_server_errors(app_settings.app.is_production());

    // Initialize JWT keys with app settings
    exit_on_error(jwt::init_jwt_keys(&app_settings.auth.jwt_secret), "Failed to initialize JWT keys");
    log::info!("JWT keys initialized successfully");

    // Database connection setup
    let db_pool = exit_on_error(
        create_pool(&app_settings.database).await,
        "Failed to create database connection pool",
    );
    exit_on_error(verify_connection(&db_pool).await, "Database connection verification failed");
    if app_settings.database.run_migrations {
        exit_on_error(run_migrations(&db_pool).await, "Failed to apply migrations");
    }
    log::info!("Database connection established successfully");

    let http_client = exit_on_error(new_api_client(), "Failed to build HTTP client");

    // Exchange rates: warm the cache, then refresh on schedule
    let primary_source = exit_on_error(
        RateSource::try_from(app_settings.exchange_rates.primary_source.clone()),
        "Invalid EXCHANGE_RATE_PRIMARY_SOURCE",
    );
    let exchange_rates = Arc::new(ExchangeRateService::new(
        ExchangeRateRepository::new(db_pool.clone()),
        MnbClient::new(http_client.clone(), app_settings.exchange_rates.mnb_url.clone()),
        EcbClient::new(http_client.clone(), app_settings.exchange_rates.ecb_url.clone()),
        primary_source,
    ));
    match exchange_rates.refresh_rates().await {
        Ok(source) => log::info!("Exchange rates loaded from {}", source.as_str()),
        Err(e) => log::warn!("Initial exchange rate refresh failed: {}", e),
    }
    // Held for the lifetime of the server
    let _rate_scheduler = exit_on_error(
        start_refresh_job(exchange_rates.clone(), &app_settings.exchange_rates.refresh_cron).await,
        "Failed to schedule exchange rate refresh",
    );

    let providers = Arc::new(exit_on_error(
        InvoiceProviderRegistry::from_settings(http_client.clone(), &app_settings),
        "Failed to configure invoice providers",
    ));

    let twilio = match TwilioClient::new(http_client.clone(), &app_settings.twilio) {
        Ok(client) => Some(client),
        Err(e) => {
            log::warn!("SMS verification disabled: {}", e);
            None
        }
    };

    // Services are shared by all workers
    let auth_service = web::Data::new(AuthService::new(
        UserRepository::new(db_pool.clone()),
        app_settings.auth.token_duration_minutes,
    ));
    let wash_event_service = web::Data::new(WashEventService::new(
        WashEventRepository::new(db_pool.clone()),
        LocationRepository::new(db_pool.clone()),
        ServicePackageRepository::new(db_pool.clone()),
        DriverRepository::new(db_pool.clone()),
    ));
    let billing_service = web::Data::new(BillingService::new(
        db_pool.clone(),
        exchange_rates.clone(),
        providers,
        app_settings.billing.clone(),
    ));
    let subscription_service = web::Data::new(SubscriptionService::new(
        NetworkRepository::new(db_pool.clone()),
        app_settings.subscription.default_trial_days,
        app_settings.billing.default_currency.clone(),
    ));
    let catalog_service = web::Data::new(CatalogService::new(
        LocationRepository::new(db_pool.clone()),
        ServicePackageRepository::new(db_pool.clone()),
        PartnerCompanyRepository::new(db_pool.clone()),
        DriverRepository::new(db_pool.clone()),
        app_settings.billing.default_currency.clone(),
    ));
    let sms_service = web::Data::new(SmsVerificationService::new(
        PhoneVerificationRepository::new(db_pool.clone()),
        DriverRepository::new(db_pool.clone()),
        twilio,
        app_settings.sms.clone(),
    ));
    let webhook_service = web::Data::new(StripeWebhookService::new(
        app_settings.stripe.webhook_secret.clone(),
        InvoiceRepository::new(db_pool.clone()),
        WebhookEventRepository::new(db_pool.clone()),
    ));
    let vies_client = web::Data::new(ViesClient::new(http_client.clone(), app_settings.vies.api_url.clone()));
    let exchange_rate_data = web::Data::from(exchange_rates);
    let network_status: Arc<dyn NetworkStatusSource> = Arc::new(NetworkRepository::new(db_pool.clone()));

    // Rate limiting storage shared by the IP and user limiters
    let rate_limit_storage = RateLimitStorage::new();
    tokio::spawn(start_memory_store_cleanup_task(
        rate_limit_storage.clone(),
        Duration::from_millis(app_settings.rate_limit.window_ms),
        RATE_LIMIT_CLEANUP_INTERVAL_SECS,
    ));

    // Get server host and port from settings
    let host = &app_settings.server.host;
    let port = app_settings.server.port;

    log::info!("Starting server at http://{}:{}", host, port);

    let server_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(server_addr)?;

    HttpServer::new(move || {
        // Configure CORS using actix-cors
        let mut cors = Cors::default().supports_credentials();

        // Add allowed origins based on configuration
        if app_settings.server.cors_origins.contains(&"*".to_string()) {
            cors = cors.allow_any_origin();
        } else {
            for origin in &app_settings.server.cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }

        // Common CORS settings for all origins
        cors = cors.allow_any_method().allow_any_header();

        // Create the App with common middleware and data
        App::new()
            .wrap(create_ip_rate_limiter(app_settings.rate_limit.clone(), rate_limit_storage.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(auth_service.clone())
            .app_data(wash_event_service.clone())
            .app_data(billing_service.clone())
            .app_data(subscription_service.clone())
            .app_data(catalog_service.clone())
            .app_data(sms_service.clone())
            .app_data(webhook_service.clone())
            .app_data(vies_client.clone())
            .app_data(exchange_rate_data.clone())
            // Register health check endpoint without auth
            .service(
                web::resource("/health")
                    .route(web::get().to(handlers::health::health_check))
            )
            // Public auth routes
            .service(
                web::scope("/auth")
                    .configure(routes::configure_public_auth_routes)
            )
            // Protected API routes; authentication runs first, then the user limiter, then the guard
            .service(
                web::scope("/api")
                    .wrap(SubscriptionGuard::new(
                        network_status.clone(),
                        app_settings.subscription.exempt_path_prefixes.clone(),
                    ))
                    .wrap(create_user_rate_limiter(app_settings.rate_limit.clone(), rate_limit_storage.clone()))
                    .wrap(SecureAuthentication)
                    .configure(routes::configure_routes)
            )
            // Public webhook routes (no authentication)
            .service(
                web::scope("/webhooks")
                    .configure(routes::configure_webhook_routes)
            )
    })
    .listen(listener)?
    .run()
    .await
}
