pub mod auth;
pub mod billing;
pub mod billing_service;
pub mod catalog_service;
pub mod exchange_rate_service;
pub mod sms_verification_service;
pub mod stripe_webhook;
pub mod subscription_service;
pub mod wash_event_service;
