pub mod auth_handlers;
pub mod billing_handlers;
pub mod catalog_handlers;
pub mod exchange_rate_handlers;
pub mod health;
pub mod network_handlers;
pub mod sms_handlers;
pub mod vat_handlers;
pub mod wash_event_handlers;
pub mod webhook_handlers;
