pub mod driver_repository;
pub mod exchange_rate_repository;
pub mod invoice_repository;
pub mod location_repository;
pub mod network_repository;
pub mod partner_company_repository;
pub mod phone_verification_repository;
pub mod service_package_repository;
pub mod user_repository;
pub mod wash_event_repository;
pub mod webhook_event_repository;

pub use driver_repository::DriverRepository;
pub use exchange_rate_repository::ExchangeRateRepository;
pub use invoice_repository::{InvoiceRepository, NewInvoice};
pub use location_repository::LocationRepository;
pub use network_repository::NetworkRepository;
pub use partner_company_repository::PartnerCompanyRepository;
pub use phone_verification_repository::{PhoneVerification, PhoneVerificationRepository};
pub use service_package_repository::ServicePackageRepository;
pub use user_repository::{User, UserRepository};
pub use wash_event_repository::{NewWashEvent, WashEventRepository};
pub use webhook_event_repository::WebhookEventRepository;
