pub mod rate_limiting;
pub mod secure_auth;
pub mod subscription_guard;

pub use rate_limiting::{
    RateLimitMiddleware, RateLimitStorage, create_ip_rate_limiter, create_user_rate_limiter,
    start_memory_store_cleanup_task,
};
pub use secure_auth::SecureAuthentication;
pub use subscription_guard::SubscriptionGuard;
