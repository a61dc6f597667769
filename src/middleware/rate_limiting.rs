use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
};
use dashmap::DashMap;
use futures_util::future::{Ready, ok};
use log::{debug, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::config::settings::RateLimitConfig;
use crate::error::AppError;
use crate::models::AuthenticatedUser;

/// Rate limiting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStrategy {
    /// Rate limit by IP address (for public routes)
    ByIp,
    /// Rate limit by authenticated user ID (for protected routes)
    ByUser,
    /// Rate limit by both IP and user (strictest)
    ByIpAndUser,
}

/// Sliding window rate limiter entry
#[derive(Debug, Clone)]
pub struct SlidingWindowEntry {
    /// Timestamps of requests within the current window
    requests: Vec<Instant>,
}

impl SlidingWindowEntry {
    fn new() -> Self {
        Self { requests: Vec::new() }
    }

    /// Records the request if it fits under `max_requests` within `window`.
    fn try_acquire(&mut self, now: Instant, max_requests: u64, window: Duration) -> bool {
        self.prune(now, window);
        if (self.requests.len() as u64) < max_requests {
            self.requests.push(now);
            true
        } else {
            false
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        // None: the process is younger than the window, everything is still inside it
        if let Some(cutoff) = now.checked_sub(window) {
            self.requests.retain(|&at| at > cutoff);
        }
    }

    /// Time until the oldest request leaves the window.
    fn retry_after(&self, now: Instant, window: Duration) -> Option<Duration> {
        let oldest = self.requests.first()?;
        window.checked_sub(now.duration_since(*oldest))
    }
}

/// In-memory sliding window storage shared by all limiter instances of the process.
#[derive(Clone, Default)]
pub struct RateLimitStorage {
    windows: Arc<DashMap<String, SlidingWindowEntry>>,
}

impl RateLimitStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Err(retry_after)` when `key` already used its budget.
    pub fn check(&self, key: &str, max_requests: u64, window: Duration) -> Result<(), Duration> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(SlidingWindowEntry::new);

        if entry.try_acquire(now, max_requests, window) {
            Ok(())
        } else {
            Err(entry.retry_after(now, window).unwrap_or(window))
        }
    }

    /// Drops keys that have no requests left inside the window.
    pub fn cleanup(&self, window: Duration) {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, entry| {
            entry.prune(now, window);
            !entry.requests.is_empty()
        });
        debug!(
            "Rate limit cleanup removed {} idle key(s)",
            before.saturating_sub(self.windows.len())
        );
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Rate limiting middleware
#[derive(Clone)]
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    strategy: RateLimitStrategy,
    storage: RateLimitStorage,
}

impl RateLimitMiddleware {
    pub fn with_shared_storage(
        config: RateLimitConfig,
        strategy: RateLimitStrategy,
        storage: RateLimitStorage,
    ) -> Self {
        Self {
            config,
            strategy,
            storage,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.config.window_ms)
    }

    /// Keys this request is counted against under the configured strategy.
    fn keys_for(&self, req: &ServiceRequest) -> Vec<String> {
        let user_key = req
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| format!("user:{}", user.user_id));
        let ip_key = || format!("ip:{}", extract_client_ip(req));

        match self.strategy {
            RateLimitStrategy::ByIp => vec![ip_key()],
            // No user context: the auth middleware rejects these anyway
            RateLimitStrategy::ByUser => user_key.into_iter().collect(),
            RateLimitStrategy::ByIpAndUser => std::iter::once(ip_key()).chain(user_key).collect(),
        }
    }

    fn check_request(&self, req: &ServiceRequest) -> Result<(), AppError> {
        let window = self.window();
        for key in self.keys_for(req) {
            if let Err(retry_after) = self.storage.check(&key, self.config.max_requests, window) {
                warn!(
                    "Rate limit exceeded for {} on {} (strategy: {:?})",
                    key,
                    req.path(),
                    self.strategy
                );
                return Err(AppError::TooManyRequests(format!(
                    "Rate limit exceeded. Retry in {} seconds.",
                    retry_after.as_secs().max(1)
                )));
            }
        }
        Ok(())
    }
}

// The first IP in X-Forwarded-For is typically the original client.
fn extract_client_ip(req: &ServiceRequest) -> String {
    if let Some(first_ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
    {
        return first_ip.trim().to_string();
    }

    if let Some(real_ip) = req.headers().get("x-real-ip").and_then(|h| h.to_str().ok()) {
        return real_ip.to_string();
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitService {
            service: Rc::new(service),
            middleware: self.clone(),
        })
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    middleware: RateLimitMiddleware,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
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

        // Skip rate limiting for OPTIONS requests (CORS preflight)
        if req.method() == actix_web::http::Method::OPTIONS {
            return Box::pin(service.call(req));
        }

        match self.middleware.check_request(&req) {
            Ok(()) => Box::pin(service.call(req)),
            Err(e) => Box::pin(async move { Err(Error::from(e)) }),
        }
    }
}

pub fn create_ip_rate_limiter(config: RateLimitConfig, storage: RateLimitStorage) -> RateLimitMiddleware {
    RateLimitMiddleware::with_shared_storage(config, RateLimitStrategy::ByIp, storage)
}

pub fn create_user_rate_limiter(config: RateLimitConfig, storage: RateLimitStorage) -> RateLimitMiddleware {
    RateLimitMiddleware::with_shared_storage(config, RateLimitStrategy::ByUser, storage)
}

/// Start a background task for cleaning up idle rate limit keys
pub async fn start_memory_store_cleanup_task(
    storage: RateLimitStorage,
    window_duration: Duration,
    cleanup_interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs));
    info!(
        "Starting rate limit memory store cleanup task (interval: {}s)",
        cleanup_interval_secs
    );

    loop {
        interval.tick().await;
        storage.cleanup(window_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;
    use actix_web::{App, HttpResponse, http::StatusCode, web};

    fn config(max_requests: u64) -> RateLimitConfig {
        RateLimitConfig {
            window_ms: 60_000,
            max_requests,
        }
    }

    #[test]
    fn test_sliding_window_rejects_request_over_budget() {
        let storage = RateLimitStorage::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(storage.check("ip:10.0.0.1", 3, window).is_ok());
        }
        let retry_after = storage.check("ip:10.0.0.1", 3, window).unwrap_err();
        assert!(retry_after <= window);

        // Other keys keep their own budget
        assert!(storage.check("ip:10.0.0.2", 3, window).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let mut entry = SlidingWindowEntry::new();
        let window = Duration::from_millis(100);
        let start = Instant::now();
        assert!(entry.try_acquire(start, 1, window));
        assert!(!entry.try_acquire(start + Duration::from_millis(50), 1, window));
        assert!(entry.try_acquire(start + Duration::from_millis(150), 1, window));
    }

    #[test]
    fn test_cleanup_drops_idle_keys() {
        let storage = RateLimitStorage::new();
        storage.check("ip:10.0.0.1", 5, Duration::from_secs(60)).unwrap();
        assert_eq!(storage.len(), 1);
        storage.cleanup(Duration::ZERO);
        assert!(storage.is_empty());
    }

    #[actix_web::test]
    async fn test_middleware_returns_429_after_limit() {
        let limiter = create_ip_rate_limiter(config(2), RateLimitStorage::new());
        let app = actix_test::init_service(
            App::new()
                .wrap(limiter)
                .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..2 {
            let req = actix_test::TestRequest::get()
                .uri("/health")
                .insert_header(("x-forwarded-for", "203.0.113.7"))
                .to_request();
            assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = actix_test::TestRequest::get()
            .uri("/health")
            .insert_header(("x-forwarded-for", "203.0.113.7"))
            .to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
