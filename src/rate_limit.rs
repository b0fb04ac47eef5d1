/// HTTP-layer rate limiting.
///
/// A coarse global limiter in front of every route, independent of the
/// per-account attempt budgets enforced inside the lifecycle.
use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter with separate budgets for anonymous and authenticated traffic
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    public: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let public_quota = Quota::per_second(
            NonZeroU32::new(config.public_rps).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(
            NonZeroU32::new(config.burst_size / 5).unwrap_or(NonZeroU32::new(10).unwrap()),
        );

        let authenticated_quota = Quota::per_second(
            NonZeroU32::new(config.authenticated_rps).unwrap_or(NonZeroU32::new(100).unwrap()),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::new(50).unwrap()));

        Self {
            enabled: config.enabled,
            public: Arc::new(GovernorLimiter::direct(public_quota)),
            authenticated: Arc::new(GovernorLimiter::direct(authenticated_quota)),
        }
    }

    /// Check rate limit for anonymous traffic
    pub fn check_public(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.public.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for authenticated traffic
    pub fn check_authenticated(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.authenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let has_auth_header = request.headers().get("authorization").is_some();

    let result = if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_public()
    };

    match result {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}
