//! HTTP 미들웨어.

mod auth;
mod rate_limit;
mod security;

pub use auth::{require_access_key, ACCESS_KEY_HEADERS};
pub use rate_limit::{
    extract_client_ip, rate_limit_middleware, RateLimitConfig, RateLimitResult, RateLimitState,
    RateLimiter,
};
pub use security::security_headers;
