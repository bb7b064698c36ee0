//! 클라이언트 IP별 요청 제한.
//!
//! 토큰 버킷 방식입니다. 버킷 용량은 초당 보충량에 버스트 허용량을 더한 값이며,
//! 초과 요청은 `429 RATE_LIMITED`와 `Retry-After` 헤더로 거절합니다.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::ApiErrorResponse;

/// 요청 제한 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// 순간적으로 추가 허용하는 요청 수
    pub burst_size: u32,
    /// 이 시간 동안 요청이 없던 버킷은 정리 대상
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RATE_LIMIT_RPM)
    }
}

impl RateLimitConfig {
    /// 분당 요청 수로 생성 (버스트 10%).
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: requests_per_minute / 10,
            cleanup_interval: Duration::from_secs(60),
        }
    }

    fn refill_per_sec(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

impl Bucket {
    fn full(config: &RateLimitConfig) -> Self {
        Self {
            tokens: capacity(config),
            last_seen: Instant::now(),
        }
    }
}

fn capacity(config: &RateLimitConfig) -> f64 {
    config.refill_per_sec() + f64::from(config.burst_size)
}

/// 요청 제한 판정 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// 다음 요청까지 대기 시간 (초)
        retry_after: u64,
    },
}

/// IP별 토큰 버킷 모음.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<RwLock<HashMap<IpAddr, Bucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 요청 하나를 허용할지 판정하고 토큰을 소비합니다.
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        let rate = self.config.refill_per_sec();
        let max = capacity(&self.config);

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(&self.config));

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(max);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return RateLimitResult::Allowed;
        }

        let retry_after = if rate > 0.0 {
            ((1.0 - bucket.tokens) / rate).ceil().max(1.0) as u64
        } else {
            self.config.cleanup_interval.as_secs().max(1)
        };
        RateLimitResult::Limited { retry_after }
    }

    /// `cleanup_interval` 동안 요청이 없던 버킷 제거.
    pub async fn cleanup(&self) {
        let interval = self.config.cleanup_interval;
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, bucket| bucket.last_seen.elapsed() < interval);
    }

    pub async fn tracked_ips(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// 미들웨어 상태.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// 주기적으로 오래된 버킷을 정리하는 백그라운드 태스크 시작.
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.limiter.clone();
        let period = limiter.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
                let tracked = limiter.tracked_ips().await;
                tracing::trace!(tracked, "Rate limit buckets pruned");
            }
        })
    }
}

/// 요청 제한 미들웨어.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request);

    match state.limiter.check(ip).await {
        RateLimitResult::Allowed => next.run(request).await,
        RateLimitResult::Limited { retry_after } => {
            tracing::warn!(client_ip = %ip, retry_after, "Rate limit exceeded");

            let body = ApiErrorResponse::with_details(
                "RATE_LIMITED",
                "Too many requests",
                serde_json::json!({ "retry_after": retry_after }),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

/// 클라이언트 IP 추출.
///
/// `x-forwarded-for`의 첫 항목, `x-real-ip`, 연결 주소 순으로 확인합니다.
pub fn extract_client_ip(request: &Request) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
