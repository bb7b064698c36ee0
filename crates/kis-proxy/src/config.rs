//! 프록시 서버 설정.
//!
//! KIS 업스트림 설정(`KisConfig::from_env`)과 별도로 서버 바인딩, 접근 키,
//! 요청 제한 등 HTTP 계층 설정을 환경 변수에서 읽습니다.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::middleware::RateLimitConfig;

/// 기본 분당 요청 수 (10초당 30회).
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 180;
/// `/api/series` 외 요청 타임아웃 (초).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// `/api/series` 요청 타임아웃 (초).
///
/// 날짜마다 최대 8회 업스트림을 호출하므로 일반 요청보다 훨씬 깁니다.
pub const DEFAULT_SERIES_TIMEOUT_SECS: u64 = 600;

/// 설정 에러.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing env: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// 프록시 서버 설정.
#[derive(Debug)]
pub struct ProxyConfig {
    /// 바인딩할 호스트 주소
    pub host: String,
    /// 바인딩할 포트
    pub port: u16,
    /// 클라이언트 접근 키 (`x-api-key` / `x-client-token`)
    pub access_key: SecretString,
    /// 분당 최대 요청 수 (IP별)
    pub rate_limit_rpm: u32,
    pub rate_limit_disabled: bool,
    /// 시계열 날짜별 동시 조회 수
    pub series_concurrency: usize,
    pub request_timeout: Duration,
    pub series_timeout: Duration,
    /// 허용 origin (비어 있으면 모두 허용)
    pub cors_origins: Vec<String>,
}

impl ProxyConfig {
    /// 접근 키만 지정한 기본 설정.
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            access_key: SecretString::new(access_key.into().into_boxed_str()),
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            rate_limit_disabled: false,
            series_concurrency: 1,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            series_timeout: Duration::from_secs(DEFAULT_SERIES_TIMEOUT_SECS),
            cors_origins: Vec::new(),
        }
    }

    /// 환경 변수에서 설정 로드.
    ///
    /// # 환경 변수
    /// - `PROXY_API_KEY` (필수)
    /// - `API_HOST`, `API_PORT`
    /// - `RATE_LIMIT_RPM`, `RATE_LIMIT_DISABLED`
    /// - `SERIES_CONCURRENCY`
    /// - `REQUEST_TIMEOUT_SECS`, `SERIES_TIMEOUT_SECS`
    /// - `CORS_ORIGINS` (쉼표 구분)
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key =
            env_opt("PROXY_API_KEY").ok_or_else(|| ConfigError::Missing("PROXY_API_KEY".into()))?;

        let mut config = Self::new(access_key);

        if let Some(host) = env_opt("API_HOST") {
            config.host = host;
        }
        config.port = env_parse("API_PORT", config.port)?;
        config.rate_limit_rpm = env_parse("RATE_LIMIT_RPM", config.rate_limit_rpm)?;
        config.rate_limit_disabled = env_opt("RATE_LIMIT_DISABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        config.series_concurrency = env_parse("SERIES_CONCURRENCY", 1usize)?.max(1);
        config.request_timeout = Duration::from_secs(
            env_parse("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?.max(1),
        );
        config.series_timeout = Duration::from_secs(
            env_parse("SERIES_TIMEOUT_SECS", DEFAULT_SERIES_TIMEOUT_SECS)?.max(1),
        );
        config.cors_origins = env_opt("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(config)
    }

    /// 소켓 주소 반환.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "API_HOST".into(),
            value: raw,
        })
    }

    /// 요청 제한 설정 (비활성화 시 `None`).
    pub fn rate_limit(&self) -> Option<RateLimitConfig> {
        if self.rate_limit_disabled {
            None
        } else {
            Some(RateLimitConfig::new(self.rate_limit_rpm))
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new("key");
        assert_eq!(config.access_key.expose_secret(), "key");
        assert_eq!(config.rate_limit_rpm, 180);
        assert_eq!(config.series_concurrency, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.series_timeout, Duration::from_secs(600));
        assert!(config.series_timeout > config.request_timeout);
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_rate_limit_toggle() {
        let mut config = ProxyConfig::new("key");
        assert_eq!(config.rate_limit().unwrap().requests_per_minute, 180);

        config.rate_limit_disabled = true;
        assert!(config.rate_limit().is_none());
    }

    #[test]
    fn test_invalid_host() {
        let mut config = ProxyConfig::new("key");
        config.host = "not a host".into();
        assert!(matches!(config.socket_addr(), Err(ConfigError::Invalid { .. })));
    }
}
