//! KIS OAuth 토큰 캐시.
//!
//! 처리 기능:
//! - 접근 토큰 발급 및 캐싱 (POST /oauth2/tokenP)
//! - 동시 발급 요청 병합 (single-flight)
//! - 실시간 접속 키 (POST /oauth2/Approval)
//!
//! KIS는 토큰 발급을 분당 1회로 제한하므로 프로세스 전체에서 하나의 캐시를 공유해야 합니다.

use crate::config::KisConfig;
use crate::error::{sanitize_body, MAX_ERROR_BODY_CHARS};
use crate::UpstreamError;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// KIS OAuth 토큰 응답.
///
/// 실패 응답도 같은 구조로 파싱할 수 있도록 모든 필드가 선택적입니다.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    /// 접근 토큰 만료 시각 (KIS 형식: "YYYY-MM-DD HH:MM:SS", KST)
    pub access_token_token_expired: Option<String>,
}

/// KIS OAuth 오류 응답 (토큰 발급 실패 시).
#[derive(Debug, Clone, Deserialize)]
pub struct KisOAuthErrorResponse {
    /// 에러 코드 (예: "EGW00103")
    pub error_code: String,
    /// 에러 설명
    pub error_description: String,
}

/// KIS 실시간 접속 승인 응답.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalResponse {
    pub approval_key: String,
}

/// 만료 추적이 포함된 캐시 토큰.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// 접근 토큰
    pub value: String,
    /// 만료 시각
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// `now`가 `expires_at - safety_margin` 이전이면 재사용 가능.
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: std::time::Duration) -> bool {
        let margin = Duration::from_std(safety_margin).unwrap_or_else(|_| Duration::zero());
        now < self.expires_at - margin
    }

    /// 인증 헤더 값 반환.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// 토큰 앞 10자만 노출한 미리보기.
pub fn preview(token: &str) -> String {
    format!("{}...", token.chars().take(10).collect::<String>())
}

type PendingToken = Shared<BoxFuture<'static, Result<CachedToken, UpstreamError>>>;

#[derive(Default)]
struct TokenSlot {
    token: Option<CachedToken>,
    pending: Option<PendingToken>,
}

struct TokenCacheInner {
    config: Arc<KisConfig>,
    client: Client,
    slot: Mutex<TokenSlot>,
    approval_key: RwLock<Option<String>>,
    issued: AtomicU64,
}

/// KIS 접근 토큰 캐시.
///
/// 유효한 토큰이 있으면 I/O 없이 반환하고, 만료되었거나 없으면 한 번만 발급을 요청합니다.
/// 갱신 중 들어온 호출자는 모두 같은 `Shared` 퓨처를 기다리며 같은 결과(또는 같은 에러)를 받습니다.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<TokenCacheInner>,
}

impl TokenCache {
    /// 새 토큰 캐시 생성.
    ///
    /// `client`의 타임아웃이 토큰 발급 요청에도 그대로 적용됩니다.
    pub fn new(config: Arc<KisConfig>, client: Client) -> Self {
        Self {
            inner: Arc::new(TokenCacheInner {
                config,
                client,
                slot: Mutex::new(TokenSlot::default()),
                approval_key: RwLock::new(None),
                issued: AtomicU64::new(0),
            }),
        }
    }

    /// 유효한 접근 토큰 반환, 필요시 발급.
    ///
    /// # Errors
    /// 발급이 거부되면 `UpstreamError::TokenIssuance`, 시간 초과 시 `UpstreamError::Timeout`.
    /// 실패한 발급은 캐시에 남지 않으며 재시도하지 않습니다.
    pub async fn get_token(&self) -> Result<String, UpstreamError> {
        let pending = {
            let mut slot = self.inner.slot.lock().await;

            if let Some(ref token) = slot.token {
                if token.is_fresh(Utc::now(), self.inner.config.token.safety_margin) {
                    debug!("Using cached KIS token (expires at: {})", token.expires_at);
                    return Ok(token.value.clone());
                }
                warn!(
                    "KIS token expired or expiring soon (expires at: {}), refreshing...",
                    token.expires_at
                );
            }

            match slot.pending {
                Some(ref pending) => {
                    debug!("Joining in-flight KIS token request");
                    pending.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let pending = async move { inner.refresh().await }.boxed().shared();
                    slot.pending = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await.map(|token| token.value)
    }

    /// 캐시된 토큰 스냅샷 (API 호출 없이).
    pub async fn cached(&self) -> Option<CachedToken> {
        self.inner.slot.lock().await.token.clone()
    }

    /// 캐시된 토큰을 버려 다음 호출에서 재발급하도록 합니다.
    pub async fn invalidate(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.token.take().is_some() {
            info!("KIS token invalidated");
        }
    }

    /// 프로세스 시작 이후 성공한 발급 횟수.
    pub fn issued_count(&self) -> u64 {
        self.inner.issued.load(Ordering::Relaxed)
    }

    /// 실시간 접속 키 획득 (한 번 발급 후 재사용).
    pub async fn approval_key(&self) -> Result<String, UpstreamError> {
        if let Some(ref key) = *self.inner.approval_key.read().await {
            return Ok(key.clone());
        }

        let config = &self.inner.config;
        info!("Requesting KIS realtime approval key...");

        #[derive(Serialize)]
        struct ApprovalRequest<'a> {
            grant_type: &'a str,
            appkey: &'a str,
            secretkey: &'a str,
        }

        let response = self
            .inner
            .client
            .post(config.url(&config.paths.approval))
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&ApprovalRequest {
                grant_type: "client_credentials",
                appkey: &config.app_key,
                secretkey: config.app_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body = sanitize_body(&body, &config.secrets(), MAX_ERROR_BODY_CHARS);
            error!(status = status.as_u16(), body = %body, "KIS approval request failed");
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let approval: ApprovalResponse = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::Parse(format!("Failed to parse approval response: {}", e))
        })?;

        *self.inner.approval_key.write().await = Some(approval.approval_key.clone());
        info!("KIS realtime approval key obtained");

        Ok(approval.approval_key)
    }
}

impl TokenCacheInner {
    /// 발급 후 슬롯 갱신. 성공/실패와 관계없이 대기 중인 퓨처를 비웁니다.
    async fn refresh(self: Arc<Self>) -> Result<CachedToken, UpstreamError> {
        let result = self.issue().await;

        let mut slot = self.slot.lock().await;
        slot.pending = None;
        if let Ok(ref token) = result {
            slot.token = Some(token.clone());
            self.issued.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    async fn issue(&self) -> Result<CachedToken, UpstreamError> {
        let config = &self.config;

        info!(
            "Requesting new KIS access token... (AppKey: {}...)",
            config.app_key.chars().take(8).collect::<String>()
        );

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            appkey: &'a str,
            appsecret: &'a str,
        }

        let response = self
            .client
            .post(config.url(&config.paths.token))
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&TokenRequest {
                grant_type: "client_credentials",
                appkey: &config.app_key,
                appsecret: config.app_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let token_resp: TokenResponse = serde_json::from_str(&body).unwrap_or_default();
        let access_token = token_resp
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let Some(access_token) = access_token.filter(|_| status.is_success()) else {
            if let Ok(oauth_error) = serde_json::from_str::<KisOAuthErrorResponse>(&body) {
                error!(
                    error_code = %oauth_error.error_code,
                    "KIS OAuth error: {}",
                    oauth_error.error_description
                );
            }
            let body = sanitize_body(&body, &config.secrets(), MAX_ERROR_BODY_CHARS);
            error!(status = status.as_u16(), body = %body, "Token request failed");
            return Err(UpstreamError::TokenIssuance {
                status: status.as_u16(),
                body,
            });
        };

        let expires_at = token_resp
            .access_token_token_expired
            .as_deref()
            .and_then(parse_kis_datetime)
            .unwrap_or_else(|| {
                Utc::now()
                    + Duration::from_std(config.token.default_ttl)
                        .unwrap_or_else(|_| Duration::minutes(9))
            });

        info!("KIS access token obtained, expires at: {}", expires_at);

        Ok(CachedToken::new(access_token, expires_at))
    }
}

/// KIS 날짜시간 형식 파싱 ("YYYY-MM-DD HH:MM:SS").
fn parse_kis_datetime(s: &str) -> Option<DateTime<Utc>> {
    // KIS는 KST (한국 표준시, UTC+9) 사용
    use chrono::{NaiveDateTime, TimeZone};
    use chrono_tz::Asia::Seoul;

    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let kst = Seoul.from_local_datetime(&naive).single()?;
    Some(kst.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use mockito::Matcher;

    fn cache_for(server: &mockito::ServerGuard, settings: crate::config::TokenSettings) -> TokenCache {
        let config = KisConfig::new("test-app-key", "test-app-secret")
            .with_base_url(server.url())
            .with_token_settings(settings);
        TokenCache::new(Arc::new(config), Client::new())
    }

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let margin = std::time::Duration::from_secs(60);

        let token = CachedToken::new("t", now + Duration::minutes(10));
        assert!(token.is_fresh(now, margin));

        let expiring = CachedToken::new("t", now + Duration::seconds(59));
        assert!(!expiring.is_fresh(now, margin));

        let boundary = CachedToken::new("t", now + Duration::seconds(60));
        assert!(!boundary.is_fresh(now, margin));
    }

    #[test]
    fn test_token_auth_header() {
        let token = CachedToken::new("abc123", Utc::now());
        assert_eq!(token.auth_header(), "Bearer abc123");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abcdefghijklmnop"), "abcdefghij...");
        assert_eq!(preview("abc"), "abc...");
    }

    #[test]
    fn test_parse_kis_datetime() {
        let result = parse_kis_datetime("2026-01-28 15:30:00");
        assert!(result.is_some());

        let dt = result.unwrap();
        // KST is UTC+9, so 15:30 KST = 06:30 UTC
        assert_eq!(dt.hour(), 6);
        assert_eq!(dt.minute(), 30);

        assert!(parse_kis_datetime("not a date").is_none());
    }

    #[tokio::test]
    async fn test_token_reused_within_margin() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "grant_type": "client_credentials",
                "appkey": "test-app-key",
                "appsecret": "test-app-secret",
            })))
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":86400}"#)
            .expect(1)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());

        assert_eq!(cache.get_token().await.unwrap(), "tok-1");
        assert_eq!(cache.get_token().await.unwrap(), "tok-1");
        assert_eq!(cache.issued_count(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expiry_field_is_used() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(
                r#"{"access_token":"tok","access_token_token_expired":"2099-12-31 23:59:59"}"#,
            )
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        cache.get_token().await.unwrap();

        let cached = cache.cached().await.unwrap();
        assert_eq!(cached.expires_at, parse_kis_datetime("2099-12-31 23:59:59").unwrap());
    }

    #[tokio::test]
    async fn test_default_ttl_when_expiry_missing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok"}"#)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        let before = Utc::now();
        cache.get_token().await.unwrap();

        let cached = cache.cached().await.unwrap();
        let ttl = cached.expires_at - before;
        assert!(ttl >= Duration::minutes(9) - Duration::seconds(1));
        assert!(ttl <= Duration::minutes(9) + Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_stale_token_triggers_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok"}"#)
            .expect(2)
            .create_async()
            .await;

        // TTL이 안전 여유보다 짧으면 발급 직후부터 갱신 대상
        let cache = cache_for(
            &server,
            crate::config::TokenSettings {
                safety_margin: std::time::Duration::from_secs(60),
                default_ttl: std::time::Duration::from_secs(30),
            },
        );

        cache.get_token().await.unwrap();
        cache.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok"}"#)
            .expect(2)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        cache.get_token().await.unwrap();
        cache.invalidate().await;
        assert!(cache.cached().await.is_none());
        cache.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_access_token_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        let err = cache.get_token().await.unwrap_err();

        assert!(matches!(err, UpstreamError::TokenIssuance { status: 200, .. }));
        assert!(cache.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_token_masks_secret_in_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(403)
            .with_body(r#"{"error_code":"EGW00103","error_description":"bad key test-app-key"}"#)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        match cache.get_token().await {
            Err(UpstreamError::TokenIssuance { status, body }) => {
                assert_eq!(status, 403);
                assert!(body.contains("EGW00103"));
                assert!(!body.contains("test-app-key"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approval_key_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/Approval")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "secretkey": "test-app-secret",
            })))
            .with_status(200)
            .with_body(r#"{"approval_key":"ak-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let cache = cache_for(&server, Default::default());
        assert_eq!(cache.approval_key().await.unwrap(), "ak-1");
        assert_eq!(cache.approval_key().await.unwrap(), "ak-1");

        mock.assert_async().await;
    }
}
