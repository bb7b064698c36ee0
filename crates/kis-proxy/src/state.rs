//! 핸들러 공유 상태.

use chrono::{DateTime, Utc};
use kis_connector::{KisClient, KisConfig, SeriesFetcher, UpstreamError};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ProxyConfig;

/// 라우터 전체가 공유하는 상태.
///
/// `Arc<AppState>`로 감싸 핸들러에 전달합니다.
pub struct AppState {
    /// KIS REST 클라이언트 (토큰 캐시 포함)
    pub client: KisClient,
    /// 필드 시계열 수집기
    pub series: SeriesFetcher,
    access_key: SecretString,
    /// `/api/series`의 날짜별 동시 조회 수
    pub series_concurrency: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 설정으로 상태 생성.
    pub fn new(kis: KisConfig, proxy: &ProxyConfig) -> Result<Self, UpstreamError> {
        let client = KisClient::new(kis)?;
        let mut state = Self::from_client(client, proxy.access_key.expose_secret());
        state.series_concurrency = proxy.series_concurrency.max(1);
        Ok(state)
    }

    /// 이미 만든 클라이언트로 상태 생성.
    pub fn from_client(client: KisClient, access_key: &str) -> Self {
        Self {
            series: SeriesFetcher::new(client.clone()),
            client,
            access_key: SecretString::new(access_key.to_string().into_boxed_str()),
            series_concurrency: 1,
            started_at: Utc::now(),
        }
    }

    /// 클라이언트가 보낸 접근 키 확인.
    pub fn verify_access_key(&self, presented: &str) -> bool {
        let expected = self.access_key.expose_secret();
        !expected.is_empty() && presented == expected
    }
}
