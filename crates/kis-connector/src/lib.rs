//! 한국투자증권 (KIS) 읽기 전용 연동 라이브러리.
//!
//! # 기능
//!
//! - OAuth 2.0 접근 토큰 캐싱 (동시 요청 병합)
//! - 시세/투자자/잔고 조회 REST 클라이언트
//! - 투자자별 매매동향 필드 시계열 수집 (휴장일 역방향 탐색)
//! - 시세/수급 응답 요약
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use kis_connector::{KisClient, KisConfig, SeriesFetcher, SeriesOptions};
//!
//! let client = KisClient::new(KisConfig::from_env()?)?;
//! let fetcher = SeriesFetcher::new(client);
//! let series = fetcher.fetch_series("005930", "fb", 3, &SeriesOptions::default()).await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod quote;
pub mod series;

pub use auth::{preview, CachedToken, TokenCache};
pub use client::{BalanceQuery, KisClient, UpstreamResponse};
pub use config::{KisAccount, KisConfig, KisEnvironment, TokenSettings, TrIds, UpstreamPaths};
pub use error::{sanitize_body, truncate_chars, UpstreamError, MAX_ERROR_BODY_CHARS};
pub use flow::{FlowSide, FlowSummary};
pub use quote::QuoteSummary;
pub use series::{
    FetchStrategy, NonNumericPolicy, SeriesFetcher, SeriesOptions, SeriesPoint, SeriesSchema,
};

/// KIS 거래 ID (tr_id) 상수 모음.
///
/// 거래 ID는 모든 API 호출에서 작업 유형을 식별하기 위해 필요합니다.
pub mod tr_id {
    /// 국내 주식 현재가 조회 (실전/모의 공통)
    pub const KR_PRICE: &str = "FHKST01010100";

    /// 주식현재가 투자자 조회
    pub const KR_INVESTOR: &str = "FHKST01010900";

    /// 종목별 투자자매매동향 (일별)
    pub const KR_INVESTOR_DAILY: &str = "FHPTJ04160001";

    /// 국내 주식 잔고 조회 (실전)
    pub const KR_BALANCE_REAL: &str = "TTTC8434R";
    /// 국내 주식 잔고 조회 (모의)
    pub const KR_BALANCE_PAPER: &str = "VTTC8434R";
}
