//! 한국투자증권 (KIS) 업스트림 설정.
//!
//! KIS API는 app_key와 app_secret을 사용한 OAuth 2.0 인증이 필요합니다.
//! 경로와 tr_id는 계정/문서 버전에 따라 다를 수 있어 환경 변수로 덮어쓸 수 있습니다.

use crate::tr_id;
use crate::UpstreamError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// 기본 요청 타임아웃 (초).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// 기본 토큰 만료 안전 여유 (초).
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;
/// 업스트림이 만료 시각을 주지 않을 때 사용하는 기본 TTL (초).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 9 * 60;

/// KIS API 환경 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KisEnvironment {
    /// 실전투자
    #[default]
    Real,
    /// 모의투자
    Paper,
}

impl KisEnvironment {
    /// 이 환경의 REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "https://openapi.koreainvestment.com:9443",
            KisEnvironment::Paper => "https://openapivts.koreainvestment.com:29443",
        }
    }

    /// 문자열에서 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "real" | "prod" | "live" => Some(KisEnvironment::Real),
            "paper" | "mock" | "vts" | "test" => Some(KisEnvironment::Paper),
            _ => None,
        }
    }
}

/// 업스트림 엔드포인트 경로.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPaths {
    pub token: String,
    pub approval: String,
    pub price: String,
    pub investor: String,
    pub flow: String,
    pub balance: String,
}

impl Default for UpstreamPaths {
    fn default() -> Self {
        Self {
            token: "/oauth2/tokenP".to_string(),
            approval: "/oauth2/Approval".to_string(),
            price: "/uapi/domestic-stock/v1/quotations/inquire-price".to_string(),
            investor: "/uapi/domestic-stock/v1/quotations/investor-trade-by-stock-daily"
                .to_string(),
            flow: "/uapi/domestic-stock/v1/quotations/inquire-investor".to_string(),
            balance: "/uapi/domestic-stock/v1/trading/inquire-balance".to_string(),
        }
    }
}

/// 엔드포인트별 거래 ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrIds {
    pub price: String,
    pub investor: String,
    pub flow: String,
    pub balance: String,
}

impl TrIds {
    /// 환경에 맞는 기본 tr_id 세트.
    pub fn for_environment(env: KisEnvironment) -> Self {
        let balance = match env {
            KisEnvironment::Real => tr_id::KR_BALANCE_REAL,
            KisEnvironment::Paper => tr_id::KR_BALANCE_PAPER,
        };
        Self {
            price: tr_id::KR_PRICE.to_string(),
            investor: tr_id::KR_INVESTOR_DAILY.to_string(),
            flow: tr_id::KR_INVESTOR.to_string(),
            balance: balance.to_string(),
        }
    }
}

/// 잔고 조회용 기본 계좌.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KisAccount {
    /// 계좌번호 앞 8자리 (CANO)
    pub cano: String,
    /// 계좌상품코드 (ACNT_PRDT_CD), 주식은 일반적으로 "01"
    pub product_code: String,
}

/// 토큰 캐시 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    /// 만료 전 이 시간 안에 들어오면 토큰을 재발급
    pub safety_margin: Duration,
    /// 만료 시각이 없는 응답에 적용할 TTL
    pub default_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS),
            default_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

/// KIS API 설정.
#[derive(Debug)]
pub struct KisConfig {
    /// 앱키
    pub app_key: String,
    /// 앱시크릿
    pub app_secret: SecretString,
    /// 환경 (실전/모의)
    pub environment: KisEnvironment,
    /// 기본 URL 재정의 (KIS_BASE)
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// custtype 헤더 (P = 개인)
    pub custtype: String,
    pub paths: UpstreamPaths,
    pub tr_ids: TrIds,
    /// 잔고 조회 기본 계좌
    pub account: Option<KisAccount>,
    pub token: TokenSettings,
}

impl KisConfig {
    /// 새로운 KIS 설정 생성.
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        let environment = KisEnvironment::default();
        Self {
            app_key: app_key.into(),
            app_secret: SecretString::new(app_secret.into().into_boxed_str()),
            environment,
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            custtype: "P".to_string(),
            paths: UpstreamPaths::default(),
            tr_ids: TrIds::for_environment(environment),
            account: None,
            token: TokenSettings::default(),
        }
    }

    /// 환경 설정 및 tr_id 기본값 갱신.
    pub fn with_environment(mut self, env: KisEnvironment) -> Self {
        self.environment = env;
        self.tr_ids.balance = TrIds::for_environment(env).balance;
        self
    }

    /// 기본 URL 재정의.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_account(mut self, cano: impl Into<String>, product_code: impl Into<String>) -> Self {
        self.account = Some(KisAccount {
            cano: cano.into(),
            product_code: product_code.into(),
        });
        self
    }

    pub fn with_token_settings(mut self, token: TokenSettings) -> Self {
        self.token = token;
        self
    }

    /// 환경 변수에서 설정 생성.
    ///
    /// # 필수 환경 변수
    /// - `KIS_APP_KEY`, `KIS_APP_SECRET`
    ///
    /// # 선택 환경 변수
    /// - `KIS_ENV` ("real" | "paper"), `KIS_BASE`, `KIS_TIMEOUT_SECS`, `KIS_CUSTTYPE`
    /// - `KIS_PRICE_PATH`, `KIS_INVESTOR_PATH`, `KIS_FLOW_PATH`, `KIS_BALANCE_PATH`
    /// - `KIS_TR_ID_PRICE`, `KIS_TR_ID_INVESTOR`, `KIS_TR_ID_FLOW`, `KIS_TR_ID_BALANCE`
    /// - `KIS_CANO`, `KIS_ACNT_PRDT_CD`
    /// - `TOKEN_SAFETY_MARGIN_SECS`, `TOKEN_DEFAULT_TTL_SECS`
    ///
    /// # Errors
    /// 필수 값이 없으면 `UpstreamError::Config`를 반환합니다.
    pub fn from_env() -> Result<Self, UpstreamError> {
        let app_key = required_env("KIS_APP_KEY")?;
        let app_secret = required_env("KIS_APP_SECRET")?;

        let environment = optional_env("KIS_ENV")
            .and_then(|s| KisEnvironment::parse(&s))
            .unwrap_or_default();

        let mut config = Self::new(app_key, app_secret)
            .with_environment(environment)
            .with_timeout_secs(env_parse("KIS_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))
            .with_token_settings(TokenSettings {
                safety_margin: Duration::from_secs(env_parse(
                    "TOKEN_SAFETY_MARGIN_SECS",
                    DEFAULT_SAFETY_MARGIN_SECS,
                )),
                default_ttl: Duration::from_secs(env_parse(
                    "TOKEN_DEFAULT_TTL_SECS",
                    DEFAULT_TOKEN_TTL_SECS,
                )),
            });

        if let Some(base) = optional_env("KIS_BASE") {
            config = config.with_base_url(base);
        }
        if let Some(custtype) = optional_env("KIS_CUSTTYPE") {
            config.custtype = custtype;
        }

        override_from_env(&mut config.paths.price, "KIS_PRICE_PATH");
        override_from_env(&mut config.paths.investor, "KIS_INVESTOR_PATH");
        override_from_env(&mut config.paths.flow, "KIS_FLOW_PATH");
        override_from_env(&mut config.paths.balance, "KIS_BALANCE_PATH");
        override_from_env(&mut config.tr_ids.price, "KIS_TR_ID_PRICE");
        override_from_env(&mut config.tr_ids.investor, "KIS_TR_ID_INVESTOR");
        override_from_env(&mut config.tr_ids.flow, "KIS_TR_ID_FLOW");
        override_from_env(&mut config.tr_ids.balance, "KIS_TR_ID_BALANCE");

        if let Some(cano) = optional_env("KIS_CANO") {
            let product = optional_env("KIS_ACNT_PRDT_CD").unwrap_or_else(|| "01".to_string());
            config = config.with_account(cano, product);
        }

        Ok(config)
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.rest_base_url())
    }

    /// 경로를 기본 URL과 결합.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.rest_base_url(), path)
    }

    /// 앱시크릿 원문.
    pub fn app_secret(&self) -> &str {
        self.app_secret.expose_secret()
    }

    /// 에러 본문 마스킹에 사용할 비밀값 목록.
    pub fn secrets(&self) -> [&str; 2] {
        [self.app_key.as_str(), self.app_secret()]
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_env(key: &str) -> Result<String, UpstreamError> {
    optional_env(key).ok_or_else(|| UpstreamError::Config(format!("Missing env: {}", key)))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional_env(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn override_from_env(slot: &mut String, key: &str) {
    if let Some(value) = optional_env(key) {
        *slot = value;
    }
}
