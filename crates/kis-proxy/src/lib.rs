//! 한국투자증권 읽기 전용 HTTP 프록시.
//!
//! 클라이언트 앱이 KIS 자격증명 없이 시세, 투자자 동향, 잔고, 필드 시계열을
//! 조회할 수 있도록 접근 키로 보호된 REST 엔드포인트를 제공합니다.
//! 주문 경로는 항상 403으로 거절합니다.

pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ProxyConfig};
pub use error::{ApiErrorResponse, ApiResult};
pub use routes::create_app;
pub use state::AppState;
