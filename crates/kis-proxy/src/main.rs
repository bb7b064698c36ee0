//! KIS 읽기 전용 프록시 서버.
//!
//! # 환경 변수
//!
//! - `KIS_APP_KEY`, `KIS_APP_SECRET`: KIS 자격증명 (필수)
//! - `PROXY_API_KEY`: 클라이언트 접근 키 (필수)
//! - `API_HOST`, `API_PORT`: 바인딩 주소 (기본 127.0.0.1:3000)
//! - `RUST_LOG`, `LOG_FORMAT`: 로깅

use std::net::SocketAddr;
use std::sync::Arc;

use kis_connector::KisConfig;
use kis_proxy::logging::{init_logging, LogConfig};
use kis_proxy::middleware::RateLimitState;
use kis_proxy::{create_app, AppState, ProxyConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (없어도 무시)
    dotenvy::dotenv().ok();

    init_logging(LogConfig::from_env())?;

    info!("Starting KIS proxy...");

    let kis_config = KisConfig::from_env().map_err(|e| {
        error!(error = %e, "KIS configuration is invalid. Check KIS_APP_KEY and KIS_APP_SECRET");
        e
    })?;
    let proxy_config = ProxyConfig::from_env().map_err(|e| {
        error!(error = %e, "Proxy configuration is invalid");
        e
    })?;
    let addr = proxy_config.socket_addr()?;

    info!(
        base_url = %kis_config.rest_base_url(),
        environment = ?kis_config.environment,
        has_account = kis_config.account.is_some(),
        "KIS upstream configured"
    );

    let state = Arc::new(AppState::new(kis_config, &proxy_config)?);

    let rate_limit = proxy_config.rate_limit().map(|config| {
        info!(
            requests_per_minute = config.requests_per_minute,
            burst = config.burst_size,
            "Rate limiting enabled"
        );
        let state = RateLimitState::new(config);
        state.spawn_cleanup();
        state
    });

    let app = create_app(state, &proxy_config, rate_limit);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "KIS proxy listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped gracefully");

    Ok(())
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
