//! 시장 데이터 릴레이 서버.
//!
//! 업스트림 소스를 폴링해 호가, 시세, 캔들 업데이트를 WebSocket 구독자에게
//! 팬아웃합니다. 헬스 체크와 스트림 조회 REST API, Prometheus 메트릭을 함께 제공합니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use relay_api::metrics::setup_metrics_recorder;
use relay_api::routes::create_api_router;
use relay_api::simulator::SimulatedMarketSource;
use relay_api::state::AppState;
use relay_api::websocket::websocket_router;
use relay_core::{init_logging, LogConfig, RelayConfig};

/// CORS 레이어 생성.
///
/// `CORS_ORIGINS` 환경 변수(쉼표 구분)가 있으면 해당 origin만 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
}

/// Prometheus 메트릭 endpoint.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let ws_router = websocket_router(state.ws_state());
    let api_router = create_api_router().with_state(state);

    Router::new()
        .merge(metrics_router)
        .merge(api_router)
        .merge(ws_router)
        .layer(TraceLayer::new_for_http())
        // 업그레이드 이후의 WebSocket 세션에는 적용되지 않습니다.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer())
}

/// 설정 파일 경로. `RELAY_CONFIG`가 없으면 기본 경로를 사용합니다.
fn load_config() -> anyhow::Result<RelayConfig> {
    let config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => RelayConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => RelayConfig::load_default().context("failed to load default config")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = load_config()?;

    init_logging(LogConfig::from(&config.logging).with_env_overrides())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    info!("Starting market relay server...");

    let metrics_handle = setup_metrics_recorder().context("failed to install metrics recorder")?;
    info!("Prometheus metrics recorder initialized");

    let source = Arc::new(SimulatedMarketSource::new(&config.simulator));
    let state = Arc::new(AppState::new(source, config.streams.clone()));
    let manager = state.manager.clone();

    info!(
        version = %state.version,
        source = manager.source_name(),
        max_connections_per_stream = config.streams.max_connections_per_stream,
        "Application state initialized"
    );

    let app = create_router(state, metrics_handle);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "Relay server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown initiated, cleaning up...");

    // 남은 폴링 태스크 정리에 최대 10초 대기
    if tokio::time::timeout(Duration::from_secs(10), manager.shutdown())
        .await
        .is_err()
    {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 완료됩니다.
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
