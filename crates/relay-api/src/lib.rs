//! 시장 데이터 릴레이 API 및 WebSocket 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 스트림별 폴링 태스크 수명주기를 관리하는 연결 매니저
//! - 호가/시세/캔들 WebSocket endpoint
//! - 헬스 체크 및 스트림 조회 REST API
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 연결 매니저와 WebSocket 서버
//! - [`simulator`]: 랜덤 워크 시장 데이터 소스
//! - [`metrics`]: Prometheus 메트릭 수집

pub mod error;
pub mod metrics;
pub mod routes;
pub mod simulator;
pub mod state;
pub mod websocket;

pub use error::{ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use routes::*;
pub use simulator::SimulatedMarketSource;
pub use state::AppState;
pub use websocket::{
    websocket_handler, websocket_router, ClientConnection, ClientMessage, ConnectionManager,
    ServerMessage, SharedConnectionManager, StreamsSnapshot, WsError, WsState,
};

#[cfg(any(test, feature = "test-utils"))]
pub use state::create_test_state;
