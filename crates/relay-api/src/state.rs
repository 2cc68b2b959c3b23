//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.

use std::sync::Arc;
use std::time::Instant;

use relay_core::{MarketDataSource, StreamSettings};

use crate::websocket::{ConnectionManager, SharedConnectionManager, WsState};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 스트림 수명주기 매니저
    pub manager: SharedConnectionManager,
    /// 서버 버전
    pub version: String,
    /// 서버 시작 시간
    pub started_at: Instant,
}

impl AppState {
    /// 시장 데이터 소스와 스트림 설정으로 상태 생성.
    pub fn new(source: Arc<dyn MarketDataSource>, settings: StreamSettings) -> Self {
        Self {
            manager: ConnectionManager::new(source, settings),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// 서버 가동 시간 (초).
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// 같은 매니저를 공유하는 WebSocket 상태.
    pub fn ws_state(&self) -> WsState {
        WsState::new(self.manager.clone())
    }
}

/// 시뮬레이터를 소스로 쓰는 테스트용 상태.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    use crate::simulator::SimulatedMarketSource;
    use relay_core::SimulatorConfig;

    let source = Arc::new(SimulatedMarketSource::new(&SimulatorConfig::default()));
    AppState::new(source, StreamSettings::default())
}
