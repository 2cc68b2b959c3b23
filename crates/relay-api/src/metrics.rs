//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 릴레이 수명주기 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.
//! 레코더가 설치되지 않은 상태(테스트 등)에서는 모든 기록이 no-op입니다.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

// ============================================================================
// 연결 메트릭
// ============================================================================

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("relay_websocket_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("relay_websocket_connections_active").decrement(1.0);
}

/// 용량 초과로 거절된 구독 카운터 증가.
pub fn record_connection_rejected(stream_type: &str) {
    counter!("relay_connections_rejected_total", "stream_type" => stream_type.to_string())
        .increment(1);
}

/// 전송 실패로 정리된 연결 수 기록.
pub fn record_broadcast_send_failures(count: usize) {
    counter!("relay_broadcast_send_failures_total").increment(count as u64);
}

// ============================================================================
// 폴링 메트릭
// ============================================================================

/// 활성 폴링 태스크 수 설정.
pub fn set_polling_tasks_active(count: usize) {
    gauge!("relay_polling_tasks_active").set(count as f64);
}

/// 틱 실패 카운터 증가.
pub fn record_tick_error(stream_type: &str) {
    counter!("relay_tick_errors_total", "stream_type" => stream_type.to_string()).increment(1);
}
