//! 헬스 체크 endpoint.
//!
//! liveness는 프로세스 응답 여부만, readiness는 스트림 매니저 상태까지 확인합니다.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::websocket::StreamsSnapshot;

/// readiness 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// "ready" 또는 "degraded"
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// RFC 3339
    pub checked_at: String,
    /// 시장 데이터 소스 이름
    pub source: String,
    pub streams: StreamHealth,
}

/// 스트림 매니저 요약.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHealth {
    pub streams: usize,
    pub polling_tasks: usize,
    pub connections: usize,
    /// 구독자는 있지만 폴링이 멈춘 스트림
    pub stalled: Vec<String>,
}

impl From<&StreamsSnapshot> for StreamHealth {
    fn from(snapshot: &StreamsSnapshot) -> Self {
        Self {
            streams: snapshot.streams.len(),
            polling_tasks: snapshot.active_tasks,
            connections: snapshot.total_connections,
            stalled: snapshot
                .streams
                .iter()
                .filter(|stream| stream.subscribers > 0 && !stream.polling)
                .map(|stream| stream.stream_key.to_string())
                .collect(),
        }
    }
}

/// GET /health
pub async fn liveness() -> &'static str {
    "OK"
}

/// GET /health/ready
///
/// 멈춘 스트림이 있으면 503과 함께 `degraded`를 반환합니다.
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessReport>) {
    let snapshot = state.manager.snapshot().await;
    let streams = StreamHealth::from(&snapshot);

    let (code, status) = if streams.stalled.is_empty() {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!(stalled = ?streams.stalled, "Streams without active polling");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let report = ReadinessReport {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        checked_at: chrono::Utc::now().to_rfc3339(),
        source: state.manager.source_name().to_string(),
        streams,
    };

    (code, Json(report))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(liveness))
        .route("/ready", get(readiness))
}
