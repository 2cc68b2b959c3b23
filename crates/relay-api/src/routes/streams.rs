//! 스트림 상태 조회 endpoint.
//!
//! 현재 구독 중인 스트림, 폴링 태스크, 수명주기 카운터를 읽기 전용으로 노출합니다.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use relay_core::StreamType;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{relay_error_response, ApiResult};
use crate::state::AppState;
use crate::websocket::StreamsSnapshot;

/// 스트림 목록 필터.
#[derive(Debug, Default, Deserialize)]
pub struct StreamsQuery {
    /// 스트림 타입 (orderbook, ticker, candles)
    pub stream_type: Option<String>,
    /// base symbol
    pub symbol: Option<String>,
}

/// 스트림 목록 조회.
///
/// GET /api/v1/streams
pub async fn list_streams(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamsQuery>,
) -> ApiResult<Json<StreamsSnapshot>> {
    let stream_type = query
        .stream_type
        .as_deref()
        .map(str::parse::<StreamType>)
        .transpose()
        .map_err(|e| relay_error_response(&e))?;

    let mut snapshot = state.manager.snapshot().await;
    snapshot.streams.retain(|stream| {
        stream_type.map_or(true, |t| stream.stream_type == Some(t))
            && query
                .symbol
                .as_deref()
                .map_or(true, |symbol| stream.base_symbol.as_deref() == Some(symbol))
    });

    Ok(Json(snapshot))
}

/// 스트림 라우터 생성.
pub fn streams_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_streams))
}
