//! REST 라우트.
//!
//! - `/health`, `/health/ready`: 헬스 체크
//! - `/api/v1/streams`: 활성 스트림 조회

pub mod health;
pub mod streams;

pub use health::{health_router, ReadinessReport, StreamHealth};
pub use streams::{streams_router, StreamsQuery};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// REST 라우터 조립.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/v1/streams", streams_router())
}
