//! 통합 API 에러 응답 타입.
//!
//! HTTP 엔드포인트(REST 조회, WebSocket 업그레이드 전 검증)에서 일관된 에러 형식을 제공합니다.
//! 업그레이드 이후의 에러는 WebSocket `error` 메시지로 전달됩니다.

use axum::{http::StatusCode, Json};
use relay_core::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "INVALID_STREAM",
///   "message": "Invalid stream: candles stream for BTC/USDT requires a timeframe",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_STREAM", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    ///
    /// ```
    /// use relay_api::error::ApiErrorResponse;
    ///
    /// let error = ApiErrorResponse::new("NOT_FOUND", "Stream not found");
    /// assert_eq!(error.code(), "NOT_FOUND");
    /// ```
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    /// 에러 코드 반환.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 에러 메시지 반환.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 릴레이 에러를 HTTP 상태 코드와 에러 응답으로 변환합니다.
pub fn relay_error_response(err: &RelayError) -> (StatusCode, Json<ApiErrorResponse>) {
    let message = err.to_string();
    let (status, body) = match err {
        RelayError::InvalidStream(_) => (
            StatusCode::BAD_REQUEST,
            ApiErrorResponse::new("INVALID_STREAM", message),
        ),
        RelayError::CapacityExceeded { stream_key, max } => (
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorResponse::with_details(
                "CAPACITY_EXCEEDED",
                message,
                serde_json::json!({ "stream_key": stream_key, "max": max }),
            ),
        ),
        RelayError::Source(_) => (
            StatusCode::BAD_GATEWAY,
            ApiErrorResponse::new("SOURCE_ERROR", message),
        ),
        RelayError::ConnectionClosed => (
            StatusCode::GONE,
            ApiErrorResponse::new("CONNECTION_CLOSED", message),
        ),
        RelayError::Serialization(_) | RelayError::Config(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorResponse::new("INTERNAL_ERROR", message),
        ),
    };
    (status, Json(body))
}
