//! 릴레이 에러 타입.
//!
//! 업스트림 시장 데이터 호출 에러(`SourceError`)와 릴레이 내부 에러(`RelayError`)를 정의합니다.
//! 어떤 에러도 프로세스 전체를 중단시키지 않으며, 항상 하나의 스트림 키나
//! 하나의 연결 범위에서 처리됩니다.

use thiserror::Error;

/// 시장 데이터 소스 에러.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 일시적으로 사용 불가
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_) | SourceError::RateLimited | SourceError::Unavailable(_)
        )
    }
}

/// 릴레이 에러.
#[derive(Debug, Error)]
pub enum RelayError {
    /// 시장 데이터 소스 에러
    #[error("{0}")]
    Source(#[from] SourceError),

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 클라이언트 연결이 닫힘
    #[error("Connection closed")]
    ConnectionClosed,

    /// 스트림당 최대 연결 수 초과
    #[error("Maximum connections ({max}) reached for stream {stream_key}")]
    CapacityExceeded { stream_key: String, max: usize },

    /// 잘못된 스트림 지정
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    /// 설정 에러
    #[error("Config error: {0}")]
    Config(String),
}

/// 릴레이 작업을 위한 Result 타입.
pub type RelayResult<T> = Result<T, RelayError>;

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::Network("timeout".to_string()).is_retryable());
        assert!(SourceError::RateLimited.is_retryable());
        assert!(!SourceError::SymbolNotFound("XYZ".to_string()).is_retryable());
    }

    #[test]
    fn test_source_error_passes_message_through() {
        let err: RelayError = SourceError::SymbolNotFound("DOGE/XYZ".to_string()).into();
        assert_eq!(err.to_string(), "Symbol not found: DOGE/XYZ");
    }

    #[test]
    fn test_capacity_message() {
        let err = RelayError::CapacityExceeded {
            stream_key: "BTC/USDT".to_string(),
            max: 2,
        };
        assert_eq!(
            err.to_string(),
            "Maximum connections (2) reached for stream BTC/USDT"
        );
    }
}
