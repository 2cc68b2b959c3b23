//! WebSocket 메시지 타입.
//!
//! 클라이언트-서버 간 교환되는 메시지 정의. 모든 메시지는 `type` 태그를 가진 JSON 텍스트 프레임입니다.

use relay_core::StreamType;
use serde::{Deserialize, Serialize};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 스트림 구독 요청.
///
/// 멀티플렉스 소켓의 `subscribe` 메시지와 전용 엔드포인트의 쿼리 파라미터가
/// 모두 이 형태로 변환됩니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamRequest {
    /// 스트림 종류
    pub stream: StreamType,
    /// 업스트림 심볼 (예: "BTC/USDT")
    pub symbol: String,
    /// 캔들 타임프레임 (candles 전용)
    #[serde(default)]
    pub timeframe: Option<String>,
    /// 응답 페이로드에 표시할 심볼
    #[serde(default)]
    pub display_symbol: Option<String>,
    /// 호가창 깊이 (orderbook 전용)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 스트림 구독
    Subscribe(StreamRequest),
    /// 스트림 구독 해제
    Unsubscribe {
        stream: StreamType,
        symbol: String,
        #[serde(default)]
        timeframe: Option<String>,
    },
    /// 핑 (연결 유지)
    Ping,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 에러
    Error {
        /// 에러 메시지
        message: String,
    },
    /// 호가창 업데이트
    OrderbookUpdate(OrderBookData),
    /// 시세 업데이트
    TickerUpdate(TickerData),
    /// 캔들 업데이트
    CandleUpdate(CandleData),
    /// 구독 확인
    Subscribed {
        stream_key: String,
        stream_type: StreamType,
    },
    /// 구독 해제 확인
    Unsubscribed { stream_key: String },
    /// 퐁 응답
    Pong {
        /// 서버 타임스탬프 (ms)
        timestamp: i64,
    },
    /// 연결 환영 메시지
    Welcome {
        /// 서버 버전
        version: String,
        /// 서버 타임스탬프 (ms)
        timestamp: i64,
    },
}

impl ServerMessage {
    /// 에러 메시지 생성 헬퍼.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// ==================== 데이터 타입 ====================

/// 호가 레벨.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// 가격
    pub price: f64,
    /// 수량
    pub amount: f64,
}

impl From<[f64; 2]> for OrderBookLevel {
    fn from([price, amount]: [f64; 2]) -> Self {
        Self { price, amount }
    }
}

/// 호가창 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookData {
    /// 심볼 (표시용 별칭 우선)
    pub symbol: String,
    /// 매수 호가 리스트
    pub bids: Vec<OrderBookLevel>,
    /// 매도 호가 리스트
    pub asks: Vec<OrderBookLevel>,
    /// 타임스탬프 (ms)
    pub timestamp: i64,
}

/// 시세 데이터.
///
/// 값이 없거나 0인 필드는 `null`로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub change: Option<f64>,
    pub percentage: Option<f64>,
    pub volume: Option<f64>,
    pub quote_volume: Option<f64>,
    /// 타임스탬프 (ms)
    pub timestamp: i64,
}

/// 캔들 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleData {
    pub symbol: String,
    pub timeframe: String,
    /// 캔들 시작 시각 (ms)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
