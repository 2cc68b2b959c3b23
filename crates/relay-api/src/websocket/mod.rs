//! 실시간 시장 데이터 WebSocket 서버.
//!
//! 스트림 키마다 구독자가 한 명 이상일 때만 업스트림 폴링 태스크 하나를 유지하고,
//! 그 결과를 모든 구독자에게 팬아웃합니다.
//!
//! # 스트림 키
//!
//! - 호가: `BTC/USDT`
//! - 시세: `BTC/USDT:ticker`
//! - 캔들: `BTC/USDT:1h`
//!
//! # 메시지 형식
//!
//! 모든 메시지는 JSON 형식으로 교환됩니다.
//!
//! ## 클라이언트 → 서버 (`/ws`)
//!
//! ```json
//! {"type": "subscribe", "stream": "orderbook", "symbol": "BTC/USDT", "limit": 50}
//! {"type": "unsubscribe", "stream": "candles", "symbol": "BTC/USDT", "timeframe": "1h"}
//! {"type": "ping"}
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"type": "orderbook_update", "symbol": "BTC/USDT", "bids": [...], "asks": [...], "timestamp": 0}
//! {"type": "error", "message": "..."}
//! {"type": "pong", "timestamp": 0}
//! ```

pub mod connection;
pub mod handler;
pub mod manager;
pub mod messages;
pub mod polling;

pub use connection::{ClientConnection, ConnectionId};
pub use handler::{
    candles_handler, orderbook_handler, ticker_handler, websocket_handler, websocket_router,
    CandleParams, OrderbookParams, TickerParams, WsState,
};
pub use manager::{
    ConnectionManager, LifecycleStats, SharedConnectionManager, StreamInfo, StreamsSnapshot,
};
pub use messages::{
    CandleData, ClientMessage, OrderBookData, OrderBookLevel, ServerMessage, StreamRequest,
    TickerData, WsError,
};
pub use polling::{PollPlan, PollingTask};
