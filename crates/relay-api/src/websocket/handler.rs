//! WebSocket 연결 handler.
//!
//! 스트림별 전용 엔드포인트와 멀티플렉스 엔드포인트를 제공합니다.
//!
//! - `GET /ws/orderbook?symbol=BTC/USDT&limit=50&display_symbol=BTCUSDT`
//! - `GET /ws/ticker?symbol=BTC/USDT`
//! - `GET /ws/candles?symbol=BTC/USDT&timeframe=1h`
//! - `GET /ws` (subscribe/unsubscribe 메시지로 여러 스트림 구독)
//!
//! 소켓이 닫히면 그 소켓이 구독한 모든 스트림에서 연결이 해제됩니다.

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use relay_core::{RelayError, StreamKey, StreamType};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::manager::SharedConnectionManager;
use super::messages::{ClientMessage, ServerMessage, StreamRequest};
use crate::error::relay_error_response;
use crate::metrics::{decrement_websocket_connections, increment_websocket_connections};

/// WebSocket 상태.
#[derive(Clone)]
pub struct WsState {
    /// 스트림 수명주기 매니저
    pub manager: SharedConnectionManager,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성.
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }
}

/// `/ws/orderbook` 쿼리 파라미터.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookParams {
    pub symbol: String,
    pub display_symbol: Option<String>,
    pub limit: Option<usize>,
}

/// `/ws/ticker` 쿼리 파라미터.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerParams {
    pub symbol: String,
    pub display_symbol: Option<String>,
}

/// `/ws/candles` 쿼리 파라미터.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleParams {
    pub symbol: String,
    pub timeframe: String,
    pub display_symbol: Option<String>,
}

impl From<OrderbookParams> for StreamRequest {
    fn from(params: OrderbookParams) -> Self {
        Self {
            stream: StreamType::Orderbook,
            symbol: params.symbol,
            timeframe: None,
            display_symbol: params.display_symbol,
            limit: params.limit,
        }
    }
}

impl From<TickerParams> for StreamRequest {
    fn from(params: TickerParams) -> Self {
        Self {
            stream: StreamType::Ticker,
            symbol: params.symbol,
            timeframe: None,
            display_symbol: params.display_symbol,
            limit: None,
        }
    }
}

impl From<CandleParams> for StreamRequest {
    fn from(params: CandleParams) -> Self {
        Self {
            stream: StreamType::Candles,
            symbol: params.symbol,
            timeframe: Some(params.timeframe),
            display_symbol: params.display_symbol,
            limit: None,
        }
    }
}

impl StreamRequest {
    /// 요청에 해당하는 스트림 키.
    pub fn stream_key(&self) -> Result<StreamKey, RelayError> {
        StreamKey::for_stream(self.stream, &self.symbol, self.timeframe.as_deref())
    }
}

/// 멀티플렉스 WebSocket 업그레이드 핸들러.
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, None))
}

/// `GET /ws/orderbook`
pub async fn orderbook_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Query(params): Query<OrderbookParams>,
) -> Response {
    upgrade_with_stream(ws, state, params.into())
}

/// `GET /ws/ticker`
pub async fn ticker_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Query(params): Query<TickerParams>,
) -> Response {
    upgrade_with_stream(ws, state, params.into())
}

/// `GET /ws/candles`
pub async fn candles_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Query(params): Query<CandleParams>,
) -> Response {
    upgrade_with_stream(ws, state, params.into())
}

/// 스트림 지정이 잘못되었으면 업그레이드 전에 400으로 거절합니다.
fn upgrade_with_stream(ws: WebSocketUpgrade, state: WsState, request: StreamRequest) -> Response {
    if let Err(e) = request.stream_key() {
        warn!(symbol = %request.symbol, stream = %request.stream, error = %e, "Rejected stream request");
        return relay_error_response(&e).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(request)))
}

/// 소켓 하나의 구독 상태.
struct ClientSession {
    connection: ClientConnection,
    streams: HashSet<StreamKey>,
}

impl ClientSession {
    fn new(connection: ClientConnection) -> Self {
        Self {
            connection,
            streams: HashSet::new(),
        }
    }

    /// 스트림 구독. 용량 초과로 거절되면 `Ok(None)`.
    async fn subscribe(
        &mut self,
        state: &WsState,
        request: &StreamRequest,
    ) -> Result<Option<StreamKey>, RelayError> {
        let stream_key = request.stream_key()?;
        let display_symbol = request.display_symbol.as_deref();

        let registered = match request.stream {
            StreamType::Orderbook => {
                let limit = request
                    .limit
                    .unwrap_or(state.manager.settings().default_orderbook_limit);
                state
                    .manager
                    .connect_orderbook(&self.connection, &request.symbol, display_symbol, limit)
                    .await
            }
            stream_type => {
                state
                    .manager
                    .connect(&self.connection, &stream_key, stream_type, display_symbol)
                    .await
            }
        };

        if !registered {
            return Ok(None);
        }
        self.streams.insert(stream_key.clone());
        Ok(Some(stream_key))
    }

    async fn unsubscribe(
        &mut self,
        state: &WsState,
        stream: StreamType,
        symbol: &str,
        timeframe: Option<&str>,
    ) -> Result<StreamKey, RelayError> {
        let stream_key = StreamKey::for_stream(stream, symbol, timeframe)?;
        state.manager.disconnect(&self.connection, &stream_key).await;
        self.streams.remove(&stream_key);
        Ok(stream_key)
    }

    /// 구독한 모든 스트림에서 연결을 해제합니다.
    async fn close(self, state: &WsState) {
        for stream_key in &self.streams {
            state.manager.disconnect(&self.connection, stream_key).await;
        }
    }

    /// 이 소켓에만 메시지를 보냅니다.
    fn reply(&self, message: &ServerMessage) {
        if let Err(e) = self.connection.send_json(message) {
            debug!(connection_id = %self.connection.id(), error = %e, "Reply dropped");
        }
    }
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState, initial: Option<StreamRequest>) {
    let (connection, mut outbound) = ClientConnection::new();
    let connection_id = connection.id();
    info!(%connection_id, "WebSocket connected");
    increment_websocket_connections();

    let (mut sender, mut receiver) = socket.split();

    // 매니저와 세션이 넣은 프레임을 소켓으로 내보내는 writer.
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = ClientSession::new(connection);
    match initial {
        Some(request) => {
            if let Err(e) = session.subscribe(&state, &request).await {
                session.reply(&ServerMessage::error(e.to_string()));
            }
        }
        None => session.reply(&ServerMessage::Welcome {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }),
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let keep_open = match incoming {
                    Some(Ok(msg)) => handle_client_message(&mut session, msg, &state).await,
                    Some(Err(e)) => {
                        warn!(%connection_id, error = %e, "WebSocket receive error");
                        false
                    }
                    None => false,
                };
                if !keep_open {
                    break;
                }
            }
            _ = &mut send_task => {
                debug!(%connection_id, "Send task ended");
                break;
            }
        }
    }

    session.close(&state).await;
    send_task.abort();
    decrement_websocket_connections();

    info!(%connection_id, "WebSocket disconnected");
}

/// 클라이언트 메시지 처리.
///
/// `true`면 연결 유지, `false`면 연결 종료.
async fn handle_client_message(session: &mut ClientSession, msg: Message, state: &WsState) -> bool {
    match msg {
        Message::Text(text) => {
            match ClientMessage::from_json(text.as_str()) {
                Ok(client_msg) => process_client_message(session, client_msg, state).await,
                Err(e) => {
                    warn!(connection_id = %session.connection.id(), error = %e, "Invalid client message");
                    session.reply(&ServerMessage::error(e.to_string()));
                    true
                }
            }
        }
        Message::Binary(_) => {
            warn!("Binary messages not supported");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!(connection_id = %session.connection.id(), "Close message received");
            false
        }
    }
}

/// 파싱된 클라이언트 메시지 처리.
async fn process_client_message(
    session: &mut ClientSession,
    msg: ClientMessage,
    state: &WsState,
) -> bool {
    match msg {
        ClientMessage::Subscribe(request) => match session.subscribe(state, &request).await {
            Ok(Some(stream_key)) => session.reply(&ServerMessage::Subscribed {
                stream_key: stream_key.to_string(),
                stream_type: request.stream,
            }),
            // 거절 메시지는 매니저가 이미 보냈습니다.
            Ok(None) => {}
            Err(e) => session.reply(&ServerMessage::error(e.to_string())),
        },

        ClientMessage::Unsubscribe {
            stream,
            symbol,
            timeframe,
        } => match session
            .unsubscribe(state, stream, &symbol, timeframe.as_deref())
            .await
        {
            Ok(stream_key) => session.reply(&ServerMessage::Unsubscribed {
                stream_key: stream_key.to_string(),
            }),
            Err(e) => session.reply(&ServerMessage::error(e.to_string())),
        },

        ClientMessage::Ping => session.reply(&ServerMessage::Pong {
            timestamp: Utc::now().timestamp_millis(),
        }),
    }
    true
}

/// WebSocket 라우터 생성.
pub fn websocket_router(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/ws/orderbook", get(orderbook_handler))
        .route("/ws/ticker", get(ticker_handler))
        .route("/ws/candles", get(candles_handler))
        .with_state(state)
}
