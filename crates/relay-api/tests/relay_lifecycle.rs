//! 실제 소켓을 통한 릴레이 수명주기 테스트.
//!
//! 로컬 포트에 라우터를 띄우고 WebSocket 클라이언트로 구독, 팬아웃, 정리를 확인합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_api::websocket::{websocket_router, ConnectionManager, SharedConnectionManager, WsState};
use relay_core::{
    Candle, MarketDataSource, OrderBookSnapshot, SourceError, StreamKey, StreamSettings,
    TickerSnapshot,
};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct FixedSource;

#[async_trait]
impl MarketDataSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_order_book(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> Result<OrderBookSnapshot, SourceError> {
        Ok(OrderBookSnapshot {
            bids: vec![[100.0, 1.0]],
            asks: vec![[101.0, 2.0]],
            timestamp: Some(1_700_000_000_000),
        })
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<TickerSnapshot, SourceError> {
        Ok(TickerSnapshot {
            last: Some(100.5),
            base_volume: Some(3.0),
            timestamp: Some(1_700_000_000_000),
            ..Default::default()
        })
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _count: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        Ok(vec![Candle {
            timestamp: 1_700_000_000_000,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        }])
    }
}

async fn spawn_relay() -> (SocketAddr, SharedConnectionManager) {
    let settings = StreamSettings {
        orderbook_interval_ms: 50,
        ticker_interval_ms: 50,
        candles_interval_ms: 50,
        ..StreamSettings::default()
    };
    let manager = ConnectionManager::new(Arc::new(FixedSource), settings);
    let app = websocket_router(WsState::new(manager.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, manager)
}

/// 주어진 타입의 텍스트 메시지가 올 때까지 읽습니다.
async fn next_of_type(client: &mut Client, message_type: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == message_type {
                        return value;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended while waiting for {}: {:?}", message_type, other),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", message_type))
}

/// 조건이 참이 될 때까지 매니저 상태를 다시 확인합니다.
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_orderbook_endpoint_streams_and_cleans_up() {
    let (addr, manager) = spawn_relay().await;
    let url = format!(
        "ws://{}/ws/orderbook?symbol=BTC%2FUSDT&display_symbol=BTCUSDT&limit=10",
        addr
    );

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    let update = next_of_type(&mut first, "orderbook_update").await;
    assert_eq!(update["symbol"], "BTCUSDT");
    assert_eq!(update["bids"][0]["price"], 100.0);
    assert_eq!(update["asks"][0]["amount"], 2.0);
    next_of_type(&mut second, "orderbook_update").await;

    let key = StreamKey::orderbook("BTC/USDT");
    assert_eq!(manager.subscriber_count(&key).await, 2);
    assert_eq!(manager.active_task_count().await, 1);
    assert_eq!(manager.limit_override("BTC/USDT").await, Some(10));

    first.close(None).await.unwrap();
    wait_until(|| async { manager.subscriber_count(&key).await == 1 }).await;
    assert!(manager.is_streaming(&key).await);

    second.close(None).await.unwrap();
    wait_until(|| async { manager.active_task_count().await == 0 }).await;

    let snapshot = manager.snapshot().await;
    assert!(snapshot.streams.iter().all(|s| s.subscribers == 0));
    assert_eq!(snapshot.total_connections, 0);
    assert_eq!(snapshot.stats.tasks_started, 1);
    assert_eq!(snapshot.stats.tasks_stopped, 1);
}

#[tokio::test]
async fn test_multiplex_endpoint_subscribe_and_ping() {
    let (addr, manager) = spawn_relay().await;
    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    let welcome = next_of_type(&mut client, "welcome").await;
    assert!(welcome["version"].is_string());

    client
        .send(Message::Text(
            r#"{"type":"subscribe","stream":"candles","symbol":"ETH/USDT","timeframe":"1h"}"#
                .to_string(),
        ))
        .await
        .unwrap();
    let subscribed = next_of_type(&mut client, "subscribed").await;
    assert_eq!(subscribed["stream_key"], "ETH/USDT:1h");

    let candle = next_of_type(&mut client, "candle_update").await;
    assert_eq!(candle["symbol"], "ETH/USDT");
    assert_eq!(candle["timeframe"], "1h");
    assert_eq!(candle["close"], 1.5);

    client
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    next_of_type(&mut client, "pong").await;

    client
        .send(Message::Text(
            r#"{"type":"unsubscribe","stream":"candles","symbol":"ETH/USDT","timeframe":"1h"}"#
                .to_string(),
        ))
        .await
        .unwrap();
    let unsubscribed = next_of_type(&mut client, "unsubscribed").await;
    assert_eq!(unsubscribed["stream_key"], "ETH/USDT:1h");
    assert_eq!(manager.active_task_count().await, 0);
    assert!(manager.active_streams("ETH/USDT").await.is_empty());
}

#[tokio::test]
async fn test_invalid_candles_request_is_rejected_before_upgrade() {
    let (addr, manager) = spawn_relay().await;
    let result = connect_async(format!("ws://{}/ws/candles?symbol=BTC%2FUSDT&timeframe=", addr)).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 400);
        }
        other => panic!("expected HTTP 400, got {:?}", other.map(|(_, r)| r.status())),
    }
    assert_eq!(manager.active_task_count().await, 0);
}
