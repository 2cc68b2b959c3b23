//! 스트림 폴링.
//!
//! 스트림 키 하나당 폴링 루프 하나가 실행됩니다. 루프는 주기마다 업스트림을 한 번
//! 조회하고 결과를 매니저의 브로드캐스트로 넘깁니다. 루프 자체는 상태를 갖지 않으며
//! 깊이와 표시 심볼은 매 틱마다 매니저에서 읽어옵니다.

use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use relay_core::{
    Candle, MarketDataSource, OrderBookSnapshot, RelayError, StreamKey, StreamType, TickerSnapshot,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::manager::ConnectionManager;
use super::messages::{CandleData, OrderBookData, ServerMessage, TickerData};

/// 실행 중인 폴링 태스크 핸들.
///
/// 핸들이 drop되면 취소 토큰이 발동됩니다. 이미 조회를 마친 틱은 마지막
/// 브로드캐스트까지 끝낸 뒤 종료합니다.
#[derive(Debug)]
pub struct PollingTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollingTask {
    /// 태스크가 아직 실행 중인지 여부.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 스트림 키에서 복원한 업스트림 조회 계획.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPlan {
    Orderbook { symbol: String },
    Ticker { symbol: String },
    Candles { symbol: String, timeframe: String },
}

impl PollPlan {
    /// 키와 타입으로 조회 계획을 만듭니다.
    ///
    /// candles 키에 타임프레임 구분자가 없으면 `None`.
    pub fn resolve(stream_key: &StreamKey, stream_type: StreamType) -> Option<Self> {
        match stream_type {
            StreamType::Orderbook => Some(PollPlan::Orderbook {
                symbol: stream_key.as_str().to_string(),
            }),
            StreamType::Ticker => Some(PollPlan::Ticker {
                symbol: stream_key.ticker_symbol().to_string(),
            }),
            StreamType::Candles => {
                let (symbol, timeframe) = stream_key.candle_parts()?;
                Some(PollPlan::Candles {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                })
            }
        }
    }

    /// 업스트림 심볼.
    pub fn symbol(&self) -> &str {
        match self {
            PollPlan::Orderbook { symbol }
            | PollPlan::Ticker { symbol }
            | PollPlan::Candles { symbol, .. } => symbol,
        }
    }
}

/// 한 틱 분량의 조회 및 변환.
///
/// 캔들이 비어 있으면 `Ok(None)`을 반환하며 그 틱에는 아무것도 보내지 않습니다.
pub async fn fetch_update(
    source: &dyn MarketDataSource,
    plan: &PollPlan,
    display_symbol: Option<&str>,
    limit: usize,
) -> Result<Option<ServerMessage>, RelayError> {
    let symbol = display_symbol.unwrap_or(plan.symbol());

    match plan {
        PollPlan::Orderbook { symbol: upstream } => {
            let snapshot = source.fetch_order_book(upstream, limit).await?;
            Ok(Some(ServerMessage::OrderbookUpdate(format_orderbook(
                symbol, snapshot, limit,
            ))))
        }
        PollPlan::Ticker { symbol: upstream } => {
            let snapshot = source.fetch_ticker(upstream).await?;
            Ok(Some(ServerMessage::TickerUpdate(format_ticker(
                symbol, &snapshot,
            ))))
        }
        PollPlan::Candles {
            symbol: upstream,
            timeframe,
        } => {
            let candles = source.fetch_ohlcv(upstream, timeframe, 1).await?;
            Ok(candles
                .last()
                .map(|candle| ServerMessage::CandleUpdate(format_candle(symbol, timeframe, candle))))
        }
    }
}

/// 호가창 스냅샷을 출력 형식으로 변환합니다. 양쪽 모두 `limit` 단계로 자릅니다.
pub fn format_orderbook(symbol: &str, snapshot: OrderBookSnapshot, limit: usize) -> OrderBookData {
    let OrderBookSnapshot {
        bids,
        asks,
        timestamp,
    } = snapshot;

    OrderBookData {
        symbol: symbol.to_string(),
        bids: bids.into_iter().take(limit).map(Into::into).collect(),
        asks: asks.into_iter().take(limit).map(Into::into).collect(),
        timestamp: timestamp.unwrap_or_else(now_millis),
    }
}

/// 시세 스냅샷을 출력 형식으로 변환합니다.
pub fn format_ticker(symbol: &str, snapshot: &TickerSnapshot) -> TickerData {
    TickerData {
        symbol: symbol.to_string(),
        last: non_zero(snapshot.last),
        bid: non_zero(snapshot.bid),
        ask: non_zero(snapshot.ask),
        high: non_zero(snapshot.high),
        low: non_zero(snapshot.low),
        open: non_zero(snapshot.open),
        close: non_zero(snapshot.close),
        change: non_zero(snapshot.change),
        percentage: non_zero(snapshot.percentage),
        volume: non_zero(snapshot.base_volume),
        quote_volume: non_zero(snapshot.quote_volume),
        timestamp: snapshot.timestamp.unwrap_or_else(now_millis),
    }
}

/// 캔들을 출력 형식으로 변환합니다.
pub fn format_candle(symbol: &str, timeframe: &str, candle: &Candle) -> CandleData {
    CandleData {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        timestamp: candle.timestamp,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
    }
}

// 업스트림은 0을 "값 없음"으로 씁니다.
fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 폴링 루프를 시작합니다.
///
/// 루프는 매니저에 대한 약한 참조만 가지므로 매니저가 사라지면 다음 틱에 종료합니다.
/// 취소는 틱 사이에서만 관찰되며, 진행 중인 틱은 끝까지 실행됩니다.
pub(crate) fn spawn_polling_loop(
    manager: Weak<ConnectionManager>,
    stream_key: StreamKey,
    stream_type: StreamType,
    period: Duration,
) -> PollingTask {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let span = relay_core::stream_span!("polling", stream_key, stream_type);

    let handle = tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Polling cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            debug!("Connection manager dropped, stopping polling");
                            break;
                        };
                        manager.poll_once(&stream_key).await;
                    }
                }
            }
        }
        .instrument(span),
    );

    PollingTask { token, handle }
}
