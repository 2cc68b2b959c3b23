//! 시장 데이터 원본 스냅샷.
//!
//! `MarketDataSource`가 반환하는 값으로, 업스트림 거래소 응답 형태를 그대로 유지합니다.
//! 클라이언트로 나가는 메시지 형식으로의 변환은 폴링 계층이 담당합니다.

use serde::{Deserialize, Serialize};

/// 호가 한 단계 `[price, amount]`.
pub type RawLevel = [f64; 2];

/// 호가창 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// 매수 호가 (가격 내림차순)
    pub bids: Vec<RawLevel>,
    /// 매도 호가 (가격 오름차순)
    pub asks: Vec<RawLevel>,
    /// 거래소 타임스탬프 (ms)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// 시세 스냅샷.
///
/// 모든 필드는 선택적입니다. 거래소가 값을 주지 않으면 `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub change: Option<f64>,
    pub percentage: Option<f64>,
    /// 기준 자산 거래량
    pub base_volume: Option<f64>,
    /// 견적 자산 거래량
    pub quote_volume: Option<f64>,
    /// 거래소 타임스탬프 (ms)
    pub timestamp: Option<i64>,
}

/// OHLCV 캔들.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시각 (ms)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_snapshot_upstream_field_names() {
        let json = r#"{"last": 100.5, "baseVolume": 12.0, "quoteVolume": 1206.0}"#;
        let ticker: TickerSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(ticker.last, Some(100.5));
        assert_eq!(ticker.base_volume, Some(12.0));
        assert_eq!(ticker.quote_volume, Some(1206.0));
        assert!(ticker.bid.is_none());
        assert!(ticker.timestamp.is_none());
    }

    #[test]
    fn test_order_book_snapshot_levels() {
        let json = r#"{"bids": [[100, 1], [99, 2]], "asks": [[101, 1]]}"#;
        let book: OrderBookSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(book.bids, vec![[100.0, 1.0], [99.0, 2.0]]);
        assert_eq!(book.asks.len(), 1);
        assert!(book.timestamp.is_none());
    }
}
