//! 시장 데이터 소스 추상화.
//!
//! 릴레이는 업스트림 조회 방법을 알지 못합니다. 거래소 REST 클라이언트든
//! 시뮬레이터든 이 trait만 구현하면 폴링 태스크에 연결할 수 있습니다.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{Candle, OrderBookSnapshot, TickerSnapshot};

/// 시장 데이터 소스 trait.
///
/// 모든 호출은 실패할 수 있으며, 지연 시간의 상한은 구현체가 책임집니다.
/// 릴레이는 호출별 타임아웃을 두지 않습니다.
///
/// # 구현 예시
///
/// ```ignore
/// pub struct BinanceSource {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl MarketDataSource for BinanceSource {
///     async fn fetch_order_book(&self, symbol: &str, limit: usize) -> Result<OrderBookSnapshot, SourceError> {
///         // GET /api/v3/depth 호출 및 변환
///     }
///
///     // ... 나머지 메서드 구현
/// }
/// ```
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 소스 이름 (로그/헬스 체크용).
    fn name(&self) -> &str;

    /// 호가창 조회.
    ///
    /// `limit`은 요청 깊이이며, 구현체는 그보다 많은 단계를 반환할 수 있습니다.
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<OrderBookSnapshot, SourceError>;

    /// 시세 조회.
    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerSnapshot, SourceError>;

    /// 캔들 조회 (시간 오름차순, 최대 `count`개).
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>, SourceError>;
}
