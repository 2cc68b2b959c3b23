//! 모의 시장 데이터 소스.
//!
//! 실제 거래소 연결 없이 릴레이를 실행할 수 있도록 랜덤 워크 시세를 생성합니다.
//! 조회할 때마다 해당 심볼의 가격이 한 걸음 움직이며, 처음 보는 심볼은 동적으로
//! 가격을 만들어 냅니다.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use relay_core::{
    timeframe_millis, Candle, MarketDataSource, OrderBookSnapshot, SimulatorConfig, SourceError,
    TickerSnapshot,
};
use tracing::{debug, info};

/// 호가 단계 간격 (가격 대비 비율).
const LEVEL_STEP: f64 = 0.0001;

/// 심볼별 가격 정보.
#[derive(Debug, Clone)]
struct SymbolPrice {
    base_price: f64,
    current_price: f64,
    high_24h: f64,
    low_24h: f64,
    volume_24h: f64,
}

impl SymbolPrice {
    fn new(base_price: f64) -> Self {
        Self {
            base_price,
            current_price: base_price,
            high_24h: base_price * 1.02,
            low_24h: base_price * 0.98,
            volume_24h: 1_000_000.0 / base_price.max(1.0),
        }
    }

    /// 랜덤 가격 변동 (±volatility%).
    fn step(&mut self, rng: &mut impl Rng, volatility_pct: f64) {
        let bound = volatility_pct / 100.0;
        if bound > 0.0 {
            self.current_price *= 1.0 + rng.gen_range(-bound..bound);
        }
        self.high_24h = self.high_24h.max(self.current_price);
        self.low_24h = self.low_24h.min(self.current_price);
        self.volume_24h *= 1.0 + rng.gen_range(0.0..0.001);
    }
}

/// 랜덤 워크 기반 시장 데이터 소스.
pub struct SimulatedMarketSource {
    prices: Mutex<HashMap<String, SymbolPrice>>,
    volatility_pct: f64,
}

impl SimulatedMarketSource {
    /// 설정의 시드 심볼로 시뮬레이터 생성.
    pub fn new(config: &SimulatorConfig) -> Self {
        let prices = config
            .seed_symbols
            .iter()
            .map(|seed| (seed.symbol.clone(), SymbolPrice::new(seed.price)))
            .collect();

        Self {
            prices: Mutex::new(prices),
            volatility_pct: config.volatility_pct,
        }
    }

    /// 심볼 가격을 한 걸음 움직이고 결과를 반환합니다.
    fn advance(&self, symbol: &str) -> Result<SymbolPrice, SourceError> {
        let mut prices = self
            .prices
            .lock()
            .map_err(|_| SourceError::Unavailable("simulator state poisoned".to_string()))?;

        let price = prices.entry(symbol.to_string()).or_insert_with(|| {
            let base_price = default_price(symbol);
            info!(symbol = %symbol, base_price, "Created dynamic price for new symbol");
            SymbolPrice::new(base_price)
        });

        price.step(&mut rand::thread_rng(), self.volatility_pct);
        debug!(symbol = %symbol, price = price.current_price, "Price updated");
        Ok(price.clone())
    }
}

/// 심볼 패턴에 따른 기본 가격.
fn default_price(symbol: &str) -> f64 {
    let upper = symbol.to_uppercase();
    if upper.starts_with("BTC") {
        100_000.0
    } else if upper.starts_with("ETH") {
        3_000.0
    } else if upper.contains("USD") {
        100.0
    } else {
        50.0
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketSource {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<OrderBookSnapshot, SourceError> {
        let price = self.advance(symbol)?;
        let mut rng = rand::thread_rng();
        let mid = price.current_price;

        let mut level = |side: f64, depth: usize| {
            let offset = LEVEL_STEP * (depth + 1) as f64;
            [mid * (1.0 + side * offset), rng.gen_range(0.01..5.0)]
        };
        let bids = (0..limit).map(|i| level(-1.0, i)).collect();
        let asks = (0..limit).map(|i| level(1.0, i)).collect();

        Ok(OrderBookSnapshot {
            bids,
            asks,
            timestamp: Some(Utc::now().timestamp_millis()),
        })
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerSnapshot, SourceError> {
        let price = self.advance(symbol)?;
        let last = price.current_price;
        let change = last - price.base_price;

        Ok(TickerSnapshot {
            last: Some(last),
            bid: Some(last * (1.0 - LEVEL_STEP)),
            ask: Some(last * (1.0 + LEVEL_STEP)),
            high: Some(price.high_24h),
            low: Some(price.low_24h),
            open: Some(price.base_price),
            close: Some(last),
            change: Some(change),
            percentage: Some(change / price.base_price * 100.0),
            base_volume: Some(price.volume_24h),
            quote_volume: Some(price.volume_24h * last),
            timestamp: Some(Utc::now().timestamp_millis()),
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let period = timeframe_millis(timeframe)
            .ok_or_else(|| SourceError::Parse(format!("unsupported timeframe: {}", timeframe)))?;
        let price = self.advance(symbol)?;
        let mut rng = rand::thread_rng();

        let now = Utc::now().timestamp_millis();
        let current_bucket = now - now % period;
        let bound = (self.volatility_pct / 100.0).max(f64::EPSILON);

        // 가장 최근 캔들부터 거꾸로 생성합니다.
        let mut close = price.current_price;
        let mut candles: Vec<Candle> = (0..count)
            .map(|i| {
                let open = close * (1.0 + rng.gen_range(-bound..bound));
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..bound));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..bound));
                let candle = Candle {
                    timestamp: current_bucket.saturating_sub((i as i64).saturating_mul(period)),
                    open,
                    high,
                    low,
                    close,
                    volume: price.volume_24h * rng.gen_range(0.001..0.01),
                };
                close = open;
                candle
            })
            .collect();
        candles.reverse();

        Ok(candles)
    }
}
