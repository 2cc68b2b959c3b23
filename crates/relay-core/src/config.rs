//! 설정 관리.
//!
//! 기본값 → 설정 파일(선택) → `RELAY_` 접두사 환경 변수 순서로 덮어씁니다.
//!
//! ```text
//! RELAY_SERVER__PORT=4000
//! RELAY_STREAMS__MAX_CONNECTIONS_PER_STREAM=100
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::RelayError;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 스트림 수명주기 설정
    pub streams: StreamSettings,
    /// 시뮬레이터 설정
    pub simulator: SimulatorConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` 문자열.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 스트림 수명주기 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSettings {
    /// 스트림 키당 최대 구독자 수
    pub max_connections_per_stream: usize,
    /// 호가창 폴링 주기 (밀리초)
    pub orderbook_interval_ms: u64,
    /// 시세 폴링 주기 (밀리초)
    pub ticker_interval_ms: u64,
    /// 캔들 폴링 주기 (밀리초)
    pub candles_interval_ms: u64,
    /// 호가창 기본 깊이
    pub default_orderbook_limit: usize,
    /// 호가창 최소 깊이
    pub min_orderbook_limit: usize,
    /// 호가창 최대 깊이
    pub max_orderbook_limit: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_connections_per_stream: 5000,
            orderbook_interval_ms: 1000,
            ticker_interval_ms: 1500,
            candles_interval_ms: 2000,
            default_orderbook_limit: 20,
            min_orderbook_limit: 5,
            max_orderbook_limit: 5000,
        }
    }
}

impl StreamSettings {
    /// 호가창 폴링 주기.
    pub fn orderbook_interval(&self) -> Duration {
        Duration::from_millis(self.orderbook_interval_ms)
    }

    /// 시세 폴링 주기.
    pub fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.ticker_interval_ms)
    }

    /// 캔들 폴링 주기.
    pub fn candles_interval(&self) -> Duration {
        Duration::from_millis(self.candles_interval_ms)
    }

    /// 요청된 깊이를 허용 범위로 고정합니다. 값이 없으면 기본 깊이.
    pub fn clamp_orderbook_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_orderbook_limit)
            .clamp(self.min_orderbook_limit, self.max_orderbook_limit)
    }

    /// 설정 값 검증.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.orderbook_interval_ms == 0
            || self.ticker_interval_ms == 0
            || self.candles_interval_ms == 0
        {
            return Err(RelayError::Config(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        if self.min_orderbook_limit > self.max_orderbook_limit {
            return Err(RelayError::Config(format!(
                "min_orderbook_limit ({}) exceeds max_orderbook_limit ({})",
                self.min_orderbook_limit, self.max_orderbook_limit
            )));
        }
        Ok(())
    }
}

/// 초기 가격이 지정된 시뮬레이션 심볼.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SeedSymbol {
    /// 심볼 (예: "BTC/USDT")
    pub symbol: String,
    /// 초기 가격
    pub price: f64,
}

/// 시뮬레이터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// 초기 가격이 지정된 심볼 목록
    pub seed_symbols: Vec<SeedSymbol>,
    /// 틱당 최대 가격 변동 (%)
    pub volatility_pct: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let seed_symbols = [
            ("BTC/USDT", 105_000.0),
            ("ETH/USDT", 3_350.0),
            ("SOL/USDT", 185.0),
        ]
        .into_iter()
        .map(|(symbol, price)| SeedSymbol {
            symbol: symbol.to_string(),
            price,
        })
        .collect();

        Self {
            seed_symbols,
            volatility_pct: 0.5,
        }
    }
}

impl RelayConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: RelayConfig = builder.build()?.try_deserialize()?;
        config.streams.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, RelayError> {
        Self::load("config/default.toml")
    }
}
