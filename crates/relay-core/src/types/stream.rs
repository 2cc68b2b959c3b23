//! 스트림 키와 스트림 타입 정의.
//!
//! 하나의 논리 구독은 `StreamKey`로 식별됩니다. 키 형식은 스트림 타입에 따라 다릅니다:
//!
//! - orderbook: `{symbol}`
//! - ticker: `{symbol}:ticker`
//! - candles: `{symbol}:{timeframe}`
//!
//! 심볼 자체에 `:`이 포함될 수 있으므로 candles 키는 항상 마지막 세그먼트를
//! 타임프레임으로 해석합니다.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, RelayResult};

/// ticker 스트림 키 접미사.
pub const TICKER_SUFFIX: &str = ":ticker";

/// 스트림 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// 호가창
    Orderbook,
    /// 시세
    Ticker,
    /// 캔들스틱
    Candles,
}

impl StreamType {
    /// 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Orderbook => "orderbook",
            StreamType::Ticker => "ticker",
            StreamType::Candles => "candles",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orderbook" => Ok(StreamType::Orderbook),
            "ticker" => Ok(StreamType::Ticker),
            "candles" => Ok(StreamType::Candles),
            _ => Err(RelayError::InvalidStream(format!("unknown stream type: {}", s))),
        }
    }
}

/// 논리 구독 식별자.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    /// 임의의 문자열로 키 생성.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// 호가창 스트림 키.
    pub fn orderbook(symbol: &str) -> Self {
        Self(symbol.to_string())
    }

    /// 시세 스트림 키.
    pub fn ticker(symbol: &str) -> Self {
        Self(format!("{}{}", symbol, TICKER_SUFFIX))
    }

    /// 캔들 스트림 키.
    pub fn candles(symbol: &str, timeframe: &str) -> Self {
        Self(format!("{}:{}", symbol, timeframe))
    }

    /// 스트림 타입과 파라미터로 키 생성.
    ///
    /// 타입이 다른 두 요청이 같은 키를 만들지 않도록 심볼의 마지막 `:` 세그먼트가
    /// `ticker`이거나 타임프레임 형태이면 거절합니다. candles 타입은 `{count}{unit}`
    /// 형식의 타임프레임이 필수입니다.
    pub fn for_stream(
        stream_type: StreamType,
        symbol: &str,
        timeframe: Option<&str>,
    ) -> RelayResult<Self> {
        validate_symbol(symbol)?;
        match stream_type {
            StreamType::Orderbook => Ok(Self::orderbook(symbol)),
            StreamType::Ticker => Ok(Self::ticker(symbol)),
            StreamType::Candles => match timeframe {
                Some(tf) if timeframe_millis(tf).is_some() => Ok(Self::candles(symbol, tf)),
                Some(tf) => Err(RelayError::InvalidStream(format!(
                    "unsupported timeframe '{}' for {}",
                    tf, symbol
                ))),
                None => Err(RelayError::InvalidStream(format!(
                    "candles stream for {} requires a timeframe",
                    symbol
                ))),
            },
        }
    }

    /// 키 문자열.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ticker 키에서 심볼을 복원합니다.
    pub fn ticker_symbol(&self) -> &str {
        self.0.strip_suffix(TICKER_SUFFIX).unwrap_or(&self.0)
    }

    /// candles 키에서 (심볼, 타임프레임)을 복원합니다.
    ///
    /// 마지막 `:` 이전 전체가 심볼입니다. 구분자가 없으면 `None`.
    pub fn candle_parts(&self) -> Option<(&str, &str)> {
        self.0.rsplit_once(':')
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for StreamKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StreamKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 타임프레임 문자열을 밀리초로 변환합니다 (예: "15m", "4h", "1d").
///
/// 형식은 양의 정수 + 단위(`s`, `m`, `h`, `d`, `w`)입니다. 범위를 넘으면 `None`.
pub fn timeframe_millis(timeframe: &str) -> Option<i64> {
    let (unit_at, _) = timeframe.char_indices().last()?;
    let (count, unit) = timeframe.split_at(unit_at);
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let count: i64 = count.parse().ok().filter(|n| *n > 0)?;
    let unit_ms: i64 = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return None,
    };
    count.checked_mul(unit_ms)
}

/// 스트림 키에 들어갈 심볼 검증.
fn validate_symbol(symbol: &str) -> RelayResult<()> {
    if symbol.is_empty() {
        return Err(RelayError::InvalidStream("symbol must not be empty".to_string()));
    }
    if let Some((_, suffix)) = symbol.rsplit_once(':') {
        if suffix == &TICKER_SUFFIX[1..] || timeframe_millis(suffix).is_some() {
            return Err(RelayError::InvalidStream(format!(
                "symbol {} ends with a reserved stream suffix",
                symbol
            )));
        }
    }
    Ok(())
}

/// 캐스케이드 정리에 쓰이는 그룹 키(base symbol)를 계산합니다.
///
/// - 타입을 모르면 `None`
/// - candles: 마지막 세그먼트를 제외한 나머지를 `:`로 다시 이은 값 (세그먼트가 2개 미만이면 `None`)
/// - orderbook / ticker: 키 그대로
pub fn derive_base_symbol(stream_key: &str, stream_type: Option<StreamType>) -> Option<String> {
    match stream_type? {
        StreamType::Candles => {
            let segments: Vec<&str> = stream_key.split(':').collect();
            if segments.len() >= 2 {
                Some(segments[..segments.len() - 1].join(":"))
            } else {
                None
            }
        }
        StreamType::Orderbook | StreamType::Ticker => Some(stream_key.to_string()),
    }
}
