//! 로깅 초기화와 스트림 span 매크로.
//!
//! `RUST_LOG`가 있으면 설정 파일의 레벨보다 우선하고, `LOG_FORMAT`은 출력 형식을
//! 덮어씁니다. 출력 형식은 pretty, json, compact 중 하나입니다.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// 로그 수집기용
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unsupported log format '{}'", other)),
        }
    }
}

/// 구독자 초기화 옵션.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` 지시문 (예: "relay_api=debug,tower_http=info")
    pub filter: String,
    pub format: LogFormat,
    /// 폴링 span의 생성/종료 이벤트 출력
    pub trace_stream_spans: bool,
}

impl LogConfig {
    pub fn new(filter: impl Into<String>, format: LogFormat) -> Self {
        Self {
            filter: filter.into(),
            format,
            trace_stream_spans: false,
        }
    }

    /// `LOG_FORMAT`, `LOG_STREAM_SPANS` 환경 변수를 반영합니다.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(format) = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|value| value.parse().ok())
        {
            self.format = format;
        }
        if std::env::var("LOG_STREAM_SPANS").is_ok_and(|value| value == "1" || value == "true") {
            self.trace_stream_spans = true;
        }
        self
    }
}

impl From<&LoggingConfig> for LogConfig {
    /// 알 수 없는 형식 문자열은 pretty로 처리합니다.
    fn from(config: &LoggingConfig) -> Self {
        Self::new(
            config.level.clone(),
            config.format.parse().unwrap_or_default(),
        )
    }
}

/// 전역 tracing 구독자를 설치합니다. 프로세스당 한 번만 호출할 수 있습니다.
///
/// ```no_run
/// use relay_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig::new("relay_api=debug", LogFormat::Json)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    let span_events = if config.trace_stream_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer().with_target(true).with_span_events(span_events);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;

    tracing::info!(filter = %config.filter, format = ?config.format, "Logging initialized");
    Ok(())
}

/// 스트림 키(와 타입)를 필드로 갖는 info span.
#[macro_export]
macro_rules! stream_span {
    ($name:expr, $stream_key:expr) => {
        tracing::info_span!($name, stream_key = %$stream_key)
    };
    ($name:expr, $stream_key:expr, $stream_type:expr) => {
        tracing::info_span!($name, stream_key = %$stream_key, stream_type = %$stream_type)
    };
}
