//! # Relay Core
//!
//! 시장 데이터 릴레이의 핵심 타입을 제공합니다.
//!
//! - 스트림 키와 스트림 타입, base symbol 계산
//! - 업스트림 시장 데이터 스냅샷 타입
//! - 시장 데이터 소스 trait
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod source;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use source::*;
pub use types::*;
