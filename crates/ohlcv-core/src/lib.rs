//! # OHLCV Core
//!
//! 캔들 수집 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 캔들, 자연 키, 시리즈 키
//! - 캔들 불변식 검사
//! - 타임프레임 및 심볼 정의
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
