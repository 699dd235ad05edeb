//! 수집 파이프라인의 에러 분류.
//!
//! 각 크레이트는 자체 에러 타입을 가지며, 모두 [`ErrorKind`]로 분류됩니다.
//! 오케스트레이터는 이 분류를 기준으로 재시도 여부와 페어별 결과를 결정합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 지원하지 않는 거래소/페어 등 설정 에러 (재시도하지 않음)
    Configuration,
    /// 캔들 불변식 위반
    Validation,
    /// 일시적인 네트워크/거래소 에러 (재시도 가능)
    Transient,
    /// 재시도 한도 소진 (해당 파이프라인만 종료)
    Exhausted,
    /// 저장소 에러
    Storage,
    /// 종료 요청에 의한 취소
    Cancelled,
    /// 파이프라인 태스크 패닉 등 내부 오류
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// 캔들 불변식 위반.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 고가가 저가보다 낮음
    #[error("고가({high})가 저가({low})보다 낮음")]
    HighBelowLow { high: Decimal, low: Decimal },

    /// 시가가 [저가, 고가] 범위를 벗어남
    #[error("시가({open})가 범위 [{low}, {high}]를 벗어남")]
    OpenOutOfRange {
        open: Decimal,
        low: Decimal,
        high: Decimal,
    },

    /// 종가가 [저가, 고가] 범위를 벗어남
    #[error("종가({close})가 범위 [{low}, {high}]를 벗어남")]
    CloseOutOfRange {
        close: Decimal,
        low: Decimal,
        high: Decimal,
    },

    /// 음수 거래량
    #[error("음수 거래량: {0}")]
    NegativeVolume(Decimal),

    /// 현재 시각 이후의 캔들
    #[error("미래 캔들: {candle_time} > {now}")]
    FutureCandle {
        candle_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// 설정 에러.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 설정 소스 로드/역직렬화 실패
    #[error("설정 로드 실패: {0}")]
    Load(#[from] config::ConfigError),

    /// 값 검증 실패
    #[error("잘못된 설정 값: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// 에러 분류 (항상 설정 에러).
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
