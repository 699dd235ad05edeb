//! OHLCV 캔들 도메인 타입.
//!
//! 이 모듈은 수집 파이프라인의 원자 단위를 정의합니다:
//! - `Candle` - 하나의 (심볼, 타임프레임, 시각)에 대한 OHLCV 레코드
//! - `CandleKey` - 자연 키 `(symbol, timeframe, candle_time)`
//! - `SeriesKey` - 하나의 파이프라인이 담당하는 (심볼, 타임프레임) 쌍
//!
//! 저장 전에 모든 캔들은 [`Candle::validate`]를 통과해야 합니다.

use crate::error::ValidationError;
use crate::types::{Price, Quantity, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// (심볼, 타임프레임) 쌍. 파이프라인 하나가 이 키 하나를 소유합니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// 표준 심볼 문자열 (예: "BTC/USDT")
    pub symbol: String,
    /// 타임프레임
    pub timeframe: Timeframe,
}

impl SeriesKey {
    /// 새 시리즈 키를 생성합니다.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    /// 심볼 × 타임프레임의 모든 조합을 만듭니다 (심볼 우선 순서).
    pub fn cartesian(symbols: &[String], timeframes: &[Timeframe]) -> Vec<SeriesKey> {
        symbols
            .iter()
            .flat_map(|symbol| {
                timeframes
                    .iter()
                    .map(move |tf| SeriesKey::new(symbol.clone(), *tf))
            })
            .collect()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.timeframe)
    }
}

/// 캔들의 자연 키. 저장소에서 유일해야 합니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_time: DateTime<Utc>,
}

/// OHLCV 캔들스틱 데이터.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 표준 심볼 문자열 (예: "BTC/USDT")
    pub symbol: String,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 캔들 시작 시간
    pub candle_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량 (기준 자산 단위)
    pub volume: Quantity,
}

impl Candle {
    /// 새 캔들을 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candle_time: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candle_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 자연 키를 반환합니다.
    pub fn key(&self) -> CandleKey {
        CandleKey {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candle_time: self.candle_time,
        }
    }

    /// 이 캔들이 속한 시리즈 키를 반환합니다.
    pub fn series(&self) -> SeriesKey {
        SeriesKey::new(self.symbol.clone(), self.timeframe)
    }

    /// 캔들 불변식을 검사합니다.
    ///
    /// `low ≤ open ≤ high`, `low ≤ close ≤ high`, `volume ≥ 0`,
    /// `candle_time ≤ now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.high < self.low {
            return Err(ValidationError::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.open < self.low || self.open > self.high {
            return Err(ValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(ValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        if self.volume < Decimal::ZERO {
            return Err(ValidationError::NegativeVolume(self.volume));
        }
        if self.candle_time > now {
            return Err(ValidationError::FutureCandle {
                candle_time: self.candle_time,
                now,
            });
        }
        Ok(())
    }
}

/// 유효성 검사에서 탈락한 캔들과 사유.
pub type Rejected = (Candle, ValidationError);

/// 배치를 유효한 캔들과 탈락한 캔들로 나눕니다 (캔들 단위 검사).
pub fn partition_valid(batch: Vec<Candle>, now: DateTime<Utc>) -> (Vec<Candle>, Vec<Rejected>) {
    let mut valid = Vec::with_capacity(batch.len());
    let mut rejected = Vec::new();

    for candle in batch {
        match candle.validate(now) {
            Ok(()) => valid.push(candle),
            Err(e) => rejected.push((candle, e)),
        }
    }

    (valid, rejected)
}

/// 배치 안에서 같은 자연 키가 반복되면 마지막 전달만 남깁니다.
///
/// 결과는 자연 키 순서(시리즈별 시간 오름차순)입니다.
pub fn dedup_by_key(batch: &[Candle]) -> Vec<Candle> {
    let mut latest: BTreeMap<CandleKey, &Candle> = BTreeMap::new();
    for candle in batch {
        latest.insert(candle.key(), candle);
    }
    latest.into_values().cloned().collect()
}
