//! 캔들 저장소.
//!
//! 하나의 쓰기 원시 연산([`CandleStore::save_candles`])과 충돌 정책([`WriteMode`])으로
//! 두 가지 쓰기 경로를 표현합니다:
//!
//! | 경로 | 정책 | 같은 키가 이미 있으면 |
//! |------|------|----------------------|
//! | `save_historical` | `SkipExisting` | 아무것도 하지 않음 |
//! | `save_realtime` | `Overwrite` | OHLCV 필드를 덮어씀 |
//!
//! 두 구현 모두 쓰기 전에 배치 전체를 검사하며, 불변식을 어긴 캔들이 하나라도 있으면
//! 아무것도 쓰지 않고 `DataError::Validation`을 반환합니다.

pub mod memory;
pub mod ohlcv;

use crate::error::{DataError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, Timeframe};

/// 자연 키 충돌 시 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// 이미 있는 키는 건너뜀 (과거 데이터: 마감된 캔들은 불변)
    SkipExisting,
    /// 이미 있는 키는 덮어씀 (실시간 데이터: 진행 중인 캔들은 갱신될 수 있음)
    Overwrite,
}

/// 캔들 저장소.
///
/// 여러 파이프라인이 동시에 쓰므로 구현은 `Send + Sync`이어야 하며, 키 단위 원자성은
/// 저장소 자체가 보장합니다. 쓰기가 성공적으로 반환되면 읽기 경로에서 바로 보입니다.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// 배치를 저장하고 새로 쓰이거나 갱신된 행 수를 반환합니다.
    async fn save_candles(&self, batch: &[Candle], mode: WriteMode) -> Result<usize>;

    /// 과거 데이터 일괄 저장.
    async fn save_historical(&self, batch: &[Candle]) -> Result<usize> {
        self.save_candles(batch, WriteMode::SkipExisting).await
    }

    /// 실시간 데이터 저장.
    async fn save_realtime(&self, batch: &[Candle]) -> Result<usize> {
        self.save_candles(batch, WriteMode::Overwrite).await
    }

    /// `[start, end)` 구간의 캔들을 시간 오름차순으로 조회합니다.
    async fn load_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// 최신 캔들이 `since` 이후인 시리즈마다 최신 캔들 하나씩 조회합니다.
    async fn latest_candles(&self, since: DateTime<Utc>) -> Result<Vec<Candle>>;
}

/// 배치 전체의 불변식을 검사합니다.
pub fn ensure_valid(batch: &[Candle], now: DateTime<Utc>) -> Result<()> {
    for candle in batch {
        if let Err(source) = candle.validate(now) {
            return Err(DataError::Validation {
                key: format!("{} @ {}", candle.series(), candle.candle_time),
                source,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_valid_rejects_whole_batch() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let good = Candle::new(
            "BTC/USDT",
            Timeframe::H1,
            time,
            dec!(100),
            dec!(110),
            dec!(90),
            dec!(105),
            dec!(1),
        );
        let mut bad = good.clone();
        bad.high = dec!(80);

        assert!(ensure_valid(std::slice::from_ref(&good), Utc::now()).is_ok());

        let err = ensure_valid(&[good, bad], Utc::now()).unwrap_err();
        assert!(matches!(err, DataError::Validation { .. }));
        assert!(err.to_string().contains("BTC/USDT 1h"));
    }
}
