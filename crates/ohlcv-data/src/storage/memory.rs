//! 메모리 캔들 저장소.
//!
//! PostgreSQL 저장소와 같은 계약을 `BTreeMap<CandleKey, Candle>` 위에 구현합니다.
//! 테스트와 드라이런에서 사용합니다.

use super::{ensure_valid, CandleStore, WriteMode};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{dedup_by_key, Candle, CandleKey, SeriesKey, Timeframe};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// 프로세스 메모리에만 존재하는 캔들 저장소.
#[derive(Debug, Default)]
pub struct MemoryCandleStore {
    rows: RwLock<BTreeMap<CandleKey, Candle>>,
}

impl MemoryCandleStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<CandleKey, Candle>> {
        self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<CandleKey, Candle>> {
        self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 저장된 행 수.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 자연 키로 한 행을 조회합니다.
    pub fn get(&self, key: &CandleKey) -> Option<Candle> {
        self.read().get(key).cloned()
    }

    /// 시리즈 하나의 전체 캔들 (시간 오름차순).
    pub fn series(&self, key: &SeriesKey) -> Vec<Candle> {
        self.read()
            .values()
            .filter(|c| c.symbol == key.symbol && c.timeframe == key.timeframe)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn save_candles(&self, batch: &[Candle], mode: WriteMode) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        ensure_valid(batch, Utc::now())?;
        let deduped = dedup_by_key(batch);

        let mut rows = self.write();
        let mut written = 0;
        for candle in &deduped {
            let key = candle.key();
            match mode {
                WriteMode::SkipExisting => {
                    if !rows.contains_key(&key) {
                        rows.insert(key, candle.clone());
                        written += 1;
                    }
                }
                WriteMode::Overwrite => {
                    rows.insert(key, candle.clone());
                    written += 1;
                }
            }
        }

        debug!(count = batch.len(), written, ?mode, "메모리 저장소 쓰기");
        Ok(written)
    }

    async fn load_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let from = CandleKey {
            symbol: symbol.to_string(),
            timeframe,
            candle_time: start,
        };
        let to = CandleKey {
            symbol: symbol.to_string(),
            timeframe,
            candle_time: end,
        };

        Ok(self.read().range(from..to).map(|(_, c)| c.clone()).collect())
    }

    async fn latest_candles(&self, since: DateTime<Utc>) -> Result<Vec<Candle>> {
        let rows = self.read();
        let mut latest: BTreeMap<SeriesKey, &Candle> = BTreeMap::new();
        // 키 순서상 같은 시리즈의 마지막 값이 최신
        for candle in rows.values() {
            latest.insert(candle.series(), candle);
        }

        Ok(latest
            .into_values()
            .filter(|c| c.candle_time >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn candle(symbol: &str, hour: i64, close: Decimal) -> Candle {
        Candle::new(
            symbol,
            Timeframe::H1,
            at(hour),
            dec!(100),
            dec!(200),
            dec!(50),
            close,
            dec!(3),
        )
    }

    #[tokio::test]
    async fn test_bulk_write_is_idempotent() {
        let store = MemoryCandleStore::new();
        let batch: Vec<Candle> = (0..5).map(|h| candle("BTC/USDT", h, dec!(150))).collect();

        assert_eq!(store.save_historical(&batch).await.unwrap(), 5);
        assert_eq!(store.save_historical(&batch).await.unwrap(), 0);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_bulk_write_keeps_existing_values() {
        let store = MemoryCandleStore::new();
        store
            .save_historical(&[candle("BTC/USDT", 0, dec!(150))])
            .await
            .unwrap();
        store
            .save_historical(&[candle("BTC/USDT", 0, dec!(160))])
            .await
            .unwrap();

        let stored = store.get(&candle("BTC/USDT", 0, dec!(0)).key()).unwrap();
        assert_eq!(stored.close, dec!(150));
    }

    #[tokio::test]
    async fn test_realtime_write_is_last_write_wins() {
        let store = MemoryCandleStore::new();
        let first: Vec<Candle> = (0..3).map(|h| candle("ETH/USDT", h, dec!(120))).collect();
        let revised: Vec<Candle> = (0..3).map(|h| candle("ETH/USDT", h, dec!(180))).collect();

        store.save_realtime(&first).await.unwrap();
        store.save_realtime(&revised).await.unwrap();

        let series = store.series(&SeriesKey::new("ETH/USDT", Timeframe::H1));
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|c| c.close == dec!(180)));
    }

    #[tokio::test]
    async fn test_invalid_candle_rejects_batch_before_write() {
        let store = MemoryCandleStore::new();
        let mut bad = candle("BTC/USDT", 1, dec!(100));
        bad.high = dec!(40);

        let err = store
            .save_realtime(&[candle("BTC/USDT", 0, dec!(100)), bad])
            .await
            .unwrap_err();

        assert!(matches!(err, DataError::Validation { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_range_is_half_open_and_ordered() {
        let store = MemoryCandleStore::new();
        let batch: Vec<Candle> = (0..10).rev().map(|h| candle("BTC/USDT", h, dec!(100))).collect();
        store.save_historical(&batch).await.unwrap();
        store
            .save_historical(&[candle("ETH/USDT", 3, dec!(100))])
            .await
            .unwrap();

        let range = store
            .load_range("BTC/USDT", Timeframe::H1, at(2), at(5))
            .await
            .unwrap();
        let hours: Vec<DateTime<Utc>> = range.iter().map(|c| c.candle_time).collect();
        assert_eq!(hours, vec![at(2), at(3), at(4)]);

        let empty = store
            .load_range("BTC/USDT", Timeframe::M15, at(0), at(10))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_latest_candles_per_series() {
        let store = MemoryCandleStore::new();
        let btc: Vec<Candle> = (0..4).map(|h| candle("BTC/USDT", h, dec!(100))).collect();
        store.save_historical(&btc).await.unwrap();
        store
            .save_historical(&[candle("ETH/USDT", 1, dec!(100))])
            .await
            .unwrap();

        let latest = store.latest_candles(at(2)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].symbol, "BTC/USDT");
        assert_eq!(latest[0].candle_time, at(3));

        assert_eq!(store.latest_candles(at(0)).await.unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_bulk_write_twice_equals_once(hours in proptest::collection::vec(0i64..500, 1..60)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let batch: Vec<Candle> = hours.iter().map(|h| candle("BTC/USDT", *h, dec!(150))).collect();

                let once = MemoryCandleStore::new();
                once.save_historical(&batch).await.unwrap();

                let twice = MemoryCandleStore::new();
                twice.save_historical(&batch).await.unwrap();
                twice.save_historical(&batch).await.unwrap();

                let key = SeriesKey::new("BTC/USDT", Timeframe::H1);
                assert_eq!(once.series(&key), twice.series(&key));
            });
        }
    }
}
