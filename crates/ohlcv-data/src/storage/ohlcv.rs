//! PostgreSQL 캔들 저장소.
//!
//! 자연 키 `(symbol, timeframe, candle_time)`가 기본 키인 `ohlcv` 테이블에
//! UNNEST 일괄 삽입으로 씁니다. 한 번의 호출은 하나의 트랜잭션이므로 배치는
//! 전부 반영되거나 전혀 반영되지 않으며, 커밋 후에 반환합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use ohlcv_data::{CandleStore, PgCandleStore};
//!
//! let store = PgCandleStore::connect(&config.database).await?;
//! store.migrate().await?;
//! store.save_historical(&candles).await?;
//! ```

use super::{ensure_valid, CandleStore, WriteMode};
use crate::error::{DataError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{dedup_by_key, Candle, DatabaseSettings, Timeframe};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 한 번의 INSERT에 담는 최대 행 수.
const CHUNK_SIZE: usize = 500;

const INSERT_SKIP_EXISTING: &str = r#"
    INSERT INTO ohlcv (symbol, timeframe, candle_time, open, high, low, close, volume)
    SELECT * FROM UNNEST(
        $1::text[], $2::text[], $3::timestamptz[],
        $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[], $8::numeric[]
    )
    ON CONFLICT (symbol, timeframe, candle_time) DO NOTHING
"#;

const INSERT_OVERWRITE: &str = r#"
    INSERT INTO ohlcv (symbol, timeframe, candle_time, open, high, low, close, volume)
    SELECT * FROM UNNEST(
        $1::text[], $2::text[], $3::timestamptz[],
        $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[], $8::numeric[]
    )
    ON CONFLICT (symbol, timeframe, candle_time) DO UPDATE SET
        open = EXCLUDED.open,
        high = EXCLUDED.high,
        low = EXCLUDED.low,
        close = EXCLUDED.close,
        volume = EXCLUDED.volume,
        updated_at = NOW()
"#;

/// OHLCV 캔들 데이터베이스 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct OhlcvRecord {
    pub symbol: String,
    pub timeframe: String,
    pub candle_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl OhlcvRecord {
    /// Candle 도메인 객체로 변환.
    pub fn into_candle(self) -> Result<Candle> {
        let timeframe: Timeframe = self
            .timeframe
            .parse()
            .map_err(|e: String| DataError::InvalidData(e))?;

        Ok(Candle::new(
            self.symbol,
            timeframe,
            self.candle_time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// PostgreSQL 기반 캔들 저장소.
#[derive(Clone)]
pub struct PgCandleStore {
    pool: PgPool,
}

impl PgCandleStore {
    /// 연결 풀을 생성합니다.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(DataError::ConfigError(
                "database.url 또는 DATABASE_URL이 설정되지 않았습니다".to_string(),
            ));
        }

        info!(max_connections = settings.max_connections, "데이터베이스 연결 중");

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(|e| match DataError::from(e) {
                DataError::QueryError(msg) => DataError::ConnectionError(msg),
                other => other,
            })?;

        info!("데이터베이스 연결 완료");
        Ok(Self { pool })
    }

    /// 내부 연결 풀.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 번들된 스키마를 적용합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("데이터베이스 마이그레이션 실행");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("마이그레이션 완료");
        Ok(())
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 시리즈 하나의 행 수 (진단용).
    pub async fn count_series(&self, symbol: &str, timeframe: Timeframe) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ohlcv WHERE symbol = $1 AND timeframe = $2")
                .bind(symbol)
                .bind(timeframe.as_interval())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl CandleStore for PgCandleStore {
    #[instrument(skip(self, batch), fields(count = batch.len(), ?mode))]
    async fn save_candles(&self, batch: &[Candle], mode: WriteMode) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        ensure_valid(batch, Utc::now())?;

        // 한 INSERT 안에서 같은 행을 두 번 건드리면 ON CONFLICT DO UPDATE가 실패함
        let rows = dedup_by_key(batch);
        let sql = match mode {
            WriteMode::SkipExisting => INSERT_SKIP_EXISTING,
            WriteMode::Overwrite => INSERT_OVERWRITE,
        };

        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for chunk in rows.chunks(CHUNK_SIZE) {
            let symbols: Vec<&str> = chunk.iter().map(|c| c.symbol.as_str()).collect();
            let timeframes: Vec<&str> = chunk.iter().map(|c| c.timeframe.as_interval()).collect();
            let times: Vec<DateTime<Utc>> = chunk.iter().map(|c| c.candle_time).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|c| c.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|c| c.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|c| c.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|c| c.close).collect();
            let volumes: Vec<Decimal> = chunk.iter().map(|c| c.volume).collect();

            let result = sqlx::query(sql)
                .bind(&symbols)
                .bind(&timeframes)
                .bind(&times)
                .bind(&opens)
                .bind(&highs)
                .bind(&lows)
                .bind(&closes)
                .bind(&volumes)
                .execute(&mut *tx)
                .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;

        debug!(deduped = rows.len(), written, "캔들 저장");
        Ok(written)
    }

    #[instrument(skip(self))]
    async fn load_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let records: Vec<OhlcvRecord> = sqlx::query_as(
            r#"
            SELECT symbol, timeframe, candle_time, open, high, low, close, volume
            FROM ohlcv
            WHERE symbol = $1 AND timeframe = $2 AND candle_time >= $3 AND candle_time < $4
            ORDER BY candle_time ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_interval())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(OhlcvRecord::into_candle).collect()
    }

    async fn latest_candles(&self, since: DateTime<Utc>) -> Result<Vec<Candle>> {
        let records: Vec<OhlcvRecord> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (symbol, timeframe)
                symbol, timeframe, candle_time, open, high, low, close, volume
            FROM ohlcv
            WHERE candle_time >= $1
            ORDER BY symbol, timeframe, candle_time DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(OhlcvRecord::into_candle).collect()
    }
}
