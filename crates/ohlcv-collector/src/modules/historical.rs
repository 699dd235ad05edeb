//! 과거 데이터 백필 파이프라인.
//!
//! `[now - lookback, now)` 구간을 끝까지 조회한 뒤 마감된 유효 캔들만 일괄 저장합니다.
//! 일괄 저장은 기존 행을 덮어쓰지 않으므로 진행 중인 캔들은 실시간 경로에 맡깁니다.
//! 데이터가 없으면 잠시 대기한 뒤 완료로 처리하며 다시 조회하지 않습니다.

use super::{drop_invalid, persist_with_retry, PipelineContext};
use crate::stats::PairOutcome;
use crate::CollectorError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ohlcv_core::{Candle, ErrorKind, SeriesKey};
use ohlcv_data::WriteMode;
use ohlcv_exchange::{sleep_or_cancel, HistoricalFetcher};
use std::sync::Arc;
use tracing::{debug, error, info};

/// `end` 시점까지 기간이 끝나지 않은 캔들을 제외합니다.
fn drop_unclosed(candles: Vec<Candle>, end: DateTime<Utc>) -> (Vec<Candle>, usize) {
    let total = candles.len();
    let closed: Vec<Candle> = candles
        .into_iter()
        .filter(|c| {
            c.candle_time
                .checked_add_signed(ChronoDuration::milliseconds(c.timeframe.as_millis()))
                .is_some_and(|close_time| close_time <= end)
        })
        .collect();
    let open = total - closed.len();
    (closed, open)
}

/// 한 페어의 과거 데이터를 수집하고 저장합니다.
pub async fn run_historical_pipeline(ctx: PipelineContext, key: SeriesKey) -> PairOutcome {
    let end = Utc::now();
    let Some(start) = end.checked_sub_signed(ctx.settings.lookback) else {
        error!(lookback = %ctx.settings.lookback, "조회 기간이 표현 범위를 벗어남");
        return PairOutcome::Failed {
            kind: ErrorKind::Configuration,
            error: format!("조회 기간 범위 초과: {}", ctx.settings.lookback),
        };
    };
    info!(%start, %end, "과거 데이터 수집 시작");

    let fetcher = HistoricalFetcher::new(
        Arc::clone(&ctx.exchange),
        ctx.settings.retry,
        ctx.cancel.clone(),
    );

    let candles = match fetcher.fetch(&key, start, end).await {
        Ok(candles) => candles,
        Err(e) => {
            let err = CollectorError::from(e);
            if err.kind() != ErrorKind::Cancelled {
                error!(kind = %err.kind(), error = %err, "과거 데이터 조회 실패");
            }
            return PairOutcome::from_error(0, err.kind(), err);
        }
    };

    let (candles, open) = drop_unclosed(candles, end);
    if open > 0 {
        debug!(open, "진행 중인 캔들 제외");
    }

    if candles.is_empty() {
        let delay = ctx.settings.empty_history_delay;
        info!(delay_secs = delay.as_secs(), "과거 데이터 없음");
        if !sleep_or_cancel(delay, &ctx.cancel).await {
            return PairOutcome::Cancelled { persisted: 0 };
        }
        return PairOutcome::NoData;
    }

    let fetched = candles.len();
    let (valid, rejected) = drop_invalid(candles);
    if valid.is_empty() {
        return PairOutcome::Failed {
            kind: ErrorKind::Validation,
            error: format!("조회한 캔들 {}개가 모두 유효하지 않습니다", fetched),
        };
    }

    match persist_with_retry(&ctx, &valid, WriteMode::SkipExisting).await {
        Ok(persisted) => {
            info!(fetched, persisted, rejected, "과거 데이터 저장 완료");
            if rejected > 0 {
                PairOutcome::Partial {
                    persisted,
                    kind: ErrorKind::Validation,
                    error: format!("유효하지 않은 캔들 {}개 제외", rejected),
                }
            } else {
                PairOutcome::Completed { persisted }
            }
        }
        Err(e) => PairOutcome::from_error(0, e.kind(), e),
    }
}
