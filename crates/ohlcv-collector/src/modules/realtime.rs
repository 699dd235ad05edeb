//! 실시간 스트리밍 파이프라인.
//!
//! 재시도는 두 계층에서 일어나며 실패 영역이 다릅니다:
//!
//! | 계층 | 대상 | 한도 초과 시 |
//! |------|------|-------------|
//! | [`RealtimeFetcher`] | 구독 전송 (연결 끊김, 파싱 실패 등) | 페처 종료 |
//! | 이 파이프라인 | 저장소 쓰기, 종료된 페처 재시작 | 페어 실패 |
//!
//! 두 계층 모두 같은 [`RetryPolicy`](ohlcv_core::RetryPolicy)를 사용합니다.
//! 페처를 재시작하면 커서와 재시도 상태도 새로 시작하며, 이미 저장한 캔들이
//! 다시 전달되더라도 실시간 쓰기는 덮어쓰기이므로 결과는 같습니다.

use super::{drop_invalid, persist_with_retry, PipelineContext};
use crate::stats::PairOutcome;
use crate::CollectorError;
use ohlcv_core::SeriesKey;
use ohlcv_data::WriteMode;
use ohlcv_exchange::{sleep_or_cancel, Backoff, FetchError, RealtimeFetcher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 한 페어의 실시간 캔들을 종료 요청 또는 재시도 한도 초과까지 저장합니다.
pub async fn run_realtime_pipeline(ctx: PipelineContext, key: SeriesKey) -> PairOutcome {
    let mut persisted = 0usize;
    let mut restarts = Backoff::new(ctx.settings.retry);

    loop {
        let mut fetcher = RealtimeFetcher::new(
            Arc::clone(&ctx.exchange),
            key.clone(),
            ctx.settings.retry,
            ctx.cancel.clone(),
        );
        info!(restarts = restarts.attempts(), "실시간 수집 시작");

        let failure = loop {
            let batch = match fetcher.next_batch().await {
                Ok(batch) => batch,
                Err(e) => break CollectorError::from(e),
            };

            let (valid, _) = drop_invalid(batch);
            if valid.is_empty() {
                continue;
            }

            match persist_with_retry(&ctx, &valid, WriteMode::Overwrite).await {
                Ok(written) => {
                    persisted += written;
                    restarts.reset();
                    debug!(
                        written,
                        persisted,
                        last_seen = ?fetcher.last_seen(),
                        "실시간 캔들 저장"
                    );
                }
                Err(e) => break e,
            }
        };

        match failure {
            CollectorError::Cancelled => {
                info!(persisted, "실시간 수집 중단");
                return PairOutcome::Cancelled { persisted };
            }
            CollectorError::Fetch(FetchError::RetriesExhausted { .. } | FetchError::Terminated) => {
                match restarts.next_delay() {
                    Some(delay) => {
                        warn!(
                            restart = restarts.attempts(),
                            delay_secs = delay.as_secs(),
                            error = %failure,
                            "페처 종료, 파이프라인 재시작 대기"
                        );
                        if !sleep_or_cancel(delay, &ctx.cancel).await {
                            return PairOutcome::Cancelled { persisted };
                        }
                    }
                    None => {
                        error!(
                            restarts = restarts.attempts(),
                            persisted,
                            error = %failure,
                            "파이프라인 재시작 한도 초과"
                        );
                        return PairOutcome::from_error(persisted, failure.kind(), failure);
                    }
                }
            }
            other => {
                error!(kind = %other.kind(), error = %other, "실시간 파이프라인 실패");
                return PairOutcome::from_error(persisted, other.kind(), other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, FlakyStore};
    use super::*;
    use chrono::{TimeZone, Utc};
    use ohlcv_core::{ErrorKind, RetryPolicy, Timeframe};
    use ohlcv_data::MemoryCandleStore;
    use ohlcv_exchange::simulated::synthetic_candles;
    use ohlcv_exchange::{ExchangeError, ScriptedExchange};
    use std::time::Duration;

    fn key() -> SeriesKey {
        SeriesKey::new("ETH/USDT", Timeframe::M1)
    }

    fn candles(count: usize) -> Vec<ohlcv_core::Candle> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        synthetic_candles(&key(), start, count)
    }

    async fn wait_until(predicate: impl Fn() -> bool) {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_terminated_fetcher() {
        let exchange = ScriptedExchange::new();
        for _ in 0..11 {
            exchange.fail_subscribe(&key(), ExchangeError::Disconnected("refused".into()));
        }
        exchange.push_update(&key(), candles(2));

        let store = Arc::new(MemoryCandleStore::new());
        let ctx = context(&exchange, store.clone(), vec![key()], RetryPolicy::default());
        let cancel = ctx.cancel.clone();

        let began = tokio::time::Instant::now();
        let task = tokio::spawn(run_realtime_pipeline(ctx, key()));
        let probe = store.clone();
        wait_until(move || probe.len() == 2).await;

        // 페처 내부 435s 후 종료, 파이프라인 5s 대기 후 재시작
        assert!(began.elapsed() >= Duration::from_secs(440));
        assert_eq!(exchange.subscribe_calls(&key()), 12);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), PairOutcome::Cancelled { persisted: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_after_restart_limit() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let exchange = ScriptedExchange::new();
        for _ in 0..20 {
            exchange.fail_subscribe(&key(), ExchangeError::Disconnected("refused".into()));
        }

        let store = Arc::new(MemoryCandleStore::new());
        let ctx = context(&exchange, store, vec![key()], policy);

        let outcome = run_realtime_pipeline(ctx, key()).await;

        assert!(matches!(
            outcome,
            PairOutcome::Failed {
                kind: ErrorKind::Exhausted,
                ..
            }
        ));
        // 페처 수명 3번 × 구독 시도 3번
        assert_eq!(exchange.subscribe_calls(&key()), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_outage_is_retried_then_resumes() {
        let exchange = ScriptedExchange::new();
        let all = candles(3);
        exchange.push_update(&key(), all[..2].to_vec());
        exchange.push_update(&key(), all[2..].to_vec());

        let store = Arc::new(FlakyStore::new(2));
        let ctx = context(&exchange, store.clone(), vec![key()], RetryPolicy::default());
        let cancel = ctx.cancel.clone();

        let task = tokio::spawn(run_realtime_pipeline(ctx, key()));
        let probe = store.clone();
        wait_until(move || probe.inner.len() == 3).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), PairOutcome::Cancelled { persisted: 3 });
        assert_eq!(exchange.subscribe_calls(&key()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_survives_transport_reconnect() {
        let exchange = ScriptedExchange::new();
        let all = candles(3);
        let mut revised = all[1].clone();
        revised.volume += rust_decimal::Decimal::ONE;

        exchange.push_update(&key(), all[..2].to_vec());
        exchange.push_update_error(&key(), ExchangeError::Disconnected("reset".into()));
        exchange.push_update(&key(), vec![revised, all[2].clone()]);

        let store = Arc::new(MemoryCandleStore::new());
        let ctx = context(&exchange, store.clone(), vec![key()], RetryPolicy::default());
        let cancel = ctx.cancel.clone();

        let task = tokio::spawn(run_realtime_pipeline(ctx, key()));
        let probe = store.clone();
        wait_until(move || probe.len() == 3).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), PairOutcome::Cancelled { persisted: 3 });
        assert_eq!(exchange.subscribe_calls(&key()), 2);
        // 이미 본 시각의 캔들은 재연결 후에도 걸러짐
        assert_eq!(store.get(&all[1].key()).unwrap().volume, all[1].volume);
    }
}
