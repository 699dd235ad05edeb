//! 과거 데이터 페처.
//!
//! 하나의 (심볼, 타임프레임)에 대해 `[start, end)` 구간을 페이지 단위로 끝까지 조회합니다.
//!
//! ```text
//! since = start
//! loop:
//!     batch = fetch_range(since)
//!     batch 비어 있음 → 종료
//!     since = 마지막 캔들 시각 + 1ms
//!     rate limit 대기
//! until since >= end
//! ```
//!
//! 결과는 전부 아니면 전무입니다. 복구할 수 없는 에러가 나면 그때까지
//! 모은 캔들은 버리고 에러를 반환합니다.

use crate::error::FetchError;
use crate::retry::{sleep_or_cancel, Backoff};
use crate::traits::ExchangeClient;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ohlcv_core::{Candle, RetryPolicy, SeriesKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 구간 조회 페처. 구독 기능은 없습니다.
pub struct HistoricalFetcher {
    exchange: Arc<dyn ExchangeClient>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl HistoricalFetcher {
    /// 새 페처를 생성합니다.
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            exchange,
            policy,
            cancel,
        }
    }

    /// `[start, end)` 구간의 캔들을 시간 오름차순으로 모두 조회합니다.
    ///
    /// 재시도 가능한 에러는 백오프 후 같은 커서로 다시 요청하고, 그 외 에러나
    /// 재시도 한도 초과는 전체 조회를 중단합니다.
    pub async fn fetch(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut since = start;
        let mut candles = Vec::new();
        let mut backoff = Backoff::new(self.policy);
        let mut pages = 0u32;

        while since < end {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.exchange.fetch_range(&key.symbol, key.timeframe, since) => result,
            };

            let batch = match result {
                Ok(batch) => {
                    backoff.reset();
                    batch
                }
                Err(e) if e.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            attempt = backoff.attempts(),
                            delay_secs = delay.as_secs(),
                            error = %e,
                            "구간 조회 실패, 재시도 대기"
                        );
                        if !sleep_or_cancel(delay, &self.cancel).await {
                            return Err(FetchError::Cancelled);
                        }
                        continue;
                    }
                    None => {
                        return Err(FetchError::RetriesExhausted {
                            attempts: backoff.attempts(),
                            last_error: e,
                        })
                    }
                },
                Err(e) => return Err(e.into()),
            };

            pages += 1;
            let Some(last_time) = batch.iter().map(|c| c.candle_time).max() else {
                debug!(pages, "빈 페이지, 구간 소진");
                break;
            };

            let received = batch.len();
            candles.extend(batch.into_iter().filter(|c| c.candle_time < end));
            since = last_time + ChronoDuration::milliseconds(1);

            debug!(
                page = pages,
                received,
                total = candles.len(),
                next_since = %since,
                "페이지 수신"
            );

            if since < end && !sleep_or_cancel(self.exchange.rate_limit(), &self.cancel).await {
                return Err(FetchError::Cancelled);
            }
        }

        info!(count = candles.len(), pages, "과거 데이터 조회 완료");
        Ok(candles)
    }
}
