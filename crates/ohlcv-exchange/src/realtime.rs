//! 실시간 페처.
//!
//! 하나의 (심볼, 타임프레임)에 대한 구독을 유지하며 새 캔들 배치를 차례로 돌려줍니다.
//!
//! # 상태
//!
//! - `Connected`: 다음 푸시를 기다립니다. 성공하면 `candle_time <= last_seen`인 캔들을
//!   걸러내고, 남은 것이 있으면 커서를 갱신해 반환합니다. 빈 푸시는 에러가 아닙니다.
//! - `Retrying`: 구독 호출이 실패하면 핸들을 버리고 백오프 후 다시 구독합니다.
//! - `Terminated`: 성공 없이 재시도 한도를 넘기면 들어가며 빠져나오지 않습니다.
//!
//! 커서와 재시도 상태는 이 구조체가 단독으로 소유하며 프로세스 수명 동안만 유지됩니다.

use crate::error::FetchError;
use crate::retry::{sleep_or_cancel, Backoff};
use crate::traits::{CandleSubscription, ExchangeClient, ExchangeResult};
use chrono::{DateTime, Utc};
use futures::Stream;
use ohlcv_core::{Candle, RetryPolicy, SeriesKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 실시간 페처 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    /// 구독 중 (또는 첫 구독 전)
    Connected,
    /// 연속 실패 후 재구독 대기 중
    Retrying { attempt: u32 },
    /// 재시도 한도 초과로 영구 종료
    Terminated,
}

/// 구독 기반 페처. 구간 조회 기능은 없습니다.
pub struct RealtimeFetcher {
    exchange: Arc<dyn ExchangeClient>,
    key: SeriesKey,
    subscription: Option<Box<dyn CandleSubscription>>,
    last_seen: Option<DateTime<Utc>>,
    backoff: Backoff,
    state: FetcherState,
    cancel: CancellationToken,
}

impl RealtimeFetcher {
    /// 새 페처를 생성합니다. 구독은 첫 `next_batch` 호출 때 열립니다.
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        key: SeriesKey,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            exchange,
            key,
            subscription: None,
            last_seen: None,
            backoff: Backoff::new(policy),
            state: FetcherState::Connected,
            cancel,
        }
    }

    /// 현재 상태.
    pub fn state(&self) -> FetcherState {
        self.state
    }

    /// 마지막으로 받아들인 캔들 시각.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// 구독을 열거나 재사용해 다음 푸시를 받습니다.
    async fn poll_subscription(&mut self) -> ExchangeResult<Vec<Candle>> {
        let subscription = match self.subscription.take() {
            Some(subscription) => subscription,
            None => {
                let opened = self
                    .exchange
                    .subscribe(&self.key.symbol, self.key.timeframe)
                    .await?;
                debug!("구독 시작");
                opened
            }
        };
        self.subscription.insert(subscription).next_batch().await
    }

    /// 커서 이후의 캔들만 남기고 커서를 전진시킵니다.
    fn accept(&mut self, raw: Vec<Candle>) -> Vec<Candle> {
        let last_seen = self.last_seen;
        let fresh: Vec<Candle> = raw
            .into_iter()
            .filter(|c| last_seen.map_or(true, |seen| c.candle_time > seen))
            .collect();

        if let Some(max_time) = fresh.iter().map(|c| c.candle_time).max() {
            self.last_seen = Some(max_time);
        }
        fresh
    }

    /// 새 캔들이 하나 이상 담긴 다음 배치를 기다립니다.
    ///
    /// 에러:
    /// - `RetriesExhausted`: 이번 호출에서 종료 상태로 전환됨
    /// - `Terminated`: 이미 종료 상태
    /// - `Cancelled`: 종료 요청
    pub async fn next_batch(&mut self) -> Result<Vec<Candle>, FetchError> {
        loop {
            if self.state == FetcherState::Terminated {
                return Err(FetchError::Terminated);
            }

            let cancel = self.cancel.clone();
            let polled = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.poll_subscription() => Some(result),
            };
            let Some(result) = polled else {
                self.subscription = None;
                return Err(FetchError::Cancelled);
            };

            match result {
                Ok(raw) => {
                    if self.backoff.attempts() > 0 {
                        info!(attempts = self.backoff.attempts(), "구독 복구");
                    }
                    self.backoff.reset();
                    self.state = FetcherState::Connected;

                    let received = raw.len();
                    let fresh = self.accept(raw);
                    if fresh.is_empty() {
                        debug!(received, "새 캔들 없음");
                        continue;
                    }
                    return Ok(fresh);
                }
                Err(e) => {
                    self.subscription = None;
                    match self.backoff.next_delay() {
                        Some(delay) => {
                            let attempt = self.backoff.attempts();
                            self.state = FetcherState::Retrying { attempt };
                            warn!(
                                attempt,
                                delay_secs = delay.as_secs(),
                                error = %e,
                                "구독 실패, 재연결 대기"
                            );
                            if !sleep_or_cancel(delay, &self.cancel).await {
                                return Err(FetchError::Cancelled);
                            }
                        }
                        None => {
                            self.state = FetcherState::Terminated;
                            error!(
                                attempts = self.backoff.attempts(),
                                error = %e,
                                "재시도 한도 초과, 실시간 수집 종료"
                            );
                            return Err(FetchError::RetriesExhausted {
                                attempts: self.backoff.attempts(),
                                last_error: e,
                            });
                        }
                    }
                }
            }
        }
    }

    /// 배치 스트림으로 변환합니다.
    ///
    /// 에러는 한 번만 내보내고 스트림을 끝냅니다.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Candle>, FetchError>> {
        futures::stream::unfold(Some(self), |fetcher| async move {
            let mut fetcher = fetcher?;
            match fetcher.next_batch().await {
                Ok(batch) => Some((Ok(batch), Some(fetcher))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
