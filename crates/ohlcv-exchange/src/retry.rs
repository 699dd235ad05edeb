//! 지수 백오프 재시도 상태.
//!
//! [`Backoff`]는 파이프라인 태스크 하나가 소유하는 `(시도 횟수, 다음 대기 시간)`입니다.
//! 대기는 모두 `tokio::time`을 거치므로 테스트에서는 일시 정지된 시간으로
//! 실제 대기 없이 검증할 수 있습니다.

use ohlcv_core::RetryPolicy;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 연속 실패 횟수와 그에 따른 대기 시간을 추적합니다.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    /// 새 백오프 상태를 생성합니다.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// 마지막 성공 이후 연속 실패 횟수.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// n번째 연속 실패 후의 대기 시간: `min(initial * multiplier^(n-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.policy.max_delay_secs;
        let factor = self
            .policy
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .map(u64::from);

        let secs = factor
            .and_then(|f| self.policy.initial_delay_secs.checked_mul(f))
            .map_or(cap, |s| s.min(cap));

        Duration::from_secs(secs)
    }

    /// 실패를 기록하고 대기할 시간을 반환합니다.
    ///
    /// 연속 실패가 `max_retries`를 넘으면 `None`을 반환합니다.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.policy.max_retries {
            None
        } else {
            Some(self.delay_for(self.attempts))
        }
    }

    /// 성공 시 호출합니다.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// 재시도 한도를 넘겼는지 확인.
    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.policy.max_retries
    }
}

/// 주어진 시간만큼 대기합니다. 취소되면 `false`를 반환합니다.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
