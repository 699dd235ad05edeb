//! 스크립트 기반 시뮬레이션 거래소.
//!
//! 미리 등록한 페이지와 푸시를 순서대로 돌려주고 모든 호출을 기록합니다.
//! 복제본은 같은 상태를 공유하므로, `Arc<dyn ExchangeClient>`로 넘긴 뒤에도
//! 테스트에서 호출 기록을 확인할 수 있습니다.

use crate::error::ExchangeError;
use crate::traits::{CandleSubscription, ExchangeClient, ExchangeResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ohlcv_core::{Candle, SeriesKey, Timeframe};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct ScriptState {
    pages: HashMap<SeriesKey, VecDeque<ExchangeResult<Vec<Candle>>>>,
    pushes: HashMap<SeriesKey, VecDeque<ExchangeResult<Vec<Candle>>>>,
    subscribe_failures: HashMap<SeriesKey, VecDeque<ExchangeError>>,
    rejected: HashSet<SeriesKey>,
    range_calls: HashMap<SeriesKey, Vec<DateTime<Utc>>>,
    subscribe_calls: HashMap<SeriesKey, usize>,
}

/// 결정적인 인프로세스 거래소.
#[derive(Clone)]
pub struct ScriptedExchange {
    name: String,
    rate_limit: Duration,
    state: Arc<Mutex<ScriptState>>,
}

impl Default for ScriptedExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExchange {
    /// 새 스크립트 거래소를 생성합니다 (요청 간격 50ms).
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            rate_limit: Duration::from_millis(50),
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    /// 요청 간격을 설정합니다.
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        // 테스트 스레드 패닉으로 오염되어도 기록은 계속 읽을 수 있어야 함
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 다음 `fetch_range` 응답으로 캔들 페이지를 등록합니다.
    pub fn push_page(&self, key: &SeriesKey, candles: Vec<Candle>) {
        self.lock()
            .pages
            .entry(key.clone())
            .or_default()
            .push_back(Ok(candles));
    }

    /// 다음 `fetch_range` 응답으로 에러를 등록합니다.
    pub fn push_page_error(&self, key: &SeriesKey, error: ExchangeError) {
        self.lock()
            .pages
            .entry(key.clone())
            .or_default()
            .push_back(Err(error));
    }

    /// 구독의 다음 푸시를 등록합니다.
    pub fn push_update(&self, key: &SeriesKey, candles: Vec<Candle>) {
        self.lock()
            .pushes
            .entry(key.clone())
            .or_default()
            .push_back(Ok(candles));
    }

    /// 구독의 다음 푸시로 에러를 등록합니다.
    pub fn push_update_error(&self, key: &SeriesKey, error: ExchangeError) {
        self.lock()
            .pushes
            .entry(key.clone())
            .or_default()
            .push_back(Err(error));
    }

    /// 다음 `subscribe` 호출이 실패하도록 등록합니다.
    pub fn fail_subscribe(&self, key: &SeriesKey, error: ExchangeError) {
        self.lock()
            .subscribe_failures
            .entry(key.clone())
            .or_default()
            .push_back(error);
    }

    /// 이 페어를 거래소가 모르는 페어로 취급합니다.
    pub fn reject_pair(&self, key: &SeriesKey) {
        self.lock().rejected.insert(key.clone());
    }

    /// `fetch_range` 호출에 사용된 `since` 값 목록.
    pub fn range_calls(&self, key: &SeriesKey) -> Vec<DateTime<Utc>> {
        self.lock().range_calls.get(key).cloned().unwrap_or_default()
    }

    /// `subscribe` 호출 횟수.
    pub fn subscribe_calls(&self, key: &SeriesKey) -> usize {
        self.lock().subscribe_calls.get(key).copied().unwrap_or(0)
    }

    /// 아직 소비되지 않은 푸시 수.
    pub fn pending_updates(&self, key: &SeriesKey) -> usize {
        self.lock().pushes.get(key).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    async fn validate_pair(&self, key: &SeriesKey) -> ExchangeResult<()> {
        if self.lock().rejected.contains(key) {
            return Err(ExchangeError::SymbolNotFound(key.to_string()));
        }
        Ok(())
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> ExchangeResult<Vec<Candle>> {
        let key = SeriesKey::new(symbol, timeframe);
        let mut state = self.lock();
        state
            .range_calls
            .entry(key.clone())
            .or_default()
            .push(since);

        state
            .pages
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn subscribe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> ExchangeResult<Box<dyn CandleSubscription>> {
        let key = SeriesKey::new(symbol, timeframe);
        {
            let mut state = self.lock();
            *state.subscribe_calls.entry(key.clone()).or_default() += 1;
            if let Some(error) = state
                .subscribe_failures
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
            {
                return Err(error);
            }
        }

        Ok(Box::new(ScriptedSubscription {
            key,
            state: Arc::clone(&self.state),
        }))
    }
}

/// 스크립트 거래소의 구독 핸들.
///
/// 등록된 푸시가 모두 소비되면 영원히 대기합니다 (조용한 시장).
struct ScriptedSubscription {
    key: SeriesKey,
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl CandleSubscription for ScriptedSubscription {
    async fn next_batch(&mut self) -> ExchangeResult<Vec<Candle>> {
        let next = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.pushes.get_mut(&self.key).and_then(VecDeque::pop_front)
        };

        match next {
            Some(push) => {
                tokio::task::yield_now().await;
                push
            }
            None => std::future::pending().await,
        }
    }
}

/// `start`부터 타임프레임 간격으로 유효한 캔들 `count`개를 만듭니다.
pub fn synthetic_candles(
    key: &SeriesKey,
    start: DateTime<Utc>,
    count: usize,
) -> Vec<Candle> {
    let step = ChronoDuration::milliseconds(key.timeframe.as_millis());
    (0..count)
        .map(|i| {
            let base = Decimal::from(100 + (i % 50) as i64);
            Candle::new(
                key.symbol.clone(),
                key.timeframe,
                start + step * i as i32,
                base,
                base + Decimal::from(2),
                base - Decimal::from(1),
                base + Decimal::from(1),
                Decimal::from(10 + i as i64),
            )
        })
        .collect()
}
