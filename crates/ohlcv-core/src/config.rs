//! 설정 관리.
//!
//! TOML 파일(선택)과 환경 변수(`OHLCV__<SECTION>__<KEY>`)에서 수집기 설정을 로드합니다.
//!
//! ```text
//! OHLCV__EXCHANGE__NAME=binance
//! OHLCV__COLLECTION__SYMBOLS=BTC/USDT,ETH/USDT
//! OHLCV__COLLECTION__TIMEFRAMES=1h,15m
//! OHLCV__RETRY__MAX_RETRIES=10
//! ```

use crate::error::ConfigError;
use crate::types::{Symbol, Timeframe};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 수집기 전체 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 거래소 설정
    pub exchange: ExchangeSettings,
    /// 수집 대상 설정
    pub collection: CollectionSettings,
    /// 재시도/백오프 정책
    pub retry: RetryPolicy,
    /// 데이터베이스 설정
    pub database: DatabaseSettings,
    /// 로깅 설정
    pub logging: LoggingSettings,
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// 거래소 식별자 (예: "binance")
    pub name: String,
    /// 테스트넷 사용
    pub testnet: bool,
    /// 요청 간 최소 간격 (밀리초). 미설정 시 거래소가 알리는 값을 사용
    pub rate_limit_ms: Option<u64>,
    /// REST API 기본 URL 오버라이드
    pub rest_base_url: Option<String>,
    /// WebSocket 기본 URL 오버라이드
    pub ws_base_url: Option<String>,
    /// 과거 데이터 요청당 최대 캔들 수
    pub page_limit: u32,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            name: "binance".to_string(),
            testnet: false,
            rate_limit_ms: None,
            rest_base_url: None,
            ws_base_url: None,
            page_limit: 500,
            timeout_secs: 30,
        }
    }
}

/// `collection.lookback_days`의 상한 (100년).
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// 수집 대상 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// 수집할 심볼 목록 ("BASE/QUOTE")
    pub symbols: Vec<String>,
    /// 수집할 타임프레임 목록 ("1h", "15m" 등)
    pub timeframes: Vec<String>,
    /// 과거 데이터 조회 기간 (일)
    pub lookback_days: i64,
    /// 과거 데이터가 비어 있을 때 완료 처리 전 대기 시간 (초)
    pub empty_history_delay_secs: u64,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            timeframes: vec!["1h".to_string(), "15m".to_string()],
            lookback_days: 365,
            empty_history_delay_secs: 5,
        }
    }
}

impl CollectionSettings {
    /// 타임프레임 문자열을 파싱합니다.
    pub fn parsed_timeframes(&self) -> Result<Vec<Timeframe>, ConfigError> {
        self.timeframes
            .iter()
            .map(|s| s.parse::<Timeframe>().map_err(ConfigError::Invalid))
            .collect()
    }

    /// 심볼 형식을 검사하고 표준 형식("BTC/USDT")으로 정규화합니다.
    pub fn normalized_symbols(&self) -> Result<Vec<String>, ConfigError> {
        self.symbols
            .iter()
            .map(|s| {
                s.parse::<Symbol>()
                    .map(|sym| sym.to_standard_string())
                    .map_err(ConfigError::Invalid)
            })
            .collect()
    }

    /// 과거 데이터가 비어 있을 때의 대기 시간.
    pub fn empty_history_delay(&self) -> Duration {
        Duration::from_secs(self.empty_history_delay_secs)
    }
}

/// 재시도/백오프 정책.
///
/// 연속 실패 n회째의 대기 시간은 `min(initial * multiplier^(n-1), max)`이며,
/// 실패 횟수가 `max_retries`를 넘으면 해당 작업은 종료됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 첫 재시도 대기 시간 (초)
    pub initial_delay_secs: u64,
    /// 연속 실패 시 대기 시간 배수
    pub multiplier: u32,
    /// 최대 대기 시간 (초)
    pub max_delay_secs: u64,
    /// 성공 없이 허용되는 최대 재시도 횟수
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            multiplier: 2,
            max_delay_secs: 60,
            max_retries: 10,
        }
    }
}

impl RetryPolicy {
    /// 첫 재시도 대기 시간.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// 최대 대기 시간.
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// 연결 URL (비어 있으면 `DATABASE_URL` 환경 변수 사용)
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl IngestConfig {
    /// 파일(선택)과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 주어지지 않거나 존재하지 않으면 기본값과 환경 변수만 사용합니다.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("OHLCV")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("collection.symbols")
                .with_list_parse_key("collection.timeframes")
                .try_parsing(true),
        );

        let config: IngestConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 값의 일관성을 검사합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.name.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange.name이 비어 있습니다".to_string()));
        }
        if self.collection.symbols.is_empty() {
            return Err(ConfigError::Invalid(
                "collection.symbols가 비어 있습니다".to_string(),
            ));
        }
        if self.collection.timeframes.is_empty() {
            return Err(ConfigError::Invalid(
                "collection.timeframes가 비어 있습니다".to_string(),
            ));
        }
        self.collection.normalized_symbols()?;
        self.collection.parsed_timeframes()?;

        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.collection.lookback_days) {
            return Err(ConfigError::Invalid(format!(
                "collection.lookback_days는 1..={} 범위여야 합니다: {}",
                MAX_LOOKBACK_DAYS, self.collection.lookback_days
            )));
        }
        if self.retry.multiplier == 0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.retry.initial_delay_secs > self.retry.max_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_delay_secs({})가 retry.max_delay_secs({})보다 큽니다",
                self.retry.initial_delay_secs, self.retry.max_delay_secs
            )));
        }
        Ok(())
    }
}
