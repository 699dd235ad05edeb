//! 에러 타입 정의.

use ohlcv_core::{ConfigError, ErrorKind};
use ohlcv_data::DataError;
use ohlcv_exchange::{ExchangeError, FetchError};
use std::fmt;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 설정 에러
    Config(ConfigError),
    /// 거래소 에러 (페어 검증, 클라이언트 생성)
    Exchange(ExchangeError),
    /// 페처 에러
    Fetch(FetchError),
    /// 저장소 에러
    Storage(DataError),
    /// 저장 재시도 한도 초과
    StorageExhausted { attempts: u32, source: DataError },
    /// 종료 요청으로 중단됨
    Cancelled,
}

impl CollectorError {
    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(e) => e.kind(),
            Self::Exchange(e) => e.kind(),
            Self::Fetch(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::StorageExhausted { .. } => ErrorKind::Exhausted,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 같은 작업을 다시 시도할 가치가 있는지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exchange(e) => e.is_retryable(),
            Self::Fetch(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Exchange(e) => write!(f, "Exchange error: {}", e),
            Self::Fetch(e) => write!(f, "Fetch error: {}", e),
            Self::Storage(e) => write!(f, "Storage error: {}", e),
            Self::StorageExhausted { attempts, source } => {
                write!(f, "Storage retries exhausted after {} attempts: {}", attempts, source)
            }
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Exchange(e) => Some(e),
            Self::Fetch(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::StorageExhausted { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

impl From<ConfigError> for CollectorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ExchangeError> for CollectorError {
    fn from(err: ExchangeError) -> Self {
        Self::Exchange(err)
    }
}

impl From<FetchError> for CollectorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Fetch(other),
        }
    }
}

impl From<DataError> for CollectorError {
    fn from(err: DataError) -> Self {
        Self::Storage(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
