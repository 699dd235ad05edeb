//! 거래소 및 페처 에러 타입.

use ohlcv_core::ErrorKind;
use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 거래소 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 거래소에 없는 심볼
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 거래소가 지원하지 않는 타임프레임
    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    /// 알 수 없는 거래소 식별자
    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_)
                | ExchangeError::Disconnected(_)
                | ExchangeError::RateLimited
                | ExchangeError::Timeout(_)
                | ExchangeError::WebSocket(_)
        )
    }

    /// 설정 에러(알 수 없는 거래소/페어)인지 확인. 재시도하지 않습니다.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ExchangeError::SymbolNotFound(_)
                | ExchangeError::UnsupportedTimeframe(_)
                | ExchangeError::UnsupportedExchange(_)
        )
    }

    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        if self.is_config_error() {
            ErrorKind::Configuration
        } else {
            ErrorKind::Transient
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ExchangeError::Disconnected(err.to_string())
            }
            other => ExchangeError::WebSocket(other.to_string()),
        }
    }
}

/// 과거/실시간 페처 에러.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 재시도 대상이 아닌 거래소 에러
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// 성공 없이 재시도 한도를 넘김
    #[error("재시도 한도 초과 ({attempts}회 연속 실패): {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: ExchangeError,
    },

    /// 이미 종료된 실시간 페처를 다시 호출함
    #[error("페처가 종료 상태입니다")]
    Terminated,

    /// 종료 요청으로 중단됨
    #[error("작업이 취소되었습니다")]
    Cancelled,
}

impl FetchError {
    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Exchange(e) => e.kind(),
            FetchError::RetriesExhausted { .. } | FetchError::Terminated => ErrorKind::Exhausted,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 같은 페처에 다시 요청할 가치가 있는지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Exchange(e) => e.is_retryable(),
            _ => false,
        }
    }
}
