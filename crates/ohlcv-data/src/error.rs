//! 데이터 모듈 오류 타입.

use ohlcv_core::{ErrorKind, ValidationError};
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 중복 레코드
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 저장 전 불변식 검사 실패 (배치 전체 거부)
    #[error("Invalid candle {key}: {source}")]
    Validation {
        key: String,
        #[source]
        source: ValidationError,
    },

    /// 잘못된 데이터 형식 (DB에서 읽은 값)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 타임아웃 오류
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl DataError {
    /// 같은 배치를 다시 써 볼 가치가 있는지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::ConnectionError(_) | DataError::PoolExhausted | DataError::Timeout(_)
        )
    }

    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Validation { .. } => ErrorKind::Validation,
            DataError::ConfigError(_) => ErrorKind::Configuration,
            _ => ErrorKind::Storage,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DataError::ConnectionError(err.to_string())
            }
            sqlx::Error::Configuration(_) => DataError::ConfigError(err.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                if code == "23505" {
                    // PostgreSQL 고유 제약 조건 위반
                    DataError::DuplicateError(db_err.message().to_string())
                } else if code.starts_with("08") || code.starts_with("57P") {
                    // connection_exception, admin_shutdown 등
                    DataError::ConnectionError(db_err.message().to_string())
                } else if code == "57014" {
                    DataError::Timeout(db_err.message().to_string())
                } else {
                    DataError::QueryError(db_err.message().to_string())
                }
            }
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DataError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DataError::MigrationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_retryable_classification() {
        assert!(DataError::from(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(DataError::from(sqlx::Error::PoolClosed).is_retryable());
        assert!(!DataError::from(sqlx::Error::RowNotFound).is_retryable());
        assert!(!DataError::QueryError("syntax".into()).is_retryable());
    }

    #[test]
    fn test_kind() {
        let err = DataError::Validation {
            key: "BTC/USDT 1h".into(),
            source: ValidationError::NegativeVolume(dec!(-1)),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
        assert_eq!(DataError::PoolExhausted.kind(), ErrorKind::Storage);
    }
}
