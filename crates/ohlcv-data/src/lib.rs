//! 캔들 저장소.
//!
//! 이 crate는 다음을 제공합니다:
//! - 과거/실시간 쓰기 정책을 가진 [`CandleStore`] 트레이트
//! - PostgreSQL 저장소 (UNNEST 일괄 쓰기, 트랜잭션 단위 원자성)
//! - 테스트 및 드라이런용 메모리 저장소

pub mod error;
pub mod storage;

pub use error::{DataError, Result};
pub use storage::memory::MemoryCandleStore;
pub use storage::ohlcv::{OhlcvRecord, PgCandleStore};
pub use storage::{ensure_valid, CandleStore, WriteMode};
