//! OHLCV 수집기.
//!
//! 이 crate는 거래소 캔들을 저장소로 옮기는 파이프라인을 제공합니다:
//! - 과거 데이터 백필 (페어별 일회성)
//! - 실시간 스트리밍 (페어별 무기한, 재연결/재시작 포함)
//! - 페어별 결과 리포트

pub mod config;
pub mod error;
pub mod modules;
pub mod processor;
pub mod stats;

pub use config::{apply_pair_overrides, load_config, ProcessorSettings};
pub use error::{CollectorError, Result};
pub use modules::PipelineContext;
pub use processor::Processor;
pub use stats::{PairOutcome, RunMode, RunReport};
