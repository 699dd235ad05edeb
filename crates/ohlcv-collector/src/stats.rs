//! 페어별 수집 결과와 실행 리포트.

use ohlcv_core::{ErrorKind, SeriesKey};
use std::fmt;
use std::time::Duration;

/// 파이프라인 실행 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 과거 데이터 백필
    Historical,
    /// 실시간 스트리밍
    Realtime,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Historical => "historical",
            RunMode::Realtime => "realtime",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 한 페어 파이프라인의 최종 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// 정상 완료
    Completed { persisted: usize },
    /// 조회 성공, 데이터 없음
    NoData,
    /// 일부만 저장됨 (유효하지 않은 캔들 제외, 또는 저장 후 실패)
    Partial {
        persisted: usize,
        kind: ErrorKind,
        error: String,
    },
    /// 실패 (해당 페어만)
    Failed { kind: ErrorKind, error: String },
    /// 종료 요청으로 중단
    Cancelled { persisted: usize },
}

impl PairOutcome {
    /// 에러로부터 실패 결과 생성. 이미 저장한 캔들이 있으면 부분 성공으로 기록합니다.
    pub fn from_error(persisted: usize, kind: ErrorKind, error: impl fmt::Display) -> Self {
        if kind == ErrorKind::Cancelled {
            return PairOutcome::Cancelled { persisted };
        }
        let error = error.to_string();
        if persisted > 0 {
            PairOutcome::Partial {
                persisted,
                kind,
                error,
            }
        } else {
            PairOutcome::Failed { kind, error }
        }
    }

    /// 저장된 캔들 수
    pub fn persisted(&self) -> usize {
        match self {
            PairOutcome::Completed { persisted }
            | PairOutcome::Partial { persisted, .. }
            | PairOutcome::Cancelled { persisted } => *persisted,
            PairOutcome::NoData | PairOutcome::Failed { .. } => 0,
        }
    }

    /// 완료 또는 데이터 없음
    pub fn is_success(&self) -> bool {
        matches!(self, PairOutcome::Completed { .. } | PairOutcome::NoData)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PairOutcome::Completed { .. } => "completed",
            PairOutcome::NoData => "no_data",
            PairOutcome::Partial { .. } => "partial",
            PairOutcome::Failed { .. } => "failed",
            PairOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// 실행 리포트
#[derive(Debug, Clone)]
pub struct RunReport {
    /// 실행 모드
    pub mode: RunMode,
    /// 페어별 결과 (입력 순서)
    pub outcomes: Vec<(SeriesKey, PairOutcome)>,
    /// 소요 시간
    pub elapsed: Duration,
}

impl RunReport {
    /// 총 페어 수
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// 완료 + 데이터 없음
    pub fn succeeded(&self) -> usize {
        self.count(PairOutcome::is_success)
    }

    /// 실패 + 부분 성공
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed { .. } | PairOutcome::Partial { .. }))
    }

    /// 취소된 페어 수
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Cancelled { .. }))
    }

    /// 저장된 총 캔들 수
    pub fn total_persisted(&self) -> usize {
        self.outcomes.iter().map(|(_, o)| o.persisted()).sum()
    }

    /// 특정 페어의 결과
    pub fn outcome(&self, key: &SeriesKey) -> Option<&PairOutcome> {
        self.outcomes.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            (self.succeeded() as f64 / self.total() as f64) * 100.0
        }
    }

    fn count(&self, predicate: impl Fn(&PairOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    /// 리포트 요약 로그 출력
    pub fn log_summary(&self) {
        for (key, outcome) in &self.outcomes {
            match outcome {
                PairOutcome::Failed { kind, error } | PairOutcome::Partial { kind, error, .. } => {
                    tracing::warn!(
                        symbol = %key.symbol,
                        timeframe = %key.timeframe,
                        outcome = outcome.label(),
                        persisted = outcome.persisted(),
                        %kind,
                        error = %error,
                        "페어 수집 실패"
                    );
                }
                _ => {
                    tracing::debug!(
                        symbol = %key.symbol,
                        timeframe = %key.timeframe,
                        outcome = outcome.label(),
                        persisted = outcome.persisted(),
                        "페어 결과"
                    );
                }
            }
        }

        tracing::info!(
            mode = %self.mode,
            total = self.total(),
            success = self.succeeded(),
            failed = self.failed(),
            cancelled = self.cancelled(),
            persisted = self.total_persisted(),
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
