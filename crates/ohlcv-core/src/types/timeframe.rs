//! 캔들스틱 데이터를 위한 타임프레임 정의.
//!
//! 타임프레임은 캔들 하나가 포괄하는 고정 기간이며, 자연 키
//! `(symbol, timeframe, candle_time)`의 일부이므로 전순서(`Ord`)를 가집니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 캔들스틱 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    /// 1분봉
    M1,
    /// 3분봉
    M3,
    /// 5분봉
    M5,
    /// 15분봉
    M15,
    /// 30분봉
    M30,
    /// 1시간봉
    H1,
    /// 2시간봉
    H2,
    /// 4시간봉
    H4,
    /// 6시간봉
    H6,
    /// 8시간봉
    H8,
    /// 12시간봉
    H12,
    /// 일봉
    D1,
    /// 3일봉
    D3,
    /// 주봉
    W1,
    /// 월봉
    MN1,
}

impl Timeframe {
    /// 지원하는 모든 타임프레임.
    pub const ALL: [Timeframe; 15] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::D3,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::from_secs(60),
            Timeframe::M3 => Duration::from_secs(3 * 60),
            Timeframe::M5 => Duration::from_secs(5 * 60),
            Timeframe::M15 => Duration::from_secs(15 * 60),
            Timeframe::M30 => Duration::from_secs(30 * 60),
            Timeframe::H1 => Duration::from_secs(60 * 60),
            Timeframe::H2 => Duration::from_secs(2 * 60 * 60),
            Timeframe::H4 => Duration::from_secs(4 * 60 * 60),
            Timeframe::H6 => Duration::from_secs(6 * 60 * 60),
            Timeframe::H8 => Duration::from_secs(8 * 60 * 60),
            Timeframe::H12 => Duration::from_secs(12 * 60 * 60),
            Timeframe::D1 => Duration::from_secs(24 * 60 * 60),
            Timeframe::D3 => Duration::from_secs(3 * 24 * 60 * 60),
            Timeframe::W1 => Duration::from_secs(7 * 24 * 60 * 60),
            Timeframe::MN1 => Duration::from_secs(30 * 24 * 60 * 60), // 근사값
        }
    }

    /// 이 타임프레임의 밀리초 단위 값을 반환합니다.
    pub fn as_millis(&self) -> i64 {
        self.duration().as_millis() as i64
    }

    /// 거래소 간격 문자열로 변환합니다 (`"1m"`, `"1h"`, `"1M"` 등).
    pub fn as_interval(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::MN1 => "1M",
        }
    }

    /// 거래소 간격 문자열에서 파싱합니다.
    pub fn from_interval(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tf| tf.as_interval() == s)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_interval())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_interval(s.trim()).ok_or_else(|| format!("Invalid timeframe: {}", s))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.as_interval().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.as_millis(), 60_000);
        assert_eq!(Timeframe::H1.as_millis(), 3_600_000);
        assert_eq!(Timeframe::D1.duration().as_secs(), 86_400);
    }

    #[test]
    fn test_timeframe_interval_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_interval().parse::<Timeframe>(), Ok(tf));
        }
        assert_eq!(Timeframe::from_interval("15m"), Some(Timeframe::M15));
        // 월봉과 분봉은 대소문자로 구분
        assert_eq!(Timeframe::from_interval("1M"), Some(Timeframe::MN1));
        assert!("2m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_string_conversion() {
        assert_eq!(String::from(Timeframe::H4), "4h");
        assert_eq!(Timeframe::try_from("1d".to_string()), Ok(Timeframe::D1));
        assert!(Timeframe::try_from("daily".to_string()).is_err());
    }

    #[test]
    fn test_timeframe_ordering() {
        assert!(Timeframe::M15 < Timeframe::H1);
        assert!(Timeframe::D1 < Timeframe::MN1);
    }
}
