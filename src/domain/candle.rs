//! Candle data model (§3) and the fixed nominal timeframe spacings the
//! orchestrator validates freshness against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single OHLCV bar. `timestamp` is milliseconds since the Unix epoch.
///
/// Invariant: `low <= min(open, close, high)` and `high >= max(open, close, low)`.
/// Sequences passed into this crate are expected to be sorted strictly
/// ascending by timestamp and uniquely keyed by timestamp; gaps are
/// permitted (the core never extrapolates missing candles).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// `false` if the OHLC invariant is violated.
    pub fn is_valid(&self) -> bool {
        let lo = self.open.min(self.close).min(self.high);
        let hi = self.open.max(self.close).max(self.low);
        self.low <= lo && self.high >= hi
    }
}

/// Fixed nominal bar spacing. Drives the orchestrator's staleness check
/// (`1.5 * timeframe_interval`, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    FiveMin,
    OneHour,
    FourHour,
    EightHour,
    OneDay,
}

impl Timeframe {
    pub fn to_millis(self) -> i64 {
        let minutes: i64 = match self {
            Timeframe::FiveMin => 5,
            Timeframe::OneHour => 60,
            Timeframe::FourHour => 240,
            Timeframe::EightHour => 480,
            Timeframe::OneDay => 1440,
        };
        minutes * 60_000
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::FiveMin => "5m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::EightHour => "8h",
            Timeframe::OneDay => "1d",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(Timeframe::FiveMin),
            "1h" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHour),
            "8h" => Ok(Timeframe::EightHour),
            "1d" => Ok(Timeframe::OneDay),
            other => anyhow::bail!("unknown timeframe: {other}"),
        }
    }
}
