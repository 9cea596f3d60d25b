//! Data-quality report produced by the orchestrator's candle validation
//! step (§4.9 step 2–3): a gap/coverage/freshness summary the orchestrator
//! attaches to the session and routes to the notification sink when the
//! fetched candle window doesn't meet tolerance.

use crate::domain::candle::{Candle, Timeframe};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub gap_count: usize,
    pub coverage_pct: f64,
    pub freshness_ms: i64,
}

impl DataQualityReport {
    /// `false` when gaps exceed a tolerance of 5% of the expected bar count,
    /// or coverage drops below 90% — both non-fatal (§7 `DataQualityWarning`),
    /// logged and routed to the `NotificationSink`, never aborting a tick.
    pub fn is_within_tolerance(&self) -> bool {
        self.coverage_pct >= 0.90 && (self.gap_count as f64) <= 0.05 * (1.0 / self.coverage_pct.max(1e-9))
    }
}

/// Builds a report from a gap-checked candle sequence and the clock's
/// current time. `candles` must already be sorted ascending by timestamp.
pub fn assess(candles: &[Candle], timeframe: Timeframe, now_ms: i64) -> DataQualityReport {
    if candles.is_empty() {
        return DataQualityReport { gap_count: 0, coverage_pct: 0.0, freshness_ms: i64::MAX };
    }

    let interval = timeframe.to_millis();
    let span = candles.last().unwrap().timestamp - candles.first().unwrap().timestamp;
    let expected_bars = if interval > 0 { (span / interval) as usize + 1 } else { candles.len() };

    let mut gap_count = 0usize;
    for pair in candles.windows(2) {
        let delta = pair[1].timestamp - pair[0].timestamp;
        if delta > interval {
            gap_count += (delta / interval).saturating_sub(1) as usize;
        }
    }

    let coverage_pct = if expected_bars > 0 {
        (candles.len() as f64 / expected_bars as f64).min(1.0)
    } else {
        1.0
    };

    let freshness_ms = now_ms - candles.last().unwrap().timestamp;

    DataQualityReport { gap_count, coverage_pct, freshness_ms }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(ts: i64) -> Candle {
        Candle { timestamp: ts, open: 100.0, high: 101.0, low: 99.0, close: 100.5, volume: 1.0 }
    }

    #[test]
    fn empty_candles_report_zero_coverage() {
        let report = assess(&[], Timeframe::OneHour, 0);
        assert_eq!(report.coverage_pct, 0.0);
    }

    #[test]
    fn contiguous_candles_have_no_gaps() {
        let interval = Timeframe::OneHour.to_millis();
        let candles: Vec<Candle> = (0..10).map(|i| candle_at(i * interval)).collect();
        let report = assess(&candles, Timeframe::OneHour, 9 * interval);
        assert_eq!(report.gap_count, 0);
        assert!((report.coverage_pct - 1.0).abs() < 1e-9);
        assert_eq!(report.freshness_ms, 0);
    }

    #[test]
    fn missing_bar_is_counted_as_a_gap() {
        let interval = Timeframe::OneHour.to_millis();
        let candles = vec![candle_at(0), candle_at(interval), candle_at(3 * interval)];
        let report = assess(&candles, Timeframe::OneHour, 3 * interval);
        assert_eq!(report.gap_count, 1);
    }
}
