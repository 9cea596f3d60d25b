//! C2 — Market Regime Detector (§4.2).
//!
//! Pure given `(candles[0..=i], previous_regime, correlation)` — same
//! inputs always produce the same `RegimeSignal` (§8 invariant 5). The
//! caller (the per-session rolling history, §4.10) is responsible for
//! threading `previous_regime` from one tick to the next.

use crate::domain::candle::Candle;
use crate::domain::indicators::{ema, macd, rsi, sma};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignal {
    pub regime: Regime,
    pub confidence: f64,
    pub trend: f64,
    pub momentum: f64,
    pub volatility: f64,
}

impl RegimeSignal {
    fn neutral_unknown() -> Self {
        Self { regime: Regime::Neutral, confidence: 0.0, trend: 0.0, momentum: 0.0, volatility: 0.0 }
    }

    /// The unsmoothed composite score at this tick (§4.2 step 4), used
    /// downstream by the arbiter's dynamic position sizing (§4.4 step 5).
    pub fn composite(&self) -> f64 {
        0.5 * self.trend + 0.5 * self.momentum
    }
}

/// Correlation risk label from a sibling asset's regime signal (§4.2, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationRisk {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub risk_label: CorrelationRisk,
    /// The sibling asset's own composite signal, used to detect opposition.
    pub other_composite: f64,
}

pub struct MarketRegimeDetector;

impl MarketRegimeDetector {
    /// Detects the regime at index `i`. Returns a defined-but-Unknown
    /// signal (Neutral, confidence 0) when fewer than 50 candles precede
    /// `i`, per §4.2.
    pub fn detect(
        candles: &[Candle],
        i: usize,
        previous_regime: Regime,
        correlation: Option<CorrelationContext>,
    ) -> RegimeSignal {
        if i < 50 || candles.len() <= i {
            return RegimeSignal::neutral_unknown();
        }

        let closes: Vec<f64> = candles[..=i].iter().map(|c| c.close).collect();

        // Need 4 prior composites (i-4..=i) for the 5-period smoothing SMA.
        // Each of those needs its own trend/momentum, so we require i >= 54
        // for the smoothing window to be fully populated; below that we
        // still compute what we can by clamping the window's lower bound.
        let window_start = i.saturating_sub(4);
        let mut composites = Vec::with_capacity(5);
        let mut trend_at_i = 0.0;
        let mut momentum_at_i = 0.0;
        for idx in window_start..=i {
            let trend = trend_score(&closes, idx);
            let momentum = momentum_score(&closes, idx);
            if idx == i {
                trend_at_i = trend;
                momentum_at_i = momentum;
            }
            composites.push(0.5 * trend + 0.5 * momentum);
        }
        let smoothed: f64 = composites.iter().sum::<f64>() / composites.len() as f64;
        let volatility = volatility_of_returns(&closes, 20);

        let regime = classify(previous_regime, smoothed);
        let mut confidence = (smoothed.abs() / 0.10).min(1.0);

        if let Some(corr) = correlation {
            confidence = match corr.risk_label {
                CorrelationRisk::Low => (confidence * 1.1).min(1.0),
                CorrelationRisk::High => (confidence * 0.9).max(0.0),
            };
            let opposes = corr.other_composite.signum() != 0.0
                && smoothed.signum() != 0.0
                && corr.other_composite.signum() != smoothed.signum()
                && (corr.other_composite - smoothed).abs() > 0.3;
            if opposes {
                confidence *= 0.85;
            }
        }

        RegimeSignal { regime, confidence, trend: trend_at_i, momentum: momentum_at_i, volatility }
    }
}

fn classify(previous: Regime, s: f64) -> Regime {
    match previous {
        Regime::Neutral => {
            if s >= 0.05 {
                Regime::Bullish
            } else if s <= -0.05 {
                Regime::Bearish
            } else {
                Regime::Neutral
            }
        }
        Regime::Bullish => {
            if s >= 0.02 {
                Regime::Bullish
            } else {
                Regime::Neutral
            }
        }
        Regime::Bearish => {
            if s <= -0.02 {
                Regime::Bearish
            } else {
                Regime::Neutral
            }
        }
    }
}

fn sign_score(cond_pos: bool, cond_neg: bool) -> f64 {
    if cond_pos {
        1.0
    } else if cond_neg {
        -1.0
    } else {
        0.0
    }
}

/// Trend score in [-1,1]: price vs SMA50, SMA50 vs SMA200, slope of SMA50
/// over the last 10 bars, each a +1/-1/0 sub-score, averaged.
fn trend_score(closes: &[f64], i: usize) -> f64 {
    let sma50 = sma(closes, 50);
    let sma200 = sma(closes, 200);

    let mut subscores = Vec::with_capacity(3);

    if let Some(s50) = sma50[i] {
        subscores.push(sign_score(closes[i] > s50, closes[i] < s50));
    }
    if let (Some(s50), Some(s200)) = (sma50[i], sma200[i]) {
        subscores.push(sign_score(s50 > s200, s50 < s200));
    }
    if i >= 10 {
        if let (Some(now), Some(then)) = (sma50[i], sma50[i - 10]) {
            subscores.push(sign_score(now > then, now < then));
        }
    }

    if subscores.is_empty() {
        0.0
    } else {
        subscores.iter().sum::<f64>() / subscores.len() as f64
    }
}

/// Momentum score in [-1,1]: MACD sign, histogram sign, RSI zone, 20-bar
/// return sign, averaged.
fn momentum_score(closes: &[f64], i: usize) -> f64 {
    let macd_result = macd(closes, 12, 26, 9);
    let rsi_result = rsi(closes, 14);

    let mut subscores = Vec::with_capacity(4);

    if let Some(m) = macd_result.macd[i] {
        subscores.push(sign_score(m > 0.0, m < 0.0));
    }
    if let Some(h) = macd_result.histogram[i] {
        subscores.push(sign_score(h > 0.0, h < 0.0));
    }
    if let Some(r) = rsi_result[i] {
        subscores.push(sign_score(r > 55.0, r < 45.0));
    }
    if i >= 20 {
        let ret = (closes[i] - closes[i - 20]) / closes[i - 20];
        subscores.push(sign_score(ret > 0.0, ret < 0.0));
    }

    if subscores.is_empty() {
        0.0
    } else {
        subscores.iter().sum::<f64>() / subscores.len() as f64
    }
}

/// Standard deviation of the last `period` simple returns ending at `i`.
fn volatility_of_returns(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 0.0;
    }
    let n = closes.len();
    let returns: Vec<f64> = (n - period..n)
        .map(|idx| (closes[idx] - closes[idx - 1]) / closes[idx - 1])
        .collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(idx, &c)| Candle {
                timestamp: idx as i64 * 3_600_000,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn below_fifty_candles_is_unknown_neutral() {
        let closes: Vec<f64> = (0..30).map(|x| 100.0 + x as f64).collect();
        let candles = candles_from_closes(&closes);
        let signal = MarketRegimeDetector::detect(&candles, 29, Regime::Neutral, None);
        assert_eq!(signal.regime, Regime::Neutral);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.trend, 0.0);
        assert_eq!(signal.momentum, 0.0);
        assert_eq!(signal.volatility, 0.0);
    }

    #[test]
    fn all_equal_prices_is_neutral_zero_volatility() {
        let closes = vec![100.0; 80];
        let candles = candles_from_closes(&closes);
        let signal = MarketRegimeDetector::detect(&candles, 79, Regime::Neutral, None);
        assert_eq!(signal.regime, Regime::Neutral);
        assert_eq!(signal.volatility, 0.0);
    }

    #[test]
    fn is_deterministic_for_same_slice() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + (x as f64 * 0.5).sin() * 5.0 + x as f64 * 0.3).collect();
        let candles = candles_from_closes(&closes);
        let a = MarketRegimeDetector::detect(&candles, 79, Regime::Neutral, None);
        let b = MarketRegimeDetector::detect(&candles, 79, Regime::Neutral, None);
        assert_eq!(a, b);
    }

    #[test]
    fn sustained_uptrend_eventually_turns_bullish() {
        let closes: Vec<f64> = (0..120).map(|x| 100.0 + x as f64 * 1.5).collect();
        let candles = candles_from_closes(&closes);
        let mut regime = Regime::Neutral;
        for i in 50..candles.len() {
            let signal = MarketRegimeDetector::detect(&candles, i, regime, None);
            regime = signal.regime;
        }
        assert_eq!(regime, Regime::Bullish);
    }

    #[test]
    fn hysteresis_does_not_flip_bullish_to_bearish_in_one_tick() {
        // Bullish regime with a momentary composite dip that stays above
        // the -0.02 exit floor should remain Bullish, never Bearish, in a
        // single classification step.
        let s_i = -0.01; // inside (-0.02, +inf) => stays Bullish
        assert_eq!(classify(Regime::Bullish, s_i), Regime::Bullish);
        assert_eq!(classify(Regime::Bullish, -0.05), Regime::Neutral);
    }
}
