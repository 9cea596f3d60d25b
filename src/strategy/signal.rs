//! C3 — Strategy Signal Generator (§4.3).

use crate::domain::candle::Candle;
use crate::domain::config::{IndicatorConfig, IndicatorKind, StrategyConfig};
use crate::domain::indicators::{ema, macd, rsi, sma};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub signal: f64,
    pub action: Action,
    pub confidence: f64,
    pub indicators: HashMap<String, f64>,
}

pub struct StrategySignalGenerator;

impl StrategySignalGenerator {
    /// Generates a signal for `config` at index `i` of `candles`.
    pub fn generate(config: &StrategyConfig, candles: &[Candle], i: usize) -> StrategySignal {
        let closes: Vec<f64> = candles[..=i.min(candles.len().saturating_sub(1))]
            .iter()
            .map(|c| c.close)
            .collect();
        let close = closes[i];

        let mut indicators = HashMap::new();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for ind in &config.indicators {
            if let Some((key, sub_signal)) = sub_signal_for(ind, &closes, i, close) {
                weighted_sum += sub_signal * ind.weight;
                total_weight += ind.weight;
                indicators.insert(key, sub_signal);
            }
        }

        let signal = if total_weight > 0.0 { (weighted_sum / total_weight).clamp(-1.0, 1.0) } else { 0.0 };

        let action = if signal >= config.buy_threshold {
            Action::Buy
        } else if signal <= config.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        StrategySignal { signal, action, confidence: signal.abs(), indicators }
    }
}

fn sub_signal_for(ind: &IndicatorConfig, closes: &[f64], i: usize, close: f64) -> Option<(String, f64)> {
    match ind.kind {
        IndicatorKind::Sma { period } => {
            let series = sma(closes, period);
            let ma = series[i]?;
            let rel = (close - ma) / close;
            Some((format!("sma_{period}"), (10.0 * rel).tanh()))
        }
        IndicatorKind::Ema { period } => {
            let series = ema(closes, period);
            let ma = series[i]?;
            let rel = (close - ma) / close;
            Some((format!("ema_{period}"), (10.0 * rel).tanh()))
        }
        IndicatorKind::Macd { fast, slow, signal } => {
            let result = macd(closes, fast, slow, signal);
            let histogram = result.histogram[i]?;
            let scale = close.abs() * 1e-3;
            let sub = if scale > 0.0 { (histogram / scale).tanh() } else { 0.0 };
            Some((format!("macd_{fast}_{slow}_{signal}"), sub.clamp(-1.0, 1.0)))
        }
        IndicatorKind::Rsi { period } => {
            let series = rsi(closes, period);
            let value = series[i]?;
            Some((format!("rsi_{period}"), ((50.0 - value) / 50.0).clamp(-1.0, 1.0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Timeframe;
    use crate::domain::config::IndicatorConfig;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(idx, &c)| Candle { timestamp: idx as i64, open: c, high: c, low: c, close: c, volume: 1.0 })
            .collect()
    }

    fn strategy(indicators: Vec<IndicatorConfig>) -> StrategyConfig {
        StrategyConfig {
            name: "test".into(),
            timeframe: Timeframe::OneHour,
            indicators,
            buy_threshold: 0.3,
            sell_threshold: -0.3,
            max_position_pct: 0.5,
            initial_capital: 1000.0,
        }
    }

    #[test]
    fn undefined_indicator_is_skipped() {
        let closes = vec![100.0; 5];
        let candles = candles_from_closes(&closes);
        let cfg = strategy(vec![IndicatorConfig { kind: IndicatorKind::Sma { period: 20 }, weight: 1.0 }]);
        let out = StrategySignalGenerator::generate(&cfg, &candles, 4);
        assert_eq!(out.signal, 0.0);
        assert!(out.indicators.is_empty());
    }

    #[test]
    fn strong_uptrend_triggers_buy() {
        let closes: Vec<f64> = (0..60).map(|x| 100.0 + x as f64 * 2.0).collect();
        let candles = candles_from_closes(&closes);
        let cfg = strategy(vec![IndicatorConfig { kind: IndicatorKind::Sma { period: 20 }, weight: 1.0 }]);
        let out = StrategySignalGenerator::generate(&cfg, &candles, 59);
        assert_eq!(out.action, Action::Buy);
        assert!(out.signal > 0.0);
    }

    #[test]
    fn confidence_is_signal_magnitude() {
        let closes: Vec<f64> = (0..60).map(|x| 100.0 - x as f64 * 2.0).collect();
        let candles = candles_from_closes(&closes);
        let cfg = strategy(vec![IndicatorConfig { kind: IndicatorKind::Rsi { period: 14 }, weight: 1.0 }]);
        let out = StrategySignalGenerator::generate(&cfg, &candles, 59);
        assert_eq!(out.confidence, out.signal.abs());
    }
}
