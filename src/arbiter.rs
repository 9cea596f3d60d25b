//! C4 — Adaptive Strategy Arbiter (§4.4).

use crate::domain::candle::Candle;
use crate::domain::config::{AdaptiveConfig, StrategyConfig};
use crate::domain::indicators::{macd, rsi};
use crate::domain::regime::{CorrelationContext, CorrelationRisk, MarketRegimeDetector, Regime, RegimeSignal};
use crate::domain::trade::Trade;
use crate::risk::filters::{RiskBlock, RiskFilterContext, RiskFilterPipeline};
use crate::risk::kelly::KellySizer;
use crate::strategy::signal::{Action, StrategySignalGenerator, StrategySignal};

#[derive(Debug, Clone)]
pub struct ArbiterOutput {
    pub regime: RegimeSignal,
    pub action: Action,
    pub signal: f64,
    pub confidence: f64,
    pub active_strategy: Option<StrategyConfig>,
    pub position_size_multiplier: f64,
    pub kelly_multiplier: f64,
    pub momentum_confirmed: bool,
    pub persistence_met: bool,
    pub risk_block: Option<RiskBlock>,
}

impl ArbiterOutput {
    fn blocked(regime: RegimeSignal, risk_block: RiskBlock) -> Self {
        Self {
            regime,
            action: Action::Hold,
            signal: 0.0,
            confidence: 0.0,
            active_strategy: None,
            position_size_multiplier: 1.0,
            kelly_multiplier: 1.0,
            momentum_confirmed: false,
            persistence_met: false,
            risk_block: Some(risk_block),
        }
    }
}

pub struct AdaptiveStrategyArbiter;

impl AdaptiveStrategyArbiter {
    /// One tick. `regime_history` must already include the just-detected
    /// current regime appended by the caller (§4.10), most recent last;
    /// `risk_ctx.regime_history` should be the same slice so the whipsaw
    /// filter sees this tick's regime too.
    #[allow(clippy::too_many_arguments)]
    pub fn arbitrate(
        candles: &[Candle],
        i: usize,
        config: &AdaptiveConfig,
        previous_regime: Regime,
        regime_history: &[Regime],
        risk_ctx: &RiskFilterContext,
        trades: &[Trade],
        correlation: Option<CorrelationContext>,
    ) -> ArbiterOutput {
        let regime = MarketRegimeDetector::detect(candles, i, previous_regime, correlation);

        if let Some(block) = RiskFilterPipeline::evaluate(risk_ctx, config) {
            return ArbiterOutput::blocked(regime, block);
        }

        let persistence_target_met = |target: Regime| -> bool {
            if regime_history.len() < 5 {
                return false;
            }
            let last5 = &regime_history[regime_history.len() - 5..];
            last5.iter().filter(|&&r| r == target).count() >= config.regime_persistence_periods
        };

        let momentum = momentum_confirmation_score(candles, i);
        let momentum_confirmed = momentum >= config.momentum_confirmation_threshold;

        let bullish_threshold = match correlation.map(|c| c.risk_label) {
            Some(CorrelationRisk::Low) => config.regime_confidence_threshold * 0.9,
            Some(CorrelationRisk::High) => config.regime_confidence_threshold * 1.3,
            None => config.regime_confidence_threshold,
        };

        let bullish_persistence = persistence_target_met(Regime::Bullish);
        let bearish_persistence = persistence_target_met(Regime::Bearish);

        let (chosen, multiplier, is_bullish_path) = if regime.regime == Regime::Bullish
            && regime.confidence >= bullish_threshold
            && momentum_confirmed
            && bullish_persistence
        {
            let m = dynamic_position_multiplier(&config.bullish, regime.confidence, regime.composite(), config, correlation);
            (&config.bullish, m, true)
        } else if regime.regime == Regime::Bearish
            && regime.confidence >= config.regime_confidence_threshold
            && bearish_persistence
        {
            (&config.bearish, 1.0, false)
        } else if let Some(neutral) = &config.neutral {
            (neutral, 1.0, false)
        } else {
            (&config.bearish, 1.0, false)
        };

        let strategy_signal: StrategySignal = StrategySignalGenerator::generate(chosen, candles, i);
        let mut signal = strategy_signal.signal;

        // §4.4 step 6 — amplify only on the confirmed bullish path; the
        // multiplier otherwise stays 1.0 and applies to sizing alone.
        if is_bullish_path && momentum_confirmed {
            signal = (signal * multiplier).clamp(-1.0, 1.0);
        }

        let kelly_multiplier = match &config.kelly {
            Some(kelly) if kelly.enabled => KellySizer::multiplier(trades, kelly, chosen.max_position_pct),
            _ => 1.0,
        };

        ArbiterOutput {
            regime,
            action: strategy_signal.action,
            signal,
            confidence: strategy_signal.confidence,
            active_strategy: Some(chosen.clone()),
            position_size_multiplier: multiplier,
            kelly_multiplier,
            momentum_confirmed,
            persistence_met: if is_bullish_path { bullish_persistence } else { bearish_persistence },
            risk_block: None,
        }
    }
}

/// §4.4 step 5 — dynamic position sizing for the bullish path only.
fn dynamic_position_multiplier(
    bullish: &StrategyConfig,
    confidence: f64,
    composite: f64,
    config: &AdaptiveConfig,
    correlation: Option<CorrelationContext>,
) -> f64 {
    if !config.dynamic_position_sizing {
        return config.bullish_position_multiplier;
    }

    let base = bullish.max_position_pct;
    let min_pct = base * 0.7;
    let mut target = (min_pct + confidence * (config.max_bullish_position - min_pct)).min(config.max_bullish_position);

    if let Some(corr) = correlation {
        match corr.risk_label {
            CorrelationRisk::Low => target = (target * 1.1).min(config.max_bullish_position),
            CorrelationRisk::High => target = (target * 0.8).max(min_pct),
        }
        let opposes = corr.other_composite.signum() != 0.0
            && composite.signum() != 0.0
            && corr.other_composite.signum() != composite.signum()
            && (corr.other_composite - composite).abs() > 0.3;
        if opposes {
            target = (target * 0.85).max(min_pct);
        }
    }

    if base <= 0.0 {
        1.0
    } else {
        target / base
    }
}

/// §4.4 step 4 — momentum confirmation: MACD vs signal line, histogram
/// sign, RSI zone, and 20-bar return sign, averaged into `[-1,1]`.
fn momentum_confirmation_score(candles: &[Candle], i: usize) -> f64 {
    let closes: Vec<f64> = candles[..=i].iter().map(|c| c.close).collect();
    let macd_result = macd(&closes, 12, 26, 9);
    let rsi_result = rsi(&closes, 14);

    let mut parts = Vec::with_capacity(4);
    if let (Some(m), Some(s)) = (macd_result.macd[i], macd_result.signal[i]) {
        parts.push(if m > s { 1.0 } else { -1.0 });
    }
    if let Some(h) = macd_result.histogram[i] {
        parts.push(if h > 0.0 { 1.0 } else { -1.0 });
    }
    if let Some(r) = rsi_result[i] {
        parts.push(if r > 50.0 { 1.0 } else { -1.0 });
    }
    if i >= 20 {
        let ret = (closes[i] - closes[i - 20]) / closes[i - 20];
        parts.push(if ret > 0.0 { 1.0 } else { -1.0 });
    }

    if parts.is_empty() {
        0.0
    } else {
        parts.iter().sum::<f64>() / parts.len() as f64
    }
}
