//! C8 — Risk Filter Pipeline (§4.8). Evaluated in order; the first
//! blocking filter short-circuits the tick to Hold. None of these inspect
//! the strategy signal — they are pre-signal gates.

use crate::domain::config::AdaptiveConfig;
use crate::domain::regime::Regime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBlock {
    Volatility,
    Whipsaw,
    CircuitBreaker,
    Drawdown,
    EmergencyStop,
}

/// Progressive severity below a hard block, mirroring the teacher's
/// `CircuitBreakerService`/`HaltLevel` (Normal/Warning/Reduced/FullHalt):
/// 50% of a limit is a `Warning`, 75% is `Reduced`, 100% is `FullHalt` — the
/// same point at which §4.8's binary filter actually blocks Phase B. Only
/// `FullHalt` changes the externally observable Hold/no-Hold outcome; the
/// finer levels exist so the orchestrator can log/notify a ratio
/// approaching its limit before it trips.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HaltLevel {
    Normal = 0,
    Warning = 1,
    Reduced = 2,
    FullHalt = 3,
}

impl HaltLevel {
    fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.0 {
            HaltLevel::FullHalt
        } else if ratio >= 0.75 {
            HaltLevel::Reduced
        } else if ratio >= 0.5 {
            HaltLevel::Warning
        } else {
            HaltLevel::Normal
        }
    }

    pub fn is_any_halt(self) -> bool {
        self != HaltLevel::Normal
    }
}

/// Severity snapshot for the two ratio-based filters, computed independent
/// of whether they actually blocked this tick.
#[derive(Debug, Clone, Copy)]
pub struct RiskSeverity {
    pub drawdown: HaltLevel,
    pub circuit_breaker: HaltLevel,
}

pub struct RiskFilterContext<'a> {
    /// Standard deviation of the last-20 returns (caller-computed from
    /// candle closes or portfolio history).
    pub returns_stdev: f64,
    /// Rolling regime history, most recent last.
    pub regime_history: &'a [Regime],
    /// Recent sell outcomes (`true` = win), most recent last.
    pub recent_outcomes: &'a [bool],
    pub peak_value: f64,
    pub current_value: f64,
    pub is_emergency_stopped: bool,
}

pub struct RiskFilterPipeline;

impl RiskFilterPipeline {
    /// Returns the first blocking filter, if any. Drawdown and
    /// EmergencyStop still allow Phase-A stop-loss exits (enforced by the
    /// executor, not here) — this pipeline only gates Phase B.
    pub fn evaluate(ctx: &RiskFilterContext, config: &AdaptiveConfig) -> Option<RiskBlock> {
        if ctx.returns_stdev > config.max_volatility {
            return Some(RiskBlock::Volatility);
        }

        let window = config.whipsaw_detection_periods.min(ctx.regime_history.len());
        if window >= 2 {
            let recent = &ctx.regime_history[ctx.regime_history.len() - window..];
            let transitions = recent.windows(2).filter(|pair| pair[0] != pair[1]).count();
            if transitions > config.whipsaw_max_changes {
                return Some(RiskBlock::Whipsaw);
            }
        }

        if ctx.recent_outcomes.len() >= 5 {
            let lookback = config.circuit_breaker_lookback.min(ctx.recent_outcomes.len());
            let recent = &ctx.recent_outcomes[ctx.recent_outcomes.len() - lookback..];
            let wins = recent.iter().filter(|&&w| w).count();
            let win_rate = wins as f64 / recent.len() as f64;
            if win_rate < config.circuit_breaker_win_rate {
                return Some(RiskBlock::CircuitBreaker);
            }
        }

        if ctx.peak_value > 0.0 {
            let drawdown = (ctx.peak_value - ctx.current_value) / ctx.peak_value;
            if drawdown >= config.max_drawdown_threshold {
                return Some(RiskBlock::Drawdown);
            }
        }

        if ctx.is_emergency_stopped {
            return Some(RiskBlock::EmergencyStop);
        }

        None
    }

    /// The `HaltLevel` each ratio-based filter is at, regardless of
    /// whether it actually blocked this tick (§2.2 "halt-level style
    /// circuit breaker view"). Useful for the orchestrator to emit an
    /// early warning before a filter reaches `FullHalt` and starts
    /// blocking Phase B.
    pub fn severity(ctx: &RiskFilterContext, config: &AdaptiveConfig) -> RiskSeverity {
        let drawdown_ratio = if ctx.peak_value > 0.0 && config.max_drawdown_threshold > 0.0 {
            ((ctx.peak_value - ctx.current_value) / ctx.peak_value) / config.max_drawdown_threshold
        } else {
            0.0
        };

        let circuit_breaker_ratio = if ctx.recent_outcomes.len() >= 5 && config.circuit_breaker_win_rate > 0.0 {
            let lookback = config.circuit_breaker_lookback.min(ctx.recent_outcomes.len());
            let recent = &ctx.recent_outcomes[ctx.recent_outcomes.len() - lookback..];
            let win_rate = recent.iter().filter(|&&w| w).count() as f64 / recent.len() as f64;
            // Shortfall below the floor, relative to the floor itself — 0 at
            // the floor, 1.0 at zero wins, matching the drawdown ratio's
            // "1.0 == at the configured limit" convention.
            ((config.circuit_breaker_win_rate - win_rate) / config.circuit_breaker_win_rate).max(0.0)
        } else {
            0.0
        };

        RiskSeverity {
            drawdown: HaltLevel::from_ratio(drawdown_ratio),
            circuit_breaker: HaltLevel::from_ratio(circuit_breaker_ratio),
        }
    }
}
