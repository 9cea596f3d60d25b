//! Strategy / Adaptive configuration (§3) with TOML loading and
//! construction-time validation, mirroring the teacher's
//! `config/*_config.rs` modules (env-driven there, file-driven here) that
//! parse, apply defaults, and fail fast on invalid values.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IndicatorKind {
    Sma { period: usize },
    Ema { period: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    Rsi { period: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub kind: IndicatorKind,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub timeframe: crate::domain::candle::Timeframe,
    pub indicators: Vec<IndicatorConfig>,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub max_position_pct: f64,
    pub initial_capital: f64,
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.buy_threshold <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: buy_threshold must be > 0", self.name),
            });
        }
        if self.sell_threshold >= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: sell_threshold must be < 0", self.name),
            });
        }
        if !(0.0..=1.0).contains(&self.max_position_pct) || self.max_position_pct <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: max_position_pct must be in (0,1]", self.name),
            });
        }
        if self.initial_capital <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: initial_capital must be > 0", self.name),
            });
        }
        let total_weight: f64 = self.indicators.iter().map(|i| i.weight).sum();
        if total_weight <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: indicator weights must sum to > 0", self.name),
            });
        }
        if self.indicators.iter().any(|i| i.weight < 0.0) {
            return Err(CoreError::ConfigInvalid {
                reason: format!("{}: indicator weights must be non-negative", self.name),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KellyConfig {
    pub enabled: bool,
    pub fractional_multiplier: f64,
    pub min_trades: usize,
    pub lookback_period: usize,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self { enabled: false, fractional_multiplier: 0.25, min_trades: 20, lookback_period: 20 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLossConfig {
    pub enabled: bool,
    pub atr_multiplier: f64,
    pub trailing: bool,
    pub atr_period: usize,
    pub use_ema: bool,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self { enabled: false, atr_multiplier: 2.0, trailing: true, atr_period: 14, use_ema: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub bullish: StrategyConfig,
    pub bearish: StrategyConfig,
    pub neutral: Option<StrategyConfig>,

    pub regime_confidence_threshold: f64,
    pub momentum_confirmation_threshold: f64,
    pub regime_persistence_periods: usize,

    pub bullish_position_multiplier: f64,
    pub dynamic_position_sizing: bool,
    pub max_bullish_position: f64,

    pub max_volatility: f64,
    pub circuit_breaker_win_rate: f64,
    pub circuit_breaker_lookback: usize,
    pub whipsaw_detection_periods: usize,
    pub whipsaw_max_changes: usize,
    pub max_drawdown_threshold: f64,

    pub kelly: Option<KellyConfig>,
    pub stop_loss: Option<StopLossConfig>,

    pub price_validation_threshold: f64,
    pub min_position_size: f64,
}

impl AdaptiveConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        let cfg: AdaptiveConfig = toml::from_str(s)
            .map_err(|e| CoreError::ConfigInvalid { reason: e.to_string() })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.bullish.validate()?;
        self.bearish.validate()?;
        if let Some(n) = &self.neutral {
            n.validate()?;
        }
        if !(0.0..=1.0).contains(&self.regime_confidence_threshold) {
            return Err(CoreError::ConfigInvalid {
                reason: "regime_confidence_threshold must be in [0,1]".into(),
            });
        }
        if self.regime_persistence_periods == 0 || self.regime_persistence_periods > 5 {
            return Err(CoreError::ConfigInvalid {
                reason: "regime_persistence_periods must be in 1..=5".into(),
            });
        }
        if self.max_bullish_position > 1.0 || self.max_bullish_position <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                reason: "max_bullish_position must be in (0,1]".into(),
            });
        }
        if let Some(kelly) = &self.kelly {
            if kelly.fractional_multiplier <= 0.0 || kelly.fractional_multiplier > 1.0 {
                return Err(CoreError::ConfigInvalid {
                    reason: "kelly.fractional_multiplier must be in (0,1]".into(),
                });
            }
        }
        if self.min_position_size < 0.0 {
            return Err(CoreError::ConfigInvalid { reason: "min_position_size must be >= 0".into() });
        }
        Ok(())
    }
}
