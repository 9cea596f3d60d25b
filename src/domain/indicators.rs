//! C1 — pure indicator functions over a closing-price sequence (§4.1).
//!
//! Every function returns a sequence the same length as its input; entries
//! before an indicator is defined are `None`, never a sentinel `NaN`. None
//! of these functions panic on empty input.

use crate::domain::candle::Candle;

/// Simple moving average. Defined from index `period - 1` onward.
pub fn sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }
    let mut window_sum: f64 = prices[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        out[i] = Some(window_sum / period as f64);
    }
    out
}

/// Exponential moving average. Seeded by the SMA of the first `period`
/// closes, then `ema_i = close_i * a + ema_{i-1} * (1-a)` with `a = 2/(period+1)`.
pub fn ema(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);
    let mut prev = seed;
    for i in period..prices.len() {
        let next = prices[i] * alpha + prev * (1.0 - alpha);
        out[i] = Some(next);
        prev = next;
    }
    out
}

/// EMA computed over an already-Option-wrapped series (used for the MACD
/// signal line, whose input is itself a derived, partially-undefined series).
fn ema_over_optional(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if period == 0 {
        return out;
    }
    let first_defined = series.iter().position(Option::is_some);
    let Some(start) = first_defined else {
        return out;
    };
    if series.len() - start < period {
        return out;
    }
    let seed_slice: Vec<f64> = series[start..start + period]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_index = start + period - 1;
    let seed: f64 = seed_slice.iter().sum::<f64>() / period as f64;
    out[seed_index] = Some(seed);
    let mut prev = seed;
    for i in (seed_index + 1)..series.len() {
        let Some(v) = series[i] else { continue };
        let next = v * alpha + prev * (1.0 - alpha);
        out[i] = Some(next);
        prev = next;
    }
    out
}

/// MACD line, signal line, and histogram, aligned to the input length.
pub struct Macd {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    let macd_line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal_line = ema_over_optional(&macd_line, signal);
    let histogram: Vec<Option<f64>> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();
    Macd { macd: macd_line, signal: signal_line, histogram }
}

/// Wilder-smoothed RSI in `[0, 100]`. Defined from index `period` onward
/// (the first `period` price changes seed the average gain/loss).
pub fn rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() <= period {
        return out;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = prices[i] - prices[i - 1];
        if change >= 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    out[period] = Some(rsi_from_avgs(avg_gain, avg_loss));

    for i in (period + 1)..prices.len() {
        let change = prices[i] - prices[i - 1];
        let (gain, loss) = if change >= 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out[i] = Some(rsi_from_avgs(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Average True Range. `use_ema = true` smooths with EMA instead of SMA.
/// True range is defined from index 1 (it needs a previous close), so ATR
/// itself is defined only from index `period` onward.
pub fn atr(candles: &[Candle], period: usize, use_ema: bool) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() <= period {
        return out;
    }
    let mut tr = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let prev_close = candles[i - 1].close;
        let high = candles[i].high;
        let low = candles[i].low;
        tr[i] = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
    }

    if use_ema {
        let alpha = 2.0 / (period as f64 + 1.0);
        let seed: f64 = tr[1..=period].iter().sum::<f64>() / period as f64;
        out[period] = Some(seed);
        let mut prev = seed;
        for i in (period + 1)..candles.len() {
            let next = tr[i] * alpha + prev * (1.0 - alpha);
            out[i] = Some(next);
            prev = next;
        }
    } else {
        let mut window_sum: f64 = tr[1..=period].iter().sum();
        out[period] = Some(window_sum / period as f64);
        for i in (period + 1)..candles.len() {
            window_sum += tr[i] - tr[i - period];
            out[i] = Some(window_sum / period as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle { timestamp: 0, open: o, high: h, low: l, close: c, volume: 0.0 }
    }

    #[test]
    fn sma_undefined_head() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&prices, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn sma_empty_input_never_panics() {
        let out = sma(&[], 3);
        assert!(out.is_empty());
    }

    #[test]
    fn sma_too_short_all_null() {
        let out = sma(&[1.0, 2.0], 5);
        assert_eq!(out, vec![None, None]);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let prices = vec![1.0, 2.0, 3.0];
        let out = ema(&prices, 3);
        assert_eq!(out[2], Some(2.0));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let out = rsi(&prices, 14);
        assert_eq!(out[14], Some(100.0));
    }

    #[test]
    fn atr_flat_candles_is_zero() {
        let candles = vec![candle(10.0, 10.0, 10.0, 10.0); 20];
        let out = atr(&candles, 14, false);
        assert_eq!(out[14], Some(0.0));
    }

    #[test]
    fn macd_histogram_aligns_with_macd_minus_signal() {
        let prices: Vec<f64> = (1..=60).map(|x| x as f64 * 1.5).collect();
        let result = macd(&prices, 12, 26, 9);
        for i in 0..prices.len() {
            if let (Some(m), Some(s), Some(h)) =
                (result.macd[i], result.signal[i], result.histogram[i])
            {
                assert!((h - (m - s)).abs() < 1e-9);
            }
        }
    }
}
