//! Technical indicators module
//! Implements EMA, RSI, ATR and MACD with TA-Lib seeding and smoothing rules

use serde::{Deserialize, Serialize};

use super::{Candle, DataError, DataResult, PriceSeries};

/// Shortest candle history the scorer accepts
pub const MIN_HISTORY: usize = 20;

/// Window for the trailing volume mean
pub const VOLUME_WINDOW: usize = 10;

/// Lookback periods used for one indicator pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi: usize,
    pub atr: usize,
    pub macd_signal: usize,
}

/// Latest value of every indicator the scorer reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub atr: f64,
    pub macd: MacdValue,
    pub volume: f64,
    pub volume_mean: f64,
}

/// MACD indicator components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Compute the indicator snapshot for one instrument's candles.
///
/// Fails with `InsufficientData` below `MIN_HISTORY` bars, or when a
/// configured period is too long for the bars that were returned.
pub fn compute_indicators(
    symbol: &str,
    candles: &[Candle],
    periods: &IndicatorPeriods,
) -> DataResult<IndicatorSnapshot> {
    if candles.len() < MIN_HISTORY {
        return Err(DataError::InsufficientData {
            symbol: symbol.to_string(),
            required: MIN_HISTORY,
            available: candles.len(),
        });
    }

    let series = PriceSeries::from_candles(candles);
    let insufficient = || DataError::InsufficientData {
        symbol: symbol.to_string(),
        required: required_history(periods),
        available: series.len(),
    };

    let ema_fast = calculate_ema(&series.closes, periods.ema_fast).ok_or_else(insufficient)?;
    let ema_slow = calculate_ema(&series.closes, periods.ema_slow).ok_or_else(insufficient)?;
    let rsi = calculate_rsi(&series.closes, periods.rsi).ok_or_else(insufficient)?;
    let atr = calculate_atr(&series.highs, &series.lows, &series.closes, periods.atr)
        .ok_or_else(insufficient)?;
    let macd = calculate_macd(
        &series.closes,
        periods.ema_fast,
        periods.ema_slow,
        periods.macd_signal,
    )
    .ok_or_else(insufficient)?;

    let volume = *series.volumes.last().ok_or_else(insufficient)?;
    let volume_mean = trailing_mean(&series.volumes, VOLUME_WINDOW).ok_or_else(insufficient)?;

    Ok(IndicatorSnapshot {
        ema_fast,
        ema_slow,
        rsi,
        atr,
        macd,
        volume,
        volume_mean,
    })
}

/// Bars needed before every indicator in `periods` has a value
pub fn required_history(periods: &IndicatorPeriods) -> usize {
    let slow = periods.ema_fast.max(periods.ema_slow);
    let macd = slow + periods.macd_signal - 1;
    MIN_HISTORY
        .max(macd)
        .max(periods.rsi + 1)
        .max(periods.atr + 1)
}

/// EMA over the whole series. The first output is the SMA of the first
/// `period` prices, so the result has `len - period + 1` points.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(ema);

    for &price in &prices[period..] {
        ema += (price - ema) * multiplier;
        out.push(ema);
    }

    out
}

/// Calculate EMA (Exponential Moving Average)
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied()
}

/// Calculate RSI (Relative Strength Index) with Wilder smoothing.
/// A series with no movement at all reads 0, matching TA-Lib.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    for &change in &changes[period..] {
        avg_gain = (avg_gain * (period - 1) as f64 + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + (-change).max(0.0)) / period as f64;
    }

    let total = avg_gain + avg_loss;
    if total == 0.0 {
        return Some(0.0);
    }

    Some(100.0 * avg_gain / total)
}

/// Calculate ATR (Average True Range). True range starts at the second bar;
/// the first ATR is the mean of `period` ranges, then Wilder smoothing.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let len = closes.len();
    if period == 0 || highs.len() != len || lows.len() != len || len < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = (1..len)
        .map(|i| {
            let prev_close = closes[i - 1];
            (highs[i] - lows[i])
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect();

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for &tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
    }

    Some(atr)
}

/// Calculate MACD (Moving Average Convergence Divergence), TA-Lib style.
///
/// Both EMAs start on bar `slow - 1`: the slow EMA is seeded with the SMA of
/// the first `slow` prices and the fast EMA with the SMA of the `fast` prices
/// ending on that same bar. The signal line is an EMA of the MACD line.
/// Periods are swapped if given in the wrong order.
pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdValue> {
    let (fast_period, slow_period) = if fast_period > slow_period {
        (slow_period, fast_period)
    } else {
        (fast_period, slow_period)
    };
    if fast_period == 0 || prices.len() < slow_period {
        return None;
    }

    let seed_start = slow_period - fast_period;
    let fast = ema_series(&prices[seed_start..], fast_period);
    let slow = ema_series(prices, slow_period);

    let macd_values: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();

    let macd_line = *macd_values.last()?;
    let signal_line = calculate_ema(&macd_values, signal_period)?;

    Some(MacdValue {
        macd_line,
        signal_line,
        histogram: macd_line - signal_line,
    })
}

/// Mean of the last `window` values (fewer if the slice is shorter)
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if values.is_empty() || window == 0 {
        return None;
    }
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    Some(tail.iter().sum::<f64>() / tail.len() as f64)
}
