// Per-instrument Thresholds
// Static scoring configuration for every instrument the scanner knows about

use serde::Serialize;

use crate::data::indicators::IndicatorPeriods;

/// ATR lookback shared by every instrument
pub const ATR_PERIOD: usize = 10;

/// MACD signal-line period shared by every instrument
pub const MACD_SIGNAL_PERIOD: usize = 9;

/// Instrument whose settings are used for anything not in the table
pub const FALLBACK_INSTRUMENT: &str = "EUR/JPY";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstrumentSettings {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    /// Exclusive lower bound of the neutral RSI band
    pub rsi_min: f64,
    /// Exclusive upper bound of the neutral RSI band
    pub rsi_max: f64,
    /// Minimum EMA separation and ATR floor, in price units
    pub min_atr: f64,
    pub volume_multiplier: f64,
    pub min_confidence: f64,
}

impl InstrumentSettings {
    pub fn periods(&self) -> IndicatorPeriods {
        IndicatorPeriods {
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            rsi: self.rsi_period,
            atr: ATR_PERIOD,
            macd_signal: MACD_SIGNAL_PERIOD,
        }
    }

    pub fn rsi_midpoint(&self) -> f64 {
        (self.rsi_min + self.rsi_max) / 2.0
    }
}

static INSTRUMENT_SETTINGS: [(&str, InstrumentSettings); 4] = [
    (
        "EUR/JPY",
        InstrumentSettings {
            ema_fast: 3,
            ema_slow: 9,
            rsi_period: 4,
            rsi_min: 46.0,
            rsi_max: 54.0,
            min_atr: 0.0008,
            volume_multiplier: 1.5,
            min_confidence: 80.0,
        },
    ),
    (
        "EUR/GBP",
        InstrumentSettings {
            ema_fast: 4,
            ema_slow: 10,
            rsi_period: 5,
            rsi_min: 48.0,
            rsi_max: 52.0,
            min_atr: 0.0006,
            volume_multiplier: 1.6,
            min_confidence: 80.0,
        },
    ),
    (
        "EUR/CAD",
        InstrumentSettings {
            ema_fast: 5,
            ema_slow: 11,
            rsi_period: 5,
            rsi_min: 47.0,
            rsi_max: 53.0,
            min_atr: 0.0007,
            volume_multiplier: 1.4,
            min_confidence: 80.0,
        },
    ),
    (
        "GBP/JPY",
        InstrumentSettings {
            ema_fast: 4,
            ema_slow: 9,
            rsi_period: 4,
            rsi_min: 45.0,
            rsi_max: 55.0,
            min_atr: 0.0009,
            volume_multiplier: 1.5,
            min_confidence: 80.0,
        },
    ),
];

/// Base instrument name with any `:OTC` suffix removed
pub fn base_instrument(instrument: &str) -> &str {
    instrument.split(':').next().unwrap_or(instrument)
}

/// Settings for `instrument`, falling back to EUR/JPY for unknown pairs
/// (USD/JPY:OTC has no entry of its own).
pub fn settings_for(instrument: &str) -> &'static InstrumentSettings {
    lookup(base_instrument(instrument)).unwrap_or_else(|| {
        lookup(FALLBACK_INSTRUMENT).unwrap_or(&INSTRUMENT_SETTINGS[0].1)
    })
}

fn lookup(name: &str) -> Option<&'static InstrumentSettings> {
    INSTRUMENT_SETTINGS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, settings)| settings)
}

pub fn known_instruments() -> impl Iterator<Item = &'static str> {
    INSTRUMENT_SETTINGS.iter().map(|(name, _)| *name)
}
