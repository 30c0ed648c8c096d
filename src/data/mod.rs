//! Market data access: candle model, broker client and indicator math
//! Provides typed errors and retry helpers for everything that talks to the broker

pub mod errors;
pub mod indicators;
pub mod market;
pub mod retry;

// Re-export commonly used types
pub use errors::{DataError, DataResult};
pub use indicators::{compute_indicators, IndicatorSnapshot, MIN_HISTORY};
pub use market::{broker_symbol, BrokerClient, CandleSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Volume assumed for candles the broker returns without one.
pub const DEFAULT_VOLUME: f64 = 1000.0;

fn default_volume() -> f64 {
    DEFAULT_VOLUME
}

/// One OHLCV bar as returned by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(default)]
    pub open: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(alias = "time", with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open: None,
            high,
            low,
            close,
            volume,
            timestamp,
        }
    }
}

/// Column-oriented view over a candle slice, the shape the indicator math wants
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl PriceSeries {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut series = Self {
            closes: Vec::with_capacity(candles.len()),
            highs: Vec::with_capacity(candles.len()),
            lows: Vec::with_capacity(candles.len()),
            volumes: Vec::with_capacity(candles.len()),
        };
        for candle in candles {
            series.closes.push(candle.close);
            series.highs.push(candle.high);
            series.lows.push(candle.low);
            series.volumes.push(candle.volume);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Validation helpers
pub mod validation {
    use super::*;

    /// Reject bars the indicator math cannot use
    pub fn validate_candle(candle: &Candle) -> DataResult<()> {
        for (field, value) in [
            ("high", candle.high),
            ("low", candle.low),
            ("close", candle.close),
            ("volume", candle.volume),
        ] {
            if !value.is_finite() {
                return Err(DataError::validation_error(field, "value must be finite"));
            }
        }

        if candle.close <= 0.0 {
            return Err(DataError::validation_error("close", "Close price must be positive"));
        }

        if candle.volume < 0.0 {
            return Err(DataError::validation_error("volume", "Volume cannot be negative"));
        }

        if candle.high < candle.low {
            return Err(DataError::validation_error(
                "high_low",
                "High price cannot be less than low price",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_missing_volume_defaults() {
        let candle: Candle =
            serde_json::from_str(r#"{"high":1.2,"low":1.1,"close":1.15,"time":1700000000}"#)
                .unwrap();
        assert_eq!(candle.volume, DEFAULT_VOLUME);
        assert_eq!(candle.open, None);
        assert_eq!(candle.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_series_columns() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let candles = vec![
            Candle::new(ts, 2.0, 1.0, 1.5, 10.0),
            Candle::new(ts, 3.0, 2.0, 2.5, 20.0),
        ];
        let series = PriceSeries::from_candles(&candles);
        assert_eq!(series.closes, vec![1.5, 2.5]);
        assert_eq!(series.highs, vec![2.0, 3.0]);
        assert_eq!(series.volumes, vec![10.0, 20.0]);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_validation_rejects_inverted_range() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let candle = Candle::new(ts, 1.0, 2.0, 1.5, 10.0);
        assert!(validation::validate_candle(&candle).is_err());
    }
}
