//! Instrument selection
//!
//! Builds the day's candidate list, scores every candidate outside the alert
//! cooldown and keeps the single strongest signal of the batch.

use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::settings::settings_for;
use super::signals::{resolve_direction, score_breakdown, ScoreBreakdown, Signal};
use crate::config::{BrokerConfig, ScanConfig};
use crate::data::{broker_symbol, compute_indicators, CandleSource, DataResult, IndicatorSnapshot};

/// Weekday pairs; the first two are always scanned first
pub const LIVE_PAIRS: [&str; 4] = ["EUR/JPY", "EUR/GBP", "EUR/CAD", "GBP/JPY"];
pub const PRIORITY_PAIRS: [&str; 2] = ["EUR/JPY", "EUR/GBP"];

/// Weekend over-the-counter variants
pub const OTC_PAIRS: [&str; 4] = ["EUR/CAD:OTC", "EUR/JPY:OTC", "EUR/GBP:OTC", "USD/JPY:OTC"];

pub fn is_weekend(now: DateTime<Utc>, timezone: Tz) -> bool {
    matches!(
        now.with_timezone(&timezone).weekday(),
        Weekday::Sat | Weekday::Sun
    )
}

/// Candidate instruments for `now`, weekend status judged in `timezone`
pub fn candidate_instruments(now: DateTime<Utc>, timezone: Tz) -> Vec<&'static str> {
    if is_weekend(now, timezone) {
        return OTC_PAIRS.to_vec();
    }

    let mut pairs = PRIORITY_PAIRS.to_vec();
    pairs.extend(LIVE_PAIRS.iter().copied().filter(|p| !PRIORITY_PAIRS.contains(p)));
    pairs
}

/// Full scoring record for one instrument
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub instrument: String,
    pub snapshot: IndicatorSnapshot,
    pub breakdown: ScoreBreakdown,
    pub signal: Option<Signal>,
}

/// Result of one pass over the candidate list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub signal: Option<Signal>,
    /// A fetch failed because the broker no longer accepts the session
    pub session_lost: bool,
}

#[derive(Debug, Clone)]
pub struct InstrumentSelector {
    pub candle_interval_seconds: u32,
    pub candle_count: u32,
    pub cooldown: chrono::Duration,
    pub timezone: Tz,
}

impl InstrumentSelector {
    pub fn new(broker: &BrokerConfig, scan: &ScanConfig) -> Self {
        Self {
            candle_interval_seconds: broker.candle_interval_seconds,
            candle_count: broker.candle_count,
            cooldown: scan.cooldown(),
            timezone: scan.timezone,
        }
    }

    /// True while the last alert is younger than the cooldown window
    pub fn cooldown_active(&self, now: DateTime<Utc>, last_alert: Option<DateTime<Utc>>) -> bool {
        match last_alert {
            Some(at) => now.signed_duration_since(at) < self.cooldown,
            None => false,
        }
    }

    /// Fetch, compute and score one instrument
    pub async fn evaluate<S>(&self, source: &S, instrument: &str) -> DataResult<Evaluation>
    where
        S: CandleSource + ?Sized,
    {
        let symbol = broker_symbol(instrument);
        let settings = settings_for(instrument);

        let candles = source
            .get_candles(&symbol, self.candle_interval_seconds, self.candle_count)
            .await?;
        let snapshot = compute_indicators(&symbol, &candles, &settings.periods())?;
        let breakdown = score_breakdown(&snapshot, settings);

        let signal = if breakdown.clears_gate(settings) {
            resolve_direction(&snapshot).map(|direction| Signal {
                instrument: instrument.to_string(),
                direction,
                confidence: breakdown.confidence,
            })
        } else {
            None
        };

        debug!(
            instrument,
            pass_count = breakdown.pass_count,
            confidence = breakdown.confidence,
            signal = signal.is_some(),
            "Scored instrument"
        );

        Ok(Evaluation {
            instrument: instrument.to_string(),
            snapshot,
            breakdown,
            signal,
        })
    }

    /// Strongest signal across today's candidates, if any.
    ///
    /// Fetch and history errors only drop the affected instrument; a
    /// rejected session is reported back so the caller can log in again.
    pub async fn strongest_signal<S>(
        &self,
        source: &S,
        now: DateTime<Utc>,
        last_alert: Option<DateTime<Utc>>,
    ) -> Selection
    where
        S: CandleSource + ?Sized,
    {
        let mut best: Option<Signal> = None;
        let mut session_lost = false;

        for instrument in candidate_instruments(now, self.timezone) {
            if self.cooldown_active(now, last_alert) {
                debug!(instrument, "Cooldown active, skipping");
                continue;
            }

            let evaluation = match self.evaluate(source, instrument).await {
                Ok(evaluation) => evaluation,
                Err(e) if e.is_session_lost() => {
                    warn!(instrument, error = %e, "Broker session lost, abandoning scan");
                    session_lost = true;
                    break;
                }
                Err(e) => {
                    warn!(instrument, error = %e, "No data for instrument");
                    continue;
                }
            };

            if let Some(signal) = evaluation.signal {
                let best_confidence = best.as_ref().map_or(0.0, |b| b.confidence);
                if signal.confidence > best_confidence {
                    best = Some(signal);
                }
            }
        }

        if let Some(signal) = &best {
            info!(
                instrument = %signal.instrument,
                direction = %signal.direction,
                confidence = signal.confidence,
                "Strongest signal selected"
            );
        }

        Selection {
            signal: best,
            session_lost,
        }
    }
}
