//! Signal Scoring
//!
//! Turns one indicator snapshot into a directional call. Four checks feed a
//! confidence accumulator and a pass counter; a call is only made when at
//! least three checks pass, confidence clears the instrument's minimum and
//! trend and momentum agree on the direction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::settings::InstrumentSettings;
use crate::data::IndicatorSnapshot;

pub const EMA_FULL_POINTS: f64 = 40.0;
pub const EMA_PARTIAL_POINTS: f64 = 25.0;
pub const RSI_MAX_POINTS: f64 = 30.0;
pub const VOLUME_POINTS: f64 = 30.0;

/// Checks that must pass before a call is considered
pub const MIN_PASS_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert-worthy call for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
}

/// Per-check contributions, kept so callers can explain a score
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub ema_points: f64,
    pub rsi_points: f64,
    pub volume_points: f64,
    pub atr_passed: bool,
    pub pass_count: u32,
    pub confidence: f64,
}

impl ScoreBreakdown {
    /// Whether the pass-count and confidence gates are both cleared
    pub fn clears_gate(&self, settings: &InstrumentSettings) -> bool {
        self.pass_count >= MIN_PASS_COUNT && self.confidence >= settings.min_confidence
    }
}

/// Run the four checks without deciding a direction
pub fn score_breakdown(
    snapshot: &IndicatorSnapshot,
    settings: &InstrumentSettings,
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();

    let ema_gap = (snapshot.ema_fast - snapshot.ema_slow).abs();
    if ema_gap > settings.min_atr * 2.0 {
        breakdown.ema_points = EMA_FULL_POINTS;
        breakdown.pass_count += 1;
    } else if ema_gap > settings.min_atr {
        breakdown.ema_points = EMA_PARTIAL_POINTS;
        breakdown.pass_count += 1;
    }

    if settings.rsi_min < snapshot.rsi && snapshot.rsi < settings.rsi_max {
        let distance = (snapshot.rsi - settings.rsi_midpoint()).abs();
        breakdown.rsi_points = (RSI_MAX_POINTS - distance / 2.0).max(0.0);
        breakdown.pass_count += 1;
    }

    if snapshot.volume > snapshot.volume_mean * settings.volume_multiplier {
        breakdown.volume_points = VOLUME_POINTS;
        breakdown.pass_count += 1;
    }

    if snapshot.atr > settings.min_atr {
        breakdown.atr_passed = true;
        breakdown.pass_count += 1;
    }

    breakdown.confidence = breakdown.ema_points + breakdown.rsi_points + breakdown.volume_points;
    breakdown
}

/// Trend and momentum must agree; anything else (including equal EMAs) is no call
pub fn resolve_direction(snapshot: &IndicatorSnapshot) -> Option<Direction> {
    let macd = &snapshot.macd;
    if snapshot.ema_fast > snapshot.ema_slow && macd.macd_line > macd.signal_line {
        Some(Direction::Up)
    } else if snapshot.ema_fast < snapshot.ema_slow && macd.macd_line < macd.signal_line {
        Some(Direction::Down)
    } else {
        None
    }
}

/// Score a snapshot: `None` for no signal, otherwise direction and confidence
pub fn score(
    snapshot: &IndicatorSnapshot,
    settings: &InstrumentSettings,
) -> Option<(Direction, f64)> {
    let breakdown = score_breakdown(snapshot, settings);
    if !breakdown.clears_gate(settings) {
        return None;
    }
    resolve_direction(snapshot).map(|direction| (direction, breakdown.confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::indicators::MacdValue;
    use crate::trading::settings::settings_for;

    fn favourable_up() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: 160.002,
            ema_slow: 160.000,
            rsi: 50.0,
            atr: 0.01,
            macd: MacdValue {
                macd_line: 0.002,
                signal_line: 0.001,
                histogram: 0.001,
            },
            volume: 2000.0,
            volume_mean: 1000.0,
        }
    }

    #[test]
    fn test_all_checks_pass_gives_up() {
        let settings = settings_for("EUR/JPY");
        let (direction, confidence) = score(&favourable_up(), settings).unwrap();
        assert_eq!(direction, Direction::Up);
        assert!((confidence - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_gives_down() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.ema_fast = 159.998;
        snapshot.macd.macd_line = -0.002;
        snapshot.macd.signal_line = -0.001;
        assert_eq!(score(&snapshot, settings).map(|s| s.0), Some(Direction::Down));
    }

    #[test]
    fn test_partial_ema_weight() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.ema_fast = 160.0012; // gap 0.0012 between min_atr and 2x
        let breakdown = score_breakdown(&snapshot, settings);
        assert_eq!(breakdown.ema_points, EMA_PARTIAL_POINTS);
        assert_eq!(breakdown.pass_count, 4);
    }

    #[test]
    fn test_rsi_weight_falls_off_from_midpoint() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.rsi = 53.0;
        let breakdown = score_breakdown(&snapshot, settings);
        assert!((breakdown.rsi_points - 28.5).abs() < 1e-9);

        // band bounds are exclusive
        snapshot.rsi = 54.0;
        let breakdown = score_breakdown(&snapshot, settings);
        assert_eq!(breakdown.rsi_points, 0.0);
        assert_eq!(breakdown.pass_count, 3);
    }

    #[test]
    fn test_atr_counts_without_confidence() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        let with_atr = score_breakdown(&snapshot, settings);
        snapshot.atr = 0.0001;
        let without_atr = score_breakdown(&snapshot, settings);
        assert_eq!(with_atr.confidence, without_atr.confidence);
        assert_eq!(with_atr.pass_count, without_atr.pass_count + 1);
    }

    #[test]
    fn test_equal_emas_give_no_direction() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.ema_fast = snapshot.ema_slow;
        assert_eq!(resolve_direction(&snapshot), None);
        assert_eq!(score(&snapshot, settings), None);
    }

    #[test]
    fn test_conflicting_macd_suppresses_call() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.macd.macd_line = 0.0005;
        let breakdown = score_breakdown(&snapshot, settings);
        assert!(breakdown.clears_gate(settings));
        assert_eq!(score(&snapshot, settings), None);
    }

    #[test]
    fn test_below_min_confidence_is_rejected() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.volume = 1000.0;
        // 40 + 30 = 70 with three passes
        let breakdown = score_breakdown(&snapshot, settings);
        assert_eq!(breakdown.pass_count, 3);
        assert_eq!(score(&snapshot, settings), None);
    }

    #[test]
    fn test_overbought_rsi_blocks_signal() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.rsi = 70.0;
        assert_eq!(score(&snapshot, settings), None);
    }

    #[test]
    fn test_quiet_market_scores_nothing() {
        let settings = settings_for("EUR/JPY");
        let mut snapshot = favourable_up();
        snapshot.ema_fast = 160.0005;
        snapshot.rsi = 30.0;
        snapshot.volume = 1200.0;
        let breakdown = score_breakdown(&snapshot, settings);
        assert_eq!(breakdown.confidence, 0.0);
        assert_eq!(breakdown.pass_count, 1);
        assert_eq!(score(&snapshot, settings), None);
    }

    #[test]
    fn test_direction_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"UP\"");
        assert_eq!(Direction::Down.to_string(), "DOWN");
    }
}
