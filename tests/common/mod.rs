#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fxsignal::config::{BrokerAccount, BrokerConfig, ScanConfig};
use fxsignal::data::{Candle, CandleSource, DataError, DataResult};
use fxsignal::notify::{AlertSink, NotifyError, NotifyResult};
use fxsignal::orchestrator::Clock;
use fxsignal::trading::Signal;

/// Closes that leave EUR/JPY with fast EMA above slow EMA, MACD above its
/// signal line and RSI right at the band midpoint.
pub const RISING_TAIL: [f64; 8] = [159.99, 159.97, 160.0, 159.99, 159.97, 160.0, 160.03, 160.0];

/// `RISING_TAIL` at a fifth of the amplitude: EMA gap between min_atr and
/// twice min_atr for EUR/JPY, so the EMA check only earns partial points.
pub const GENTLE_TAIL: [f64; 8] = [
    159.998, 159.994, 160.0, 159.998, 159.994, 160.0, 160.006, 160.0,
];

/// Wednesday 2024-01-10 12:00 UTC
pub fn weekday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
}

pub fn candles(closes: &[f64], volumes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 10, 11, 0, 0).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            Candle::new(
                start + Duration::minutes(i as i64),
                close + 0.01,
                close - 0.01,
                close,
                volume,
            )
        })
        .collect()
}

fn closes_with_tail(tail: &[f64]) -> Vec<f64> {
    let mut closes = vec![160.0; 17];
    closes.extend_from_slice(tail);
    closes
}

fn rising_closes() -> Vec<f64> {
    closes_with_tail(&RISING_TAIL)
}

fn volumes(last: f64) -> Vec<f64> {
    let mut volumes = vec![1000.0; 24];
    volumes.push(last);
    volumes
}

/// 25 bars ending in an upward crossover on a volume spike
pub fn bullish_series() -> Vec<Candle> {
    candles(&rising_closes(), &volumes(2000.0))
}

/// Weaker crossover scoring about 85 for EUR/JPY
pub fn gentle_bullish_series() -> Vec<Candle> {
    candles(&closes_with_tail(&GENTLE_TAIL), &volumes(2000.0))
}

/// Price mirror of `bullish_series`
pub fn bearish_series() -> Vec<Candle> {
    let closes: Vec<f64> = rising_closes().iter().map(|c| 320.0 - c).collect();
    candles(&closes, &volumes(2000.0))
}

/// Same trend as `bullish_series` without the volume spike
pub fn quiet_volume_series() -> Vec<Candle> {
    candles(&rising_closes(), &volumes(1000.0))
}

pub fn flat_series() -> Vec<Candle> {
    candles(&[160.0; 25], &[1000.0; 25])
}

/// In-memory broker keyed by broker symbol. Unknown symbols have no data.
#[derive(Default)]
pub struct FakeBroker {
    series: HashMap<String, Vec<Candle>>,
    reject: Vec<String>,
    expired: bool,
    fetch_delay: Option<std::time::Duration>,
    pub logins: Vec<String>,
    fetches: AtomicUsize,
}

impl FakeBroker {
    pub fn with_series(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.series.insert(symbol.to_string(), candles);
        self
    }

    pub fn rejecting(mut self, email: &str) -> Self {
        self.reject.push(email.to_string());
        self
    }

    /// Every candle request fails as if the session token had expired
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    pub fn with_fetch_delay(mut self, delay: std::time::Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleSource for FakeBroker {
    async fn connect(&mut self, account: &BrokerAccount) -> DataResult<()> {
        self.logins.push(account.email.clone());
        if self.reject.contains(&account.email) {
            return Err(DataError::Authentication(format!("{} rejected", account.email)));
        }
        Ok(())
    }

    async fn get_candles(&self, symbol: &str, _: u32, count: u32) -> DataResult<Vec<Candle>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.expired {
            return Err(DataError::Authentication("broker session expired".into()));
        }
        let candles = self.series.get(symbol).ok_or_else(|| DataError::NoData {
            symbol: symbol.to_string(),
        })?;
        let skip = candles.len().saturating_sub(count as usize);
        Ok(candles[skip..].to_vec())
    }
}

/// Records every alert with the time it was handed over; optionally fails
/// each delivery after recording it
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(Signal, DateTime<Utc>)>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Signal> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<DateTime<Utc>> {
        self.sent.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_alert(&self, signal: &Signal, now: DateTime<Utc>) -> NotifyResult<()> {
        self.sent.lock().unwrap().push((signal.clone(), now));
        if self.fail {
            return Err(NotifyError::Api {
                status_code: 502,
                description: "Bad Gateway".into(),
            });
        }
        Ok(())
    }
}

pub fn accounts(n: usize) -> Vec<BrokerAccount> {
    (1..=n)
        .map(|i| BrokerAccount::new(format!("trader{}@example.com", i), format!("pw{}", i)))
        .collect()
}

pub fn broker_config(api_url: &str) -> BrokerConfig {
    BrokerConfig {
        api_url: api_url.to_string(),
        accounts: accounts(2),
        timeout_seconds: 5,
        candle_interval_seconds: 60,
        candle_count: 30,
        max_fetch_attempts: 3,
    }
}

pub fn scan_config() -> ScanConfig {
    ScanConfig::default()
}

/// Clock the test moves by hand
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(at)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }

    pub fn clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}

/// Wall clock pinned to `start` that follows tokio time, so paused-time
/// tests see every simulated sleep
pub fn tokio_clock(start: DateTime<Utc>) -> Clock {
    let base = tokio::time::Instant::now();
    Arc::new(move || start + Duration::from_std(base.elapsed()).unwrap())
}
