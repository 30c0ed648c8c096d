//! Outbound alerts over the Telegram Bot API
//! Formats signals into chat messages and delivers them with bounded retry

pub mod telegram;

pub use telegram::{TelegramClient, Update};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{error, info, warn};

use crate::trading::Signal;

/// Delivery attempts per alert, first try included
pub const SEND_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Telegram API error: {description} (status: {status_code})")]
    Api { status_code: u16, description: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Network(e) => !e.is_decode(),
            NotifyError::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        NotifyError::Parse {
            message: message.into(),
        }
    }
}

/// Destination for trade alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, signal: &Signal, now: DateTime<Utc>) -> NotifyResult<()>;
}

/// Chat text for one signal. `trade_at` is shown as local wall-clock time.
pub fn format_alert(signal: &Signal, trade_at: DateTime<Tz>) -> String {
    format!(
        "🚀 *{}*\n📊 {}\n🕐 Trade at: {}\n✅ Confidence: {:.1}%",
        signal.direction,
        signal.instrument,
        trade_at.format("%H:%M:%S"),
        signal.confidence
    )
}

/// Sends formatted alerts to one chat
pub struct AlertDispatcher {
    telegram: TelegramClient,
    chat_id: String,
    timezone: Tz,
    trade_lead: chrono::Duration,
}

impl AlertDispatcher {
    pub fn new(
        telegram: TelegramClient,
        chat_id: impl Into<String>,
        timezone: Tz,
        trade_lead: chrono::Duration,
    ) -> Self {
        Self {
            telegram,
            chat_id: chat_id.into(),
            timezone,
            trade_lead,
        }
    }

    pub fn render(&self, signal: &Signal, now: DateTime<Utc>) -> String {
        let trade_at = (now + self.trade_lead).with_timezone(&self.timezone);
        format_alert(signal, trade_at)
    }
}

#[async_trait]
impl AlertSink for AlertDispatcher {
    async fn send_alert(&self, signal: &Signal, now: DateTime<Utc>) -> NotifyResult<()> {
        let text = self.render(signal, now);

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(SEND_ATTEMPTS - 1);

        let result = RetryIf::spawn(
            strategy,
            || self.telegram.send_message(&self.chat_id, &text, Some("Markdown")),
            |e: &NotifyError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(error = %e, "Alert delivery failed, retrying");
                }
                retry
            },
        )
        .await;

        match &result {
            Ok(()) => info!(
                instrument = %signal.instrument,
                direction = %signal.direction,
                confidence = signal.confidence,
                "Alert sent"
            ),
            Err(e) => error!(instrument = %signal.instrument, error = %e, "Telegram send error"),
        }
        result
    }
}
