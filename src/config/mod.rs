use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Number of numbered `BROKER_EMAIL_n` / `BROKER_PASSWORD_n` slots scanned
/// when no structured account list is configured.
pub const LEGACY_ACCOUNT_SLOTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub broker: BrokerConfig,
    pub scan: ScanConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
    pub poll_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub api_url: String,
    pub accounts: Vec<BrokerAccount>,
    pub timeout_seconds: u64,
    pub candle_interval_seconds: u32,
    pub candle_count: u32,
    pub max_fetch_attempts: usize,
}

/// Login credentials for one broker account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub scan_interval_seconds: u64,
    pub cooldown_seconds: u64,
    pub error_backoff_seconds: u64,
    pub max_rotation: u32,
    pub timezone: Tz,
    pub trade_lead_seconds: i64,
}

impl BrokerAccount {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BrokerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerAccount")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .field("poll_timeout_seconds", &self.poll_timeout_seconds)
            .finish()
    }
}

impl ScanConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_seconds as i64)
    }

    pub fn trade_lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trade_lead_seconds)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 30,
            cooldown_seconds: 120,
            error_backoff_seconds: 60,
            max_rotation: 10,
            timezone: chrono_tz::Asia::Karachi,
            trade_lead_seconds: 20,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup. `load` passes
    /// the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_TOKEN")
            .context("TELEGRAM_TOKEN environment variable is required but not set")?;
        let chat_id =
            lookup("CHAT_ID").context("CHAT_ID environment variable is required but not set")?;
        let broker_url = lookup("BROKER_API_URL")
            .context("BROKER_API_URL environment variable is required but not set")?;

        let accounts = load_accounts(&lookup)?;
        if accounts.is_empty() {
            bail!(
                "No broker accounts configured. Set BROKER_ACCOUNTS, BROKER_ACCOUNTS_FILE \
                 or BROKER_EMAIL_1/BROKER_PASSWORD_1"
            );
        }

        let defaults = ScanConfig::default();
        let timezone = match lookup("SIGNAL_TIMEZONE") {
            Some(name) => Tz::from_str(&name)
                .map_err(|e| anyhow::anyhow!("Invalid SIGNAL_TIMEZONE value '{}': {}", name, e))?,
            None => defaults.timezone,
        };

        let config = Config {
            telegram: TelegramConfig {
                bot_token,
                chat_id,
                api_url: lookup("TELEGRAM_API_URL")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
                poll_timeout_seconds: parse_or(&lookup, "TELEGRAM_POLL_TIMEOUT_SECONDS", 30)?,
            },
            broker: BrokerConfig {
                api_url: broker_url.trim_end_matches('/').to_string(),
                accounts,
                timeout_seconds: parse_or(&lookup, "BROKER_TIMEOUT_SECONDS", 30)?,
                candle_interval_seconds: parse_or(&lookup, "CANDLE_INTERVAL_SECONDS", 60)?,
                candle_count: parse_or(&lookup, "CANDLE_COUNT", 30)?,
                max_fetch_attempts: parse_or(&lookup, "FETCH_MAX_ATTEMPTS", 3)?,
            },
            scan: ScanConfig {
                scan_interval_seconds: parse_or(
                    &lookup,
                    "SCAN_INTERVAL_SECONDS",
                    defaults.scan_interval_seconds,
                )?,
                cooldown_seconds: parse_or(&lookup, "COOLDOWN_SECONDS", defaults.cooldown_seconds)?,
                error_backoff_seconds: parse_or(
                    &lookup,
                    "ERROR_BACKOFF_SECONDS",
                    defaults.error_backoff_seconds,
                )?,
                max_rotation: parse_or(&lookup, "MAX_ROTATION", defaults.max_rotation)?,
                timezone,
                trade_lead_seconds: parse_or(
                    &lookup,
                    "TRADE_LEAD_SECONDS",
                    defaults.trade_lead_seconds,
                )?,
            },
        };

        if config.scan.max_rotation == 0 {
            bail!("MAX_ROTATION must be at least 1");
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

/// Resolve the account list. A JSON list in `BROKER_ACCOUNTS` wins, then a
/// JSON file named by `BROKER_ACCOUNTS_FILE`, then numbered pairs.
fn load_accounts<F>(lookup: &F) -> Result<Vec<BrokerAccount>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup("BROKER_ACCOUNTS") {
        return parse_accounts_json(&raw).context("Invalid BROKER_ACCOUNTS value");
    }

    if let Some(path) = lookup("BROKER_ACCOUNTS_FILE") {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read BROKER_ACCOUNTS_FILE {}", path))?;
        return parse_accounts_json(&raw)
            .with_context(|| format!("Invalid account list in {}", path));
    }

    Ok(numbered_accounts(lookup))
}

pub fn parse_accounts_json(raw: &str) -> Result<Vec<BrokerAccount>> {
    let accounts: Vec<BrokerAccount> = serde_json::from_str(raw)?;
    for (i, account) in accounts.iter().enumerate() {
        if account.email.trim().is_empty() || account.password.is_empty() {
            bail!("Account #{} has an empty email or password", i + 1);
        }
    }
    Ok(accounts)
}

/// Variable prefixes for numbered slots, in lookup order. `QUOTEX_` is the
/// naming older `.env` files use.
const NUMBERED_PREFIXES: [&str; 2] = ["BROKER", "QUOTEX"];

/// Numbered slots; a slot missing either half under every prefix is skipped.
pub fn numbered_accounts<F>(lookup: &F) -> Vec<BrokerAccount>
where
    F: Fn(&str) -> Option<String>,
{
    (1..=LEGACY_ACCOUNT_SLOTS)
        .filter_map(|i| {
            NUMBERED_PREFIXES
                .iter()
                .find_map(|prefix| numbered_slot(lookup, prefix, i))
        })
        .collect()
}

fn numbered_slot<F>(lookup: &F, prefix: &str, slot: usize) -> Option<BrokerAccount>
where
    F: Fn(&str) -> Option<String>,
{
    let email = lookup(&format!("{}_EMAIL_{}", prefix, slot))?;
    let password = lookup(&format!("{}_PASSWORD_{}", prefix, slot))?;
    if email.is_empty() || password.is_empty() {
        return None;
    }
    Some(BrokerAccount { email, password })
}

pub fn redact(secret: &str) -> String {
    if secret.chars().count() <= 6 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}***", prefix)
}
