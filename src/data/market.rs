use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::retry_with_backoff;
use super::{validation, Candle, DataError, DataResult};
use crate::config::{BrokerAccount, BrokerConfig};

/// Anything that can log in with broker credentials and hand back candles.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Open (or reopen) a session for `account`, replacing any previous one.
    async fn connect(&mut self, account: &BrokerAccount) -> DataResult<()>;

    /// Most recent `count` candles of `interval_seconds` width, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        interval_seconds: u32,
        count: u32,
    ) -> DataResult<Vec<Candle>>;
}

/// Broker symbol for an instrument: `EUR/JPY:OTC` -> `EURJPY`
pub fn broker_symbol(instrument: &str) -> String {
    instrument.replace(":OTC", "").replace('/', "")
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandlesResponse {
    Wrapped { candles: Vec<Candle> },
    Bare(Vec<Candle>),
}

impl CandlesResponse {
    fn into_candles(self) -> Vec<Candle> {
        match self {
            CandlesResponse::Wrapped { candles } => candles,
            CandlesResponse::Bare(candles) => candles,
        }
    }
}

/// HTTP client for the broker gateway
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
    max_attempts: usize,
    timeout_seconds: u64,
}

impl BrokerClient {
    pub fn new(config: &BrokerConfig) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("fxsignal/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session_token: None,
            max_attempts: config.max_fetch_attempts.max(1),
            timeout_seconds: config.timeout_seconds,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.session_token.is_some()
    }

    fn transport_error(&self, e: reqwest::Error) -> DataError {
        if e.is_timeout() {
            DataError::Timeout {
                timeout_seconds: self.timeout_seconds,
            }
        } else {
            DataError::Network(e)
        }
    }

    async fn login(&self, account: &BrokerAccount) -> DataResult<String> {
        let url = format!("{}/api/v1/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                email: &account.email,
                password: &account.password,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Authentication(format!(
                "{} rejected by broker: {}",
                account.email, body
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DataError::api_error(status.as_u16(), body));
        }

        let body = response.text().await?;
        let login: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| DataError::parse_error(format!("unexpected login response: {}", e)))?;
        login.token.ok_or_else(|| {
            DataError::Authentication(
                login
                    .reason
                    .unwrap_or_else(|| "login response carried no session token".to_string()),
            )
        })
    }

    async fn fetch_once(
        &self,
        token: &str,
        symbol: &str,
        interval_seconds: u32,
        count: u32,
    ) -> DataResult<Vec<Candle>> {
        let url = format!("{}/api/v1/candles", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("asset", symbol.to_string()),
                ("interval", interval_seconds.to_string()),
                ("count", count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::Authentication("broker session expired".to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(DataError::RateLimit { retry_after });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Broker candle request failed ({}): {}", status.as_u16(), body);
            return Err(DataError::api_error(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed: CandlesResponse = serde_json::from_str(&body)?;
        let mut candles = parsed.into_candles();

        if candles.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
            });
        }

        for candle in &candles {
            validation::validate_candle(candle)?;
        }
        candles.sort_by_key(|c| c.timestamp);

        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BrokerClient {
    async fn connect(&mut self, account: &BrokerAccount) -> DataResult<()> {
        tracing::info!(email = %account.email, "Connecting to broker");
        self.session_token = None;

        let token = retry_with_backoff(|| self.login(account), self.max_attempts).await?;
        self.session_token = Some(token);

        tracing::info!(email = %account.email, "Connected to broker");
        Ok(())
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval_seconds: u32,
        count: u32,
    ) -> DataResult<Vec<Candle>> {
        let token = self.session_token.as_deref().ok_or(DataError::NotConnected)?;
        tracing::debug!(symbol, interval_seconds, count, "Fetching candles");

        let candles = retry_with_backoff(
            || self.fetch_once(token, symbol, interval_seconds, count),
            self.max_attempts,
        )
        .await?;

        tracing::debug!(symbol, bars = candles.len(), "Fetched candles");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_symbol() {
        assert_eq!(broker_symbol("EUR/JPY"), "EURJPY");
        assert_eq!(broker_symbol("USD/JPY:OTC"), "USDJPY");
        assert_eq!(broker_symbol("GBPJPY"), "GBPJPY");
    }

    #[test]
    fn test_candles_response_shapes() {
        let bare: CandlesResponse =
            serde_json::from_str(r#"[{"high":2,"low":1,"close":1.5,"volume":10,"time":5}]"#)
                .unwrap();
        assert_eq!(bare.into_candles().len(), 1);

        let wrapped: CandlesResponse = serde_json::from_str(
            r#"{"candles":[{"high":2,"low":1,"close":1.5,"time":5},{"high":2,"low":1,"close":1.6,"time":6}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.into_candles().len(), 2);
    }
}
