use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{NotifyError, NotifyResult};
use crate::config::TelegramConfig;

/// Extra time on top of the long-poll timeout before the HTTP request gives up
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Minimal Bot API client: `sendMessage` and `getUpdates`
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> NotifyResult<Self> {
        let poll_timeout = Duration::from_secs(config.poll_timeout_seconds);
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + LONG_POLL_GRACE)
            .user_agent(concat!("fxsignal/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> NotifyResult<()> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id,
                text,
                parse_mode,
            })
            .send()
            .await?;

        let _: serde_json::Value = Self::unwrap_response(response).await?;
        debug!(chat_id, "Message delivered");
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: Option<i64>) -> NotifyResult<Vec<Update>> {
        let mut query = vec![
            ("timeout", self.poll_timeout.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()
            .await?;

        Self::unwrap_response(response).await
    }

    async fn unwrap_response<T>(response: reqwest::Response) -> NotifyResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status().as_u16();
        let body = response.text().await?;

        let parsed: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if status >= 400 => {
                return Err(NotifyError::Api {
                    status_code: status,
                    description: body,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !parsed.ok {
            return Err(NotifyError::Api {
                status_code: parsed.error_code.unwrap_or(status),
                description: parsed
                    .description
                    .unwrap_or_else(|| "Unknown Telegram error".to_string()),
            });
        }

        parsed
            .result
            .ok_or_else(|| NotifyError::parse_error("Telegram response carried no result"))
    }
}
