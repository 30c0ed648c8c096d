//! Chat command interface
//! Long-polls Telegram for /start, /stop and /status and relays them to the scan loop

use chrono_tz::Tz;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::notify::{TelegramClient, Update};
use crate::orchestrator::{CommandReply, ControlCommand, ScanError, ScanHandle, StatusReport};

/// Pause after a failed `getUpdates` call
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Parse a chat message into a command. Accepts `/status` and `/status@botname`.
pub fn parse_command(text: &str) -> Option<ControlCommand> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);

    match name.to_ascii_lowercase().as_str() {
        "start" => Some(ControlCommand::Start),
        "stop" => Some(ControlCommand::Stop),
        "status" => Some(ControlCommand::Status),
        _ => None,
    }
}

pub fn format_status(report: &StatusReport, timezone: Tz) -> String {
    let status = if report.running {
        "✅ Running"
    } else {
        "⏸ Stopped"
    };
    format!(
        "Status: {}\nTime: {}\nCurrent Account: {}",
        status,
        report.at.with_timezone(&timezone).format("%Y-%m-%d %H:%M"),
        report.account_email
    )
}

pub fn format_reply(reply: &CommandReply, timezone: Tz) -> String {
    match reply {
        CommandReply::Started => "✅ Bot started. Scanning...".to_string(),
        CommandReply::Stopped => "⏹ Bot stopped.".to_string(),
        CommandReply::Status(report) => format_status(report, timezone),
    }
}

pub struct CommandBot {
    telegram: TelegramClient,
    scanner: ScanHandle,
    timezone: Tz,
    offset: Option<i64>,
}

impl CommandBot {
    pub fn new(telegram: TelegramClient, scanner: ScanHandle, timezone: Tz) -> Self {
        Self {
            telegram,
            scanner,
            timezone,
            offset: None,
        }
    }

    /// Poll forever. Returns only once the scan loop has gone away.
    pub async fn run(mut self) {
        info!("Command bot listening");

        loop {
            match self.poll_once().await {
                Ok(()) => {}
                Err(BotError::Scanner(e)) => {
                    warn!(error = %e, "Scan loop unavailable, command bot exiting");
                    return;
                }
                Err(BotError::Telegram(e)) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Fetch one batch of updates and answer every command in it
    pub async fn poll_once(&mut self) -> Result<(), BotError> {
        let updates = self
            .telegram
            .get_updates(self.offset)
            .await
            .map_err(BotError::Telegram)?;

        for update in updates {
            self.offset = Some(update.update_id + 1);
            self.handle_update(&update).await?;
        }
        Ok(())
    }

    async fn handle_update(&self, update: &Update) -> Result<(), BotError> {
        let Some(message) = &update.message else {
            return Ok(());
        };
        let Some(command) = message.text.as_deref().and_then(parse_command) else {
            return Ok(());
        };

        debug!(chat_id = message.chat.id, ?command, "Command received");
        let reply = self.scanner.send(command).await.map_err(BotError::Scanner)?;
        let text = format_reply(&reply, self.timezone);

        if let Err(e) = self
            .telegram
            .send_message(&message.chat.id.to_string(), &text, None)
            .await
        {
            warn!(chat_id = message.chat.id, error = %e, "Failed to answer command");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Telegram error: {0}")]
    Telegram(crate::notify::NotifyError),

    #[error("Scanner error: {0}")]
    Scanner(ScanError),
}
