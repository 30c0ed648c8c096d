mod common;

use anyhow::Result;
use mockito::Matcher;
use serde_json::json;

use common::*;
use fxsignal::bot::CommandBot;
use fxsignal::config::TelegramConfig;
use fxsignal::notify::TelegramClient;
use fxsignal::orchestrator::{command_channel, CommandReply, ControlCommand, Scanner};
use fxsignal::session::SessionManager;
use fxsignal::trading::InstrumentSelector;

#[tokio::test]
async fn test_start_command_round_trip() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let updates = server
        .mock("GET", "/botbot-token/getUpdates")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 555}, "text": "hello"}},
                    {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 555}, "text": "/start@fx_alert_bot"}}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/botbot-token/sendMessage")
        .match_body(Matcher::PartialJson(json!({
            "chat_id": "555",
            "text": "✅ Bot started. Scanning..."
        })))
        .with_status(200)
        .with_body(r#"{"ok":true,"result":{"message_id":3}}"#)
        .expect(1)
        .create_async()
        .await;

    let scan = scan_config();
    let mut session = SessionManager::new(FakeBroker::default(), accounts(1), scan.max_rotation)?;
    session.connect().await?;
    let selector = InstrumentSelector::new(&broker_config("http://unused"), &scan);
    let scanner = Scanner::new(session, selector, RecordingSink::default(), scan.clone());

    let (handle, commands) = command_channel();
    let scan_task = tokio::spawn(scanner.run(commands));

    let telegram = TelegramClient::new(&TelegramConfig {
        bot_token: "bot-token".to_string(),
        chat_id: "555".to_string(),
        api_url: server.url(),
        poll_timeout_seconds: 0,
    })?;
    let mut bot = CommandBot::new(telegram, handle.clone(), scan.timezone);
    bot.poll_once().await?;

    match handle.send(ControlCommand::Status).await? {
        CommandReply::Status(report) => assert!(report.running),
        other => panic!("unexpected reply: {:?}", other),
    }

    updates.assert_async().await;
    reply.assert_async().await;

    drop(bot);
    drop(handle);
    tokio::time::timeout(std::time::Duration::from_secs(5), scan_task).await??;
    Ok(())
}
