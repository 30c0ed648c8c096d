use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use fxsignal::bot::CommandBot;
use fxsignal::config::{redact, Config};
use fxsignal::data::BrokerClient;
use fxsignal::notify::{AlertDispatcher, AlertSink, TelegramClient};
use fxsignal::orchestrator::{command_channel, Scanner};
use fxsignal::session::SessionManager;
use fxsignal::trading::{candidate_instruments, InstrumentSelector, Signal};

fn build_dispatcher(config: &Config, telegram: TelegramClient) -> AlertDispatcher {
    AlertDispatcher::new(
        telegram,
        config.telegram.chat_id.clone(),
        config.scan.timezone,
        config.scan.trade_lead(),
    )
}

async fn connect_session(config: &Config) -> Result<SessionManager<BrokerClient>> {
    let broker = BrokerClient::new(&config.broker).context("Failed to build broker client")?;
    let mut session = SessionManager::new(
        broker,
        config.broker.accounts.clone(),
        config.scan.max_rotation,
    )?;

    // A failed first login is fatal
    session
        .connect()
        .await
        .context("Initial broker login failed")?;
    Ok(session)
}

/// Run the scan loop and the command bot until Ctrl-C or either task ends
pub async fn run_bot(config: Config) -> Result<()> {
    let session = connect_session(&config).await?;
    let telegram =
        TelegramClient::new(&config.telegram).context("Failed to build Telegram client")?;

    let selector = InstrumentSelector::new(&config.broker, &config.scan);
    let dispatcher = build_dispatcher(&config, telegram.clone());
    let scanner = Scanner::new(session, selector, dispatcher, config.scan.clone());

    let (handle, commands) = command_channel();
    let bot = CommandBot::new(telegram, handle, config.scan.timezone);

    let mut scan_task = tokio::spawn(scanner.run(commands));
    let mut bot_task = tokio::spawn(bot.run());

    println!("📡 fxsignal running. Send /start in Telegram to begin alerting (Ctrl-C to quit).");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
        result = &mut scan_task => {
            if let Err(e) = result {
                error!(error = %e, "Scan loop task failed");
            }
        }
        result = &mut bot_task => {
            if let Err(e) = result {
                error!(error = %e, "Command bot task failed");
            }
        }
    }

    scan_task.abort();
    bot_task.abort();
    Ok(())
}

/// Score every candidate once and print what the scorer saw
pub async fn scan(config: Config, send: bool) -> Result<()> {
    let session = connect_session(&config).await?;
    let selector = InstrumentSelector::new(&config.broker, &config.scan);
    let now = Utc::now();

    let mut best: Option<Signal> = None;

    println!(
        "{:<12} {:>6} {:>6} {:>6} {:>6} {:>6} {:>7}  {}",
        "INSTRUMENT", "EMA", "RSI", "VOL", "ATR", "PASS", "CONF", "SIGNAL"
    );
    for instrument in candidate_instruments(now, config.scan.timezone) {
        match selector.evaluate(session.source(), instrument).await {
            Ok(evaluation) => {
                let b = &evaluation.breakdown;
                println!(
                    "{:<12} {:>6.1} {:>6.1} {:>6.1} {:>6} {:>6} {:>7.1}  {}",
                    instrument,
                    b.ema_points,
                    b.rsi_points,
                    b.volume_points,
                    if b.atr_passed { "yes" } else { "no" },
                    b.pass_count,
                    b.confidence,
                    evaluation
                        .signal
                        .as_ref()
                        .map_or("-", |s| s.direction.as_str())
                );
                if let Some(signal) = evaluation.signal {
                    if best.as_ref().map_or(0.0, |current| current.confidence) < signal.confidence {
                        best = Some(signal);
                    }
                }
            }
            Err(e) => {
                warn!(instrument, error = %e, "Evaluation failed");
                println!("{:<12} error: {}", instrument, e);
            }
        }
    }

    let Some(signal) = best else {
        println!("\nNo signal this cycle.");
        return Ok(());
    };

    println!(
        "\nStrongest: {} {} ({:.1}%)",
        signal.direction, signal.instrument, signal.confidence
    );

    if send {
        let telegram =
            TelegramClient::new(&config.telegram).context("Failed to build Telegram client")?;
        let dispatcher = build_dispatcher(&config, telegram);
        dispatcher
            .send_alert(&signal, Utc::now())
            .await
            .context("Failed to send alert")?;
        println!("✅ Alert sent to chat {}", config.telegram.chat_id);
    }

    Ok(())
}

pub fn check_config(config: &Config) -> Result<()> {
    println!("Telegram");
    println!("  token:        {}", redact(&config.telegram.bot_token));
    println!("  chat id:      {}", config.telegram.chat_id);
    println!("  api:          {}", config.telegram.api_url);
    println!("Broker");
    println!("  api:          {}", config.broker.api_url);
    println!(
        "  candles:      {} x {}s",
        config.broker.candle_count, config.broker.candle_interval_seconds
    );
    println!("  accounts:     {}", config.broker.accounts.len());
    for (i, account) in config.broker.accounts.iter().enumerate() {
        println!("    {:>2}. {}", i + 1, account.email);
    }
    println!("Scan");
    println!("  interval:     {}s", config.scan.scan_interval_seconds);
    println!("  cooldown:     {}s", config.scan.cooldown_seconds);
    println!("  error backoff:{}s", config.scan.error_backoff_seconds);
    println!("  rotation:     every {} cycles", config.scan.max_rotation);
    println!("  timezone:     {}", config.scan.timezone);
    println!("  trade lead:   {}s", config.scan.trade_lead_seconds);

    println!("\n✅ Configuration OK");
    Ok(())
}
