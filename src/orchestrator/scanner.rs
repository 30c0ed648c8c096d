//! Poll loop
//! Owns run state and the broker session; the command bot talks to it only
//! through a channel, so every mutation happens on this task.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::ScanConfig;
use crate::data::CandleSource;
use crate::notify::AlertSink;
use crate::session::{SessionError, SessionManager};
use crate::trading::{InstrumentSelector, Signal};

const COMMAND_BUFFER: usize = 16;

/// Wall-clock source for the loop. Alerts are stamped with it at dispatch.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Scan loop is not running")]
    LoopClosed,
}

impl ScanError {
    /// How long the loop waits after a cycle fails with this error
    pub fn backoff(&self, config: &ScanConfig) -> Duration {
        match self {
            // rejected credentials do not recover on the next tick
            ScanError::Session(SessionError::Connect { source, .. }) if !source.is_retryable() => {
                config.error_backoff() * 2
            }
            _ => config.error_backoff(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Started,
    Stopped,
    Status(StatusReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub running: bool,
    pub at: DateTime<Utc>,
    pub account_email: String,
    pub last_alert: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ControlMessage {
    command: ControlCommand,
    reply: oneshot::Sender<CommandReply>,
}

/// Cloneable sender side of the command channel
#[derive(Debug, Clone)]
pub struct ScanHandle {
    tx: mpsc::Sender<ControlMessage>,
}

impl ScanHandle {
    pub async fn send(&self, command: ControlCommand) -> Result<CommandReply, ScanError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMessage { command, reply })
            .await
            .map_err(|_| ScanError::LoopClosed)?;
        rx.await.map_err(|_| ScanError::LoopClosed)
    }
}

pub fn command_channel() -> (ScanHandle, mpsc::Receiver<ControlMessage>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    (ScanHandle { tx }, rx)
}

/// Alerting flag and cooldown anchor; lost on restart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub running: bool,
    pub last_alert: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub alert: Option<Signal>,
    pub rotated: bool,
}

pub struct Scanner<S, A> {
    session: SessionManager<S>,
    selector: InstrumentSelector,
    alerts: A,
    config: ScanConfig,
    state: RunState,
    clock: Clock,
}

impl<S, A> Scanner<S, A>
where
    S: CandleSource,
    A: AlertSink,
{
    pub fn new(
        session: SessionManager<S>,
        selector: InstrumentSelector,
        alerts: A,
        config: ScanConfig,
    ) -> Self {
        Self {
            session,
            selector,
            alerts,
            config,
            state: RunState::default(),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn session(&self) -> &SessionManager<S> {
        &self.session
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    pub fn handle_command(&mut self, command: ControlCommand, now: DateTime<Utc>) -> CommandReply {
        match command {
            ControlCommand::Start => {
                if !self.state.running {
                    info!("Alerting started");
                }
                self.state.running = true;
                CommandReply::Started
            }
            ControlCommand::Stop => {
                if self.state.running {
                    info!("Alerting stopped");
                }
                self.state.running = false;
                CommandReply::Stopped
            }
            ControlCommand::Status => CommandReply::Status(StatusReport {
                running: self.state.running,
                at: now,
                account_email: self.session.active_account().email.clone(),
                last_alert: self.state.last_alert,
            }),
        }
    }

    /// One poll cycle. Scans and alerts only while running; rotation
    /// bookkeeping happens every cycle either way.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, ScanError> {
        let mut outcome = CycleOutcome::default();

        let scan_result = if self.state.running {
            self.scan(now, &mut outcome).await
        } else {
            Ok(())
        };

        outcome.rotated = self.session.record_cycle().await?;
        scan_result?;

        Ok(outcome)
    }

    async fn scan(
        &mut self,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) -> Result<(), ScanError> {
        self.session.ensure_connected().await?;

        let selection = self
            .selector
            .strongest_signal(self.session.source(), now, self.state.last_alert)
            .await;

        if selection.session_lost {
            self.session.mark_disconnected();
        }

        if let Some(signal) = selection.signal {
            // fetching can take a while; trade time and cooldown start from dispatch
            let sent_at = (self.clock)();
            // delivery failures are logged by the sink and do not stop the loop
            if let Err(e) = self.alerts.send_alert(&signal, sent_at).await {
                debug!(error = %e, "Alert not delivered");
            }
            self.state.last_alert = Some(sent_at);
            outcome.alert = Some(signal);
        }

        Ok(())
    }

    /// Run until every `ScanHandle` is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<ControlMessage>) {
        info!(
            interval_seconds = self.config.scan_interval_seconds,
            cooldown_seconds = self.config.cooldown_seconds,
            "Scan loop started"
        );

        loop {
            let delay = match self.run_cycle((self.clock)()).await {
                Ok(outcome) => {
                    debug!(
                        alerted = outcome.alert.is_some(),
                        rotated = outcome.rotated,
                        "Cycle complete"
                    );
                    self.config.scan_interval()
                }
                Err(e) => {
                    let backoff = e.backoff(&self.config);
                    error!(error = %e, backoff_seconds = backoff.as_secs(), "Scan cycle failed");
                    backoff
                }
            };

            if !self.wait(delay, &mut commands).await {
                info!("Command channel closed, scan loop exiting");
                return;
            }
        }
    }

    /// Sleep for `delay`, answering commands as they arrive. Returns false
    /// once the channel is closed.
    async fn wait(
        &mut self,
        delay: Duration,
        commands: &mut mpsc::Receiver<ControlMessage>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                message = commands.recv() => match message {
                    Some(ControlMessage { command, reply }) => {
                        let response = self.handle_command(command, (self.clock)());
                        // the requester may have given up waiting
                        let _ = reply.send(response);
                    }
                    None => return false,
                },
            }
        }
    }
}
