// Broker Session Management
// Round-robin credential rotation on a fixed poll-cycle cadence

use thiserror::Error;
use tracing::{info, warn};

use crate::config::BrokerAccount;
use crate::data::{CandleSource, DataError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No broker accounts configured")]
    NoAccounts,

    #[error("Failed to connect broker account {email}: {source}")]
    Connect {
        email: String,
        #[source]
        source: DataError,
    },
}

/// Owns the broker connection and decides which account it runs under.
pub struct SessionManager<S> {
    source: S,
    accounts: Vec<BrokerAccount>,
    active_index: usize,
    rotation_count: u32,
    max_rotation: u32,
    connected: bool,
}

impl<S: CandleSource> SessionManager<S> {
    pub fn new(
        source: S,
        accounts: Vec<BrokerAccount>,
        max_rotation: u32,
    ) -> Result<Self, SessionError> {
        if accounts.is_empty() {
            return Err(SessionError::NoAccounts);
        }

        Ok(Self {
            source,
            accounts,
            active_index: 0,
            rotation_count: 0,
            max_rotation: max_rotation.max(1),
            connected: false,
        })
    }

    /// Log in with the active account
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        let account = &self.accounts[self.active_index];
        self.connected = false;

        self.source
            .connect(account)
            .await
            .map_err(|source| SessionError::Connect {
                email: account.email.clone(),
                source,
            })?;

        self.connected = true;
        info!(
            email = %account.email,
            account = self.active_index + 1,
            of = self.accounts.len(),
            "Broker session established"
        );
        Ok(())
    }

    /// Reconnect if the last connect attempt failed
    pub async fn ensure_connected(&mut self) -> Result<(), SessionError> {
        if self.connected {
            return Ok(());
        }
        self.connect().await
    }

    /// Forget the current login, e.g. after the broker rejected the
    /// session token. The next `ensure_connected` logs in again.
    pub fn mark_disconnected(&mut self) {
        if self.connected {
            warn!(email = %self.active_account().email, "Broker session dropped");
        }
        self.connected = false;
    }

    /// Count one poll cycle. Every `max_rotation` cycles the next account
    /// takes over and the connection is re-established. Returns whether a
    /// rotation happened.
    pub async fn record_cycle(&mut self) -> Result<bool, SessionError> {
        self.rotation_count += 1;
        if self.rotation_count < self.max_rotation {
            return Ok(false);
        }

        self.rotation_count = 0;
        self.active_index = (self.active_index + 1) % self.accounts.len();
        info!(
            email = %self.accounts[self.active_index].email,
            "Rotating broker account"
        );

        if let Err(e) = self.connect().await {
            warn!(error = %e, "Reconnect after rotation failed");
            return Err(e);
        }
        Ok(true)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn active_account(&self) -> &BrokerAccount {
        &self.accounts[self.active_index]
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn rotation_count(&self) -> u32 {
        self.rotation_count
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
