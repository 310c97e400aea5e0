//! Session Driver
//!
//! Single-writer event loop around a [`TradeSession`]. Transport events and
//! external commands arrive on two mailboxes and are applied one at a time,
//! so the ledger and the subscription state need no locks.

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::session::{LedgerSnapshot, SessionStatus, TradeSession};
use crate::application::ports::{IntentSink, ReceiptClock};
use crate::infrastructure::feed::FeedEvent;

/// Capacity of the command mailbox.
pub const COMMAND_BUFFER: usize = 32;

/// External signals for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Observe another instrument.
    ChangeInstrument(String),
    /// Close the feed for good.
    Kill,
}

/// Errors returned by [`SessionHandle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The driver has stopped.
    #[error("session driver stopped")]
    Stopped,

    /// Instrument identifier is empty.
    #[error("instrument must not be empty")]
    EmptyInstrument,

    /// The session is offline and takes no further instrument changes.
    #[error("session is offline")]
    Offline,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable access to a running session: commands in, snapshots out.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    ledger: watch::Receiver<LedgerSnapshot>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Request an instrument change.
    ///
    /// # Errors
    ///
    /// Returns an error if the instrument is blank, the session is offline
    /// or the driver has stopped.
    pub async fn change_instrument(&self, instrument: &str) -> Result<(), CommandError> {
        let instrument = instrument.trim();
        if instrument.is_empty() {
            return Err(CommandError::EmptyInstrument);
        }
        if self.status() == SessionStatus::Offline {
            return Err(CommandError::Offline);
        }
        self.send(SessionCommand::ChangeInstrument(instrument.to_string()))
            .await
    }

    /// Request the kill switch.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver has stopped.
    pub async fn kill(&self) -> Result<(), CommandError> {
        self.send(SessionCommand::Kill).await
    }

    /// Latest published ledger.
    #[must_use]
    pub fn ledger(&self) -> LedgerSnapshot {
        self.ledger.borrow().clone()
    }

    /// Latest status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver for ledger snapshots.
    #[must_use]
    pub fn watch_ledger(&self) -> watch::Receiver<LedgerSnapshot> {
        self.ledger.clone()
    }

    /// Receiver for status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CommandError::Stopped)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Applies transport events and commands to a session in arrival order.
pub struct SessionDriver<S, C> {
    session: TradeSession<S, C>,
    events: mpsc::Receiver<FeedEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: CancellationToken,
}

impl<S: IntentSink, C: ReceiptClock> SessionDriver<S, C> {
    /// Wrap `session`, returning the driver and a handle for its command mailbox.
    #[must_use]
    pub fn new(
        session: TradeSession<S, C>,
        events: mpsc::Receiver<FeedEvent>,
        shutdown: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            commands: commands_tx,
            ledger: session.subscribe_ledger(),
            status: session.subscribe_status(),
        };

        (
            Self {
                session,
                events,
                commands,
                shutdown,
            },
            handle,
        )
    }

    /// Run until shutdown or until both mailboxes are closed.
    ///
    /// Returns the session so its final state can be inspected.
    pub async fn run(mut self) -> TradeSession<S, C> {
        let mut events_open = true;
        let mut commands_open = true;

        while events_open || commands_open {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    tracing::info!("Session driver shutting down");
                    break;
                }
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.apply_command(command),
                    None => commands_open = false,
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.session.handle_event(event),
                    None => {
                        tracing::debug!("Feed event channel closed");
                        events_open = false;
                    }
                },
            }
        }

        self.session
    }

    fn apply_command(&mut self, command: SessionCommand) {
        tracing::debug!(?command, "Applying session command");
        match command {
            SessionCommand::ChangeInstrument(instrument) => {
                self.session.on_instrument_change(&instrument);
            }
            SessionCommand::Kill => {
                self.session.kill();
            }
        }
    }
}
