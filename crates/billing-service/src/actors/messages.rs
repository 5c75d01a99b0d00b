//! Message types for the session registry actor.
//!
//! Requests carry a `tokio::sync::oneshot` sender for the reply. Timer ticks
//! arrive on a separate channel and never expect a reply.

use crate::errors::BillingError;
use crate::session::{Session, SessionKind, SessionStatus, TranscriptMessage};
use crate::tokens::CredentialSet;

use common::types::SessionId;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `SessionRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Create a session, start its timer and mint credentials for both parties.
    Start {
        request: StartRequest,
        respond_to: oneshot::Sender<Result<StartedSession, BillingError>>,
    },

    /// Move a session to a terminal status (end, cancel or dispute).
    Finalize {
        session_id: SessionId,
        status: SessionStatus,
        reason: Option<String>,
        respond_to: oneshot::Sender<Result<FinalizeOutcome, BillingError>>,
    },

    /// Append to the session transcript.
    AppendMessage {
        session_id: SessionId,
        message: TranscriptMessage,
        respond_to: oneshot::Sender<Result<(), BillingError>>,
    },

    /// Read the session transcript in insertion order.
    GetTranscript {
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<Vec<TranscriptMessage>, BillingError>>,
    },

    /// Read-only session lookup.
    Get {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<Session>>,
    },

    /// Re-issue credentials for a party of an active session.
    RefreshCredentials {
        session_id: SessionId,
        account_id: String,
        respond_to: oneshot::Sender<Result<CredentialSet, BillingError>>,
    },

    /// Evict terminal sessions that ended before `now - retention`.
    Sweep {
        retention: Duration,
        respond_to: oneshot::Sender<SweepReport>,
    },

    /// Current registry counters.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Parameters of a new session.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub payer_id: String,
    pub provider_id: String,
    pub kind: SessionKind,
    pub rate_per_unit: Decimal,
}

/// A timer tick for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub session_id: SessionId,
}

/// A newly started session with both parties' credentials.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session: Session,
    pub payer_credentials: CredentialSet,
    pub provider_credentials: CredentialSet,
}

/// Result of a finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This call moved the session to its terminal status.
    Finalized(Session),
    /// The session was already terminal; the existing record is returned unchanged.
    AlreadyFinalized(Session),
}

impl FinalizeOutcome {
    #[must_use]
    pub fn into_session(self) -> Session {
        match self {
            FinalizeOutcome::Finalized(session) | FinalizeOutcome::AlreadyFinalized(session) => {
                session
            }
        }
    }

    /// Whether this call performed the transition.
    #[must_use]
    pub fn is_first(&self) -> bool {
        matches!(self, FinalizeOutcome::Finalized(_))
    }
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions removed from the table.
    pub evicted: usize,
    /// Timers that were still running on evicted sessions.
    pub timers_stopped: usize,
}

/// Registry counters (for health checks and tests).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    pub active_sessions: usize,
    pub terminal_sessions: usize,
    pub running_timers: usize,
    pub messages_processed: u64,
}
