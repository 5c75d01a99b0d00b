//! `SessionRegistryActor` - single writer of the live session table.
//!
//! Every lifecycle mutation and every timer tick is applied by this actor, one
//! at a time, so a tick can never interleave with a finalize:
//!
//! - Owns `HashMap<SessionId, ManagedSession>` (session, transcript, timer)
//! - Starts one `BillingTimer` per session; timers get child tokens of the
//!   registry's root `CancellationToken`
//! - Stops a session's timer inside the finalize handler, before replying
//! - Never awaits ledger or payment-rail I/O
//!
//! # Shutdown
//!
//! Cancelling the root token stops every timer, then the actor exits. Sessions
//! still active at that point are left as they are; nothing is finalized
//! implicitly.

use super::messages::{
    FinalizeOutcome, RegistryMessage, RegistryStatus, StartRequest, StartedSession, SweepReport,
    TimerTick,
};
use super::metrics::MailboxMonitor;
use super::timer::{notify_observer, BillingTimerHandle, LiveEstimateObserver};
use crate::clock::Clock;
use crate::errors::BillingError;
use crate::observability::metrics as billing_metrics;
use crate::session::{
    channel_name_for, validate_rate, Session, SessionStatus, TranscriptMessage,
};
use crate::tokens::{CredentialRole, CredentialSet, TokenIssuer};

use chrono::Duration as ChronoDuration;
use common::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Registry mailbox capacity.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Timer tick channel capacity.
const TICK_CHANNEL_BUFFER: usize = 1000;

/// Drift beyond this many units is logged at warn.
const DRIFT_WARN_UNITS: i64 = 1;

/// Timing parameters of the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Billing unit length; also the timer period.
    pub billing_unit: Duration,
    /// Lifetime of issued credentials.
    pub credential_ttl: Duration,
}

/// Collaborators of the registry.
pub struct RegistryDeps {
    pub issuer: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
    pub observer: Option<Arc<dyn LiveEstimateObserver>>,
}

/// Handle to the `SessionRegistryActor`.
#[derive(Clone, Debug)]
pub struct SessionRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl SessionRegistryHandle {
    /// Spawn the registry actor.
    ///
    /// Returns the handle and the actor's `JoinHandle`.
    #[must_use]
    pub fn spawn(
        settings: RegistrySettings,
        deps: RegistryDeps,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_BUFFER);

        let actor = SessionRegistryActor::new(
            receiver,
            tick_tx,
            tick_rx,
            cancel_token.clone(),
            settings,
            deps,
        );

        let task = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
            },
            task,
        )
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, BillingError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| BillingError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| BillingError::Internal(format!("response receive failed: {e}")))
    }

    /// Start a session.
    pub async fn start(&self, request: StartRequest) -> Result<StartedSession, BillingError> {
        self.request(|respond_to| RegistryMessage::Start {
            request,
            respond_to,
        })
        .await?
    }

    /// Finalize a session with a terminal status.
    pub async fn finalize(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<FinalizeOutcome, BillingError> {
        self.request(|respond_to| RegistryMessage::Finalize {
            session_id,
            status,
            reason,
            respond_to,
        })
        .await?
    }

    /// Append a transcript message.
    pub async fn append_message(
        &self,
        session_id: SessionId,
        message: TranscriptMessage,
    ) -> Result<(), BillingError> {
        self.request(|respond_to| RegistryMessage::AppendMessage {
            session_id,
            message,
            respond_to,
        })
        .await?
    }

    /// Read a transcript.
    pub async fn get_transcript(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TranscriptMessage>, BillingError> {
        self.request(|respond_to| RegistryMessage::GetTranscript {
            session_id,
            respond_to,
        })
        .await?
    }

    /// Look up a session. `Ok(None)` if it is unknown or already evicted.
    pub async fn get(&self, session_id: SessionId) -> Result<Option<Session>, BillingError> {
        self.request(|respond_to| RegistryMessage::Get {
            session_id,
            respond_to,
        })
        .await
    }

    /// Re-issue credentials for a party of an active session.
    pub async fn refresh_credentials(
        &self,
        session_id: SessionId,
        account_id: String,
    ) -> Result<CredentialSet, BillingError> {
        self.request(|respond_to| RegistryMessage::RefreshCredentials {
            session_id,
            account_id,
            respond_to,
        })
        .await?
    }

    /// Evict terminal sessions older than `retention`.
    pub async fn sweep(&self, retention: Duration) -> Result<SweepReport, BillingError> {
        self.request(|respond_to| RegistryMessage::Sweep {
            retention,
            respond_to,
        })
        .await
    }

    /// Get registry counters.
    pub async fn get_status(&self) -> Result<RegistryStatus, BillingError> {
        self.request(|respond_to| RegistryMessage::GetStatus { respond_to })
            .await
    }

    /// Cancel the actor and every timer it owns.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Internal state for a tracked session.
struct ManagedSession {
    session: Session,
    transcript: Vec<TranscriptMessage>,
    timer: Option<BillingTimerHandle>,
}

/// The `SessionRegistryActor` implementation.
pub struct SessionRegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    tick_tx: mpsc::Sender<TimerTick>,
    tick_rx: mpsc::Receiver<TimerTick>,
    cancel_token: CancellationToken,
    sessions: HashMap<SessionId, ManagedSession>,
    settings: RegistrySettings,
    issuer: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn LiveEstimateObserver>>,
    mailbox: MailboxMonitor,
}

impl SessionRegistryActor {
    fn new(
        receiver: mpsc::Receiver<RegistryMessage>,
        tick_tx: mpsc::Sender<TimerTick>,
        tick_rx: mpsc::Receiver<TimerTick>,
        cancel_token: CancellationToken,
        settings: RegistrySettings,
        deps: RegistryDeps,
    ) -> Self {
        Self {
            receiver,
            tick_tx,
            tick_rx,
            cancel_token,
            sessions: HashMap::new(),
            settings,
            issuer: deps.issuer,
            clock: deps.clock,
            observer: deps.observer,
            mailbox: MailboxMonitor::new(),
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "billing.actor.registry")]
    async fn run(mut self) {
        info!(
            target: "billing.actor.registry",
            billing_unit_secs = self.settings.billing_unit.as_secs(),
            "SessionRegistryActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "billing.actor.registry",
                        "SessionRegistryActor received cancellation signal"
                    );
                    self.stop_all_timers().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.observe_depth(self.receiver.len());
                            self.handle_message(message).await;
                            self.mailbox.record_message();
                        }
                        None => {
                            info!(
                                target: "billing.actor.registry",
                                "SessionRegistryActor channel closed, exiting"
                            );
                            self.stop_all_timers().await;
                            break;
                        }
                    }
                }

                Some(tick) = self.tick_rx.recv() => {
                    self.handle_tick(tick);
                }
            }
        }

        info!(
            target: "billing.actor.registry",
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            ticks_processed = self.mailbox.ticks_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "SessionRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Start {
                request,
                respond_to,
            } => {
                let result = self.start(request);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Finalize {
                session_id,
                status,
                reason,
                respond_to,
            } => {
                let result = self.finalize(session_id, status, reason).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::AppendMessage {
                session_id,
                message,
                respond_to,
            } => {
                let result = self.append_message(session_id, message);
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetTranscript {
                session_id,
                respond_to,
            } => {
                let result = self
                    .sessions
                    .get(&session_id)
                    .map(|managed| managed.transcript.clone())
                    .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()));
                let _ = respond_to.send(result);
            }

            RegistryMessage::Get {
                session_id,
                respond_to,
            } => {
                let session = self
                    .sessions
                    .get(&session_id)
                    .map(|managed| managed.session.clone());
                let _ = respond_to.send(session);
            }

            RegistryMessage::RefreshCredentials {
                session_id,
                account_id,
                respond_to,
            } => {
                let result = self.refresh_credentials(session_id, &account_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Sweep {
                retention,
                respond_to,
            } => {
                let report = self.sweep(retention).await;
                let _ = respond_to.send(report);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    fn start(&mut self, request: StartRequest) -> Result<StartedSession, BillingError> {
        validate_rate(request.rate_per_unit)?;

        let session_id = SessionId::new();
        let channel_name = channel_name_for(&session_id);
        let ttl = self.settings.credential_ttl;

        let payer_credentials = self.issuer.issue_party_credentials(
            &channel_name,
            &request.payer_id,
            CredentialRole::Publisher,
            ttl,
        )?;
        let provider_credentials = self.issuer.issue_party_credentials(
            &channel_name,
            &request.provider_id,
            CredentialRole::Publisher,
            ttl,
        )?;

        let timer = self.spawn_timer(session_id)?;

        let session = Session::new(
            session_id,
            channel_name,
            request.payer_id,
            request.provider_id,
            request.kind,
            request.rate_per_unit,
            self.clock.now(),
        );

        self.sessions.insert(
            session_id,
            ManagedSession {
                session: session.clone(),
                transcript: Vec::new(),
                timer: Some(timer),
            },
        );

        billing_metrics::record_session_started(session.kind.as_str());
        billing_metrics::set_sessions_active(self.active_count());

        info!(
            target: "billing.actor.registry",
            session_id = %session_id,
            channel = %session.channel_name,
            payer_id = %session.payer_id,
            provider_id = %session.provider_id,
            kind = session.kind.as_str(),
            rate_per_unit = %session.rate_per_unit,
            "Session started"
        );

        Ok(StartedSession {
            session,
            payer_credentials,
            provider_credentials,
        })
    }

    /// Start the timer for `session_id`.
    ///
    /// Fails if a running timer is already bound to the id.
    fn spawn_timer(&self, session_id: SessionId) -> Result<BillingTimerHandle, BillingError> {
        let already_running = self
            .sessions
            .get(&session_id)
            .and_then(|managed| managed.timer.as_ref())
            .is_some_and(BillingTimerHandle::is_running);

        if already_running {
            return Err(BillingError::Internal(format!(
                "billing timer already running for session {session_id}"
            )));
        }

        Ok(BillingTimerHandle::spawn(
            session_id,
            self.settings.billing_unit,
            self.tick_tx.clone(),
            self.cancel_token.child_token(),
        ))
    }

    async fn finalize(
        &mut self,
        session_id: SessionId,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<FinalizeOutcome, BillingError> {
        let ended_at = self.clock.now();
        let billing_unit = self.settings.billing_unit;

        let managed = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;

        if managed.session.status.is_terminal() {
            debug!(
                target: "billing.actor.registry",
                session_id = %session_id,
                status = managed.session.status.as_str(),
                requested = status.as_str(),
                "Session already finalized"
            );
            return Ok(FinalizeOutcome::AlreadyFinalized(managed.session.clone()));
        }

        let drift = managed
            .session
            .finalize(status, ended_at, billing_unit, reason)?;

        if let Some(mut timer) = managed.timer.take() {
            timer.stop().await;
        }

        let session = managed.session.clone();

        billing_metrics::record_session_finalized(status.as_str());
        billing_metrics::record_live_drift(drift);
        billing_metrics::set_sessions_active(self.active_count());

        if drift.abs() > DRIFT_WARN_UNITS {
            warn!(
                target: "billing.actor.registry",
                session_id = %session_id,
                live_units = session.live_units,
                final_units = ?session.final_units,
                drift_units = drift,
                "Live estimate diverged from wall-clock charge"
            );
        }

        info!(
            target: "billing.actor.registry",
            session_id = %session_id,
            status = status.as_str(),
            final_units = ?session.final_units,
            final_cost = ?session.final_cost,
            drift_units = drift,
            "Session finalized"
        );

        Ok(FinalizeOutcome::Finalized(session))
    }

    fn append_message(
        &mut self,
        session_id: SessionId,
        message: TranscriptMessage,
    ) -> Result<(), BillingError> {
        let managed = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;

        if managed.session.status.is_terminal() {
            return Err(BillingError::AlreadyEnded(session_id.to_string()));
        }

        managed.transcript.push(message);
        Ok(())
    }

    fn refresh_credentials(
        &self,
        session_id: SessionId,
        account_id: &str,
    ) -> Result<CredentialSet, BillingError> {
        let managed = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;

        if managed.session.status.is_terminal() {
            return Err(BillingError::AlreadyEnded(session_id.to_string()));
        }

        if !managed.session.is_party(account_id) {
            return Err(BillingError::PermissionDenied(
                "Account is not a party to this session".to_string(),
            ));
        }

        let credentials = self.issuer.issue_party_credentials(
            &managed.session.channel_name,
            account_id,
            CredentialRole::Publisher,
            self.settings.credential_ttl,
        )?;

        debug!(
            target: "billing.actor.registry",
            session_id = %session_id,
            "Credentials refreshed"
        );

        Ok(credentials)
    }

    fn handle_tick(&mut self, tick: TimerTick) {
        self.mailbox.record_tick();

        // Ticks for evicted or finalized sessions are expected after a race
        // with finalize and are dropped silently.
        let Some(managed) = self.sessions.get_mut(&tick.session_id) else {
            return;
        };
        if !managed.session.apply_tick() {
            return;
        }

        billing_metrics::record_timer_tick();

        debug!(
            target: "billing.timer",
            session_id = %tick.session_id,
            live_units = managed.session.live_units,
            live_cost = %managed.session.live_cost,
            "Live estimate advanced"
        );

        if let Some(observer) = &self.observer {
            notify_observer(observer, managed.session.clone());
        }
    }

    async fn sweep(&mut self, retention: Duration) -> SweepReport {
        let now = self.clock.now();
        let Some(cutoff) = ChronoDuration::from_std(retention)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return SweepReport::default();
        };

        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| {
                managed.session.status.is_terminal()
                    && managed
                        .session
                        .ended_at
                        .is_some_and(|ended_at| ended_at < cutoff)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut report = SweepReport::default();
        for session_id in expired {
            let Some(mut managed) = self.sessions.remove(&session_id) else {
                continue;
            };
            if let Some(mut timer) = managed.timer.take() {
                if timer.stop().await {
                    report.timers_stopped += 1;
                    warn!(
                        target: "billing.actor.registry",
                        session_id = %session_id,
                        "Stopped orphaned timer on evicted session"
                    );
                }
            }
            report.evicted += 1;
        }

        if report.evicted > 0 {
            billing_metrics::record_sessions_evicted(report.evicted);
            debug!(
                target: "billing.actor.registry",
                evicted = report.evicted,
                remaining = self.sessions.len(),
                "Retention sweep evicted sessions"
            );
        }

        report
    }

    fn status(&self) -> RegistryStatus {
        let active_sessions = self.active_count();
        RegistryStatus {
            active_sessions,
            terminal_sessions: self.sessions.len() - active_sessions,
            running_timers: self
                .sessions
                .values()
                .filter(|managed| {
                    managed
                        .timer
                        .as_ref()
                        .is_some_and(BillingTimerHandle::is_running)
                })
                .count(),
            messages_processed: self.mailbox.messages_processed(),
        }
    }

    fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|managed| managed.session.is_active())
            .count()
    }

    async fn stop_all_timers(&mut self) {
        let mut stopped = 0usize;
        for managed in self.sessions.values_mut() {
            if let Some(mut timer) = managed.timer.take() {
                if timer.stop().await {
                    stopped += 1;
                }
            }
        }

        debug!(
            target: "billing.actor.registry",
            timers_stopped = stopped,
            "All billing timers stopped"
        );
    }
}
