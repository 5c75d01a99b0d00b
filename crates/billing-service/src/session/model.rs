//! Session record and its lifecycle state machine.
//!
//! ```text
//! Active ──end──────► Completed
//!    │  ──cancel───► Cancelled
//!    └─ ──dispute──► Disputed
//! ```
//!
//! Terminal states are immutable. Live accounting is advanced by timer ticks
//! and is advisory; final accounting is set exactly once at finalize from
//! wall-clock timestamps.

use crate::errors::BillingError;

use chrono::{DateTime, Utc};
use common::types::SessionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of interaction being metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Text,
    Voice,
    Video,
}

impl SessionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Text => "text",
            SessionKind::Voice => "voice",
            SessionKind::Video => "video",
        }
    }

    /// Whether the interaction carries audio or video.
    #[must_use]
    pub const fn uses_media(&self) -> bool {
        matches!(self, SessionKind::Voice | SessionKind::Video)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "chat" => Ok(SessionKind::Text),
            "voice" | "call" | "phone" => Ok(SessionKind::Voice),
            "video" => Ok(SessionKind::Video),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Disputed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Disputed => "disputed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Account id of the sender.
    pub sender_id: String,
    /// Message body.
    pub body: String,
    /// Time the message was sent.
    pub sent_at: DateTime<Utc>,
}

impl TranscriptMessage {
    #[must_use]
    pub fn new(sender_id: impl Into<String>, body: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            sender_id: sender_id.into(),
            body: body.into(),
            sent_at,
        }
    }
}

/// A metered interaction between a payer and a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub channel_name: String,
    pub payer_id: String,
    pub provider_id: String,
    pub kind: SessionKind,
    pub rate_per_unit: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Units counted by timer ticks (advisory).
    pub live_units: u64,
    /// `live_units * rate_per_unit` (advisory).
    pub live_cost: Decimal,
    /// Units from wall-clock elapsed time, set once at finalize.
    pub final_units: Option<u64>,
    /// Authoritative charge, set once at finalize.
    pub final_cost: Option<Decimal>,
    pub status: SessionStatus,
    /// Reason given for cancel or dispute.
    pub end_reason: Option<String>,
    /// `final_units - live_units`, recorded at finalize.
    pub live_drift_units: Option<i64>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        channel_name: String,
        payer_id: String,
        provider_id: String,
        kind: SessionKind,
        rate_per_unit: Decimal,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_name,
            payer_id,
            provider_id,
            kind,
            rate_per_unit,
            started_at,
            ended_at: None,
            live_units: 0,
            live_cost: Decimal::ZERO,
            final_units: None,
            final_cost: None,
            status: SessionStatus::Active,
            end_reason: None,
            live_drift_units: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether `account_id` is the payer or the provider.
    #[must_use]
    pub fn is_party(&self, account_id: &str) -> bool {
        self.payer_id == account_id || self.provider_id == account_id
    }

    /// Advance the live estimate by one unit.
    ///
    /// Returns `false` (and changes nothing) if the session is no longer active.
    pub(crate) fn apply_tick(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }

        let Some(units) = self.live_units.checked_add(1) else {
            return false;
        };
        let Some(cost) = Decimal::from(units).checked_mul(self.rate_per_unit) else {
            return false;
        };

        self.live_units = units;
        self.live_cost = cost;
        true
    }

    /// Move to a terminal status and compute the authoritative charge.
    ///
    /// Returns the live drift in units (`final - live`).
    ///
    /// # Errors
    ///
    /// `AlreadyEnded` if the session is terminal; `InvalidAmount` if the
    /// charge overflows. The session is unchanged on error.
    pub(crate) fn finalize(
        &mut self,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        unit: Duration,
        reason: Option<String>,
    ) -> Result<i64, BillingError> {
        if self.status.is_terminal() {
            return Err(BillingError::AlreadyEnded(self.id.to_string()));
        }
        if !status.is_terminal() {
            return Err(BillingError::Internal(
                "finalize requires a terminal status".to_string(),
            ));
        }

        let units = billable_units(self.started_at, ended_at, unit);
        let cost = cost_for_units(units, self.rate_per_unit)?;
        let drift = i64::try_from(units)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(self.live_units).unwrap_or(i64::MAX));

        self.status = status;
        self.ended_at = Some(ended_at);
        self.final_units = Some(units);
        self.final_cost = Some(cost);
        self.end_reason = reason;
        self.live_drift_units = Some(drift);

        Ok(drift)
    }
}

/// Whole billing units covering `start..end`, rounded up.
///
/// Zero elapsed time bills zero units; an end before the start is treated as
/// zero elapsed.
#[must_use]
pub fn billable_units(start: DateTime<Utc>, end: DateTime<Utc>, unit: Duration) -> u64 {
    let elapsed_ms = u64::try_from((end - start).num_milliseconds()).unwrap_or(0);
    let unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX).max(1);

    elapsed_ms.div_ceil(unit_ms)
}

/// `units * rate`.
///
/// # Errors
///
/// Returns `InvalidAmount` on overflow.
pub fn cost_for_units(units: u64, rate: Decimal) -> Result<Decimal, BillingError> {
    Decimal::from(units)
        .checked_mul(rate)
        .ok_or_else(|| BillingError::InvalidAmount(format!("{units} x {rate} overflows")))
}
