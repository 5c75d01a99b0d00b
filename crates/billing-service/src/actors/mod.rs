//! Actor model for the live session table.
//!
//! ```text
//! BillingEngine
//!   └── SessionRegistryActor (single writer, owns the session table)
//!         └── BillingTimer (one task per active session)
//! ```
//!
//! Requests use `mpsc` mailboxes with `oneshot` replies. Timers share a
//! separate tick channel into the registry.

pub mod messages;
pub mod metrics;
pub mod registry;
pub mod timer;

pub use messages::{
    FinalizeOutcome, RegistryStatus, StartRequest, StartedSession, SweepReport, TimerTick,
};
pub use registry::{RegistryDeps, RegistrySettings, SessionRegistryHandle};
pub use timer::{BillingTimerHandle, LiveEstimateObserver};
