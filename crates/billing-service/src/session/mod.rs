//! Session data model: lifecycle, channel naming and rates.

pub mod channel;
pub mod model;
pub mod rate_card;

pub use channel::{channel_name_for, validate_channel_name};
pub use model::{
    billable_units, cost_for_units, Session, SessionKind, SessionStatus, TranscriptMessage,
};
pub use rate_card::{validate_rate, RateCard};
