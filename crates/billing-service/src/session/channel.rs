//! Channel naming for media sessions.

use crate::errors::BillingError;

use common::types::SessionId;

/// Prefix applied to every session channel.
pub const CHANNEL_PREFIX: &str = "reading_";

/// Maximum channel name length accepted by the media provider.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 64;

/// Derive the media channel name for a session.
///
/// `reading_` followed by the 32-hex-digit session id: unique per session and
/// always inside the accepted alphabet.
#[must_use]
pub fn channel_name_for(session_id: &SessionId) -> String {
    format!("{CHANNEL_PREFIX}{}", session_id.simple())
}

/// Check a channel name against `^[A-Za-z0-9_]{1,64}$`.
///
/// # Errors
///
/// Returns `InvalidChannelName` if the name is empty, too long, or contains
/// characters outside the alphabet.
pub fn validate_channel_name(name: &str) -> Result<(), BillingError> {
    if name.is_empty() {
        return Err(BillingError::InvalidChannelName(
            "channel name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err(BillingError::InvalidChannelName(format!(
            "channel name exceeds {MAX_CHANNEL_NAME_LENGTH} characters"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(BillingError::InvalidChannelName(
            "channel name may only contain letters, digits and underscores".to_string(),
        ));
    }

    Ok(())
}
