//! Credential issuance for session participants.

use crate::clock::Clock;
use crate::errors::BillingError;
use crate::session::channel::validate_channel_name;
use crate::tokens::access_token::{self, Privilege, TokenClaims, TokenError};
use crate::tokens::participant::derive_participant_uid;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::secret::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Media role of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRole {
    /// May send and receive media.
    Publisher,
    /// May only receive media.
    Subscriber,
}

impl CredentialRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CredentialRole::Publisher => "publisher",
            CredentialRole::Subscriber => "subscriber",
        }
    }

    fn privileges(self) -> Vec<Privilege> {
        match self {
            CredentialRole::Publisher => vec![
                Privilege::JoinChannel,
                Privilege::PublishAudio,
                Privilege::PublishVideo,
                Privilege::PublishData,
            ],
            CredentialRole::Subscriber => vec![Privilege::JoinChannel],
        }
    }
}

/// Short-lived credential handed to a participant. Never persisted.
///
/// The token is held in a `SecretString`, so `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct Credential {
    pub app_id: String,
    /// Media channel; `None` for messaging credentials.
    pub channel_name: Option<String>,
    pub participant_uid: u32,
    /// Media role; `None` for messaging credentials.
    pub role: Option<CredentialRole>,
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

/// Media and messaging credentials for one party.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    pub media: Credential,
    pub messaging: Credential,
}

/// Mints signed credentials with the application certificate.
pub struct TokenIssuer {
    app_id: String,
    certificate: SecretString,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("app_id", &self.app_id)
            .field("certificate", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(app_id: String, certificate: SecretString, clock: Arc<dyn Clock>) -> Self {
        Self {
            app_id,
            certificate,
            clock,
        }
    }

    /// Issue a media credential for `participant_id` on `channel_name`.
    ///
    /// # Errors
    ///
    /// `InvalidChannelName` if the channel fails validation; `Internal` if
    /// the token cannot be built.
    pub fn issue_media_credential(
        &self,
        channel_name: &str,
        participant_id: &str,
        role: CredentialRole,
        ttl: Duration,
    ) -> Result<Credential, BillingError> {
        validate_channel_name(channel_name)?;

        let uid = derive_participant_uid(participant_id);
        let (token, expires_at) =
            self.mint(Some(channel_name.to_string()), uid, role.privileges(), ttl)?;

        debug!(
            target: "billing.tokens",
            channel = %channel_name,
            participant_uid = uid,
            role = role.as_str(),
            expires_at = %expires_at,
            "Issued media credential"
        );

        Ok(Credential {
            app_id: self.app_id.clone(),
            channel_name: Some(channel_name.to_string()),
            participant_uid: uid,
            role: Some(role),
            token,
            expires_at,
        })
    }

    /// Issue a messaging credential, not bound to any media channel.
    ///
    /// # Errors
    ///
    /// `Internal` if the token cannot be built.
    pub fn issue_messaging_credential(
        &self,
        participant_id: &str,
        ttl: Duration,
    ) -> Result<Credential, BillingError> {
        let uid = derive_participant_uid(participant_id);
        let (token, expires_at) = self.mint(None, uid, vec![Privilege::MessagingLogin], ttl)?;

        debug!(
            target: "billing.tokens",
            participant_uid = uid,
            expires_at = %expires_at,
            "Issued messaging credential"
        );

        Ok(Credential {
            app_id: self.app_id.clone(),
            channel_name: None,
            participant_uid: uid,
            role: None,
            token,
            expires_at,
        })
    }

    /// Issue both credentials a party needs to join a session.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue_media_credential`].
    pub fn issue_party_credentials(
        &self,
        channel_name: &str,
        participant_id: &str,
        role: CredentialRole,
        ttl: Duration,
    ) -> Result<CredentialSet, BillingError> {
        Ok(CredentialSet {
            media: self.issue_media_credential(channel_name, participant_id, role, ttl)?,
            messaging: self.issue_messaging_credential(participant_id, ttl)?,
        })
    }

    /// Verify a token issued by this issuer against the current time.
    ///
    /// # Errors
    ///
    /// See [`access_token::verify`].
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        access_token::verify(
            token,
            self.certificate.expose_secret().as_bytes(),
            self.clock.now().timestamp(),
        )
    }

    fn mint(
        &self,
        channel: Option<String>,
        uid: u32,
        privileges: Vec<Privilege>,
        ttl: Duration,
    ) -> Result<(SecretString, DateTime<Utc>), BillingError> {
        let issued_at = self.clock.now();
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| BillingError::Internal("credential ttl out of range".to_string()))?;

        let claims = TokenClaims {
            app_id: self.app_id.clone(),
            channel,
            uid,
            privileges,
            issued_at: issued_at.timestamp(),
            expires_at: expires_at.timestamp(),
            salt: access_token::random_salt().map_err(|e| BillingError::Internal(e.to_string()))?,
        };

        let token = access_token::sign(&claims, self.certificate.expose_secret().as_bytes())
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        Ok((SecretString::from(token), expires_at))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    const CERT: &str = "5f1d0c8e2b7a4e6c9d3f8a1b2c4e6d8f";

    fn issuer() -> (TokenIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let issuer = TokenIssuer::new(
            "test-app".to_string(),
            SecretString::from(CERT.to_string()),
            clock.clone(),
        );
        (issuer, clock)
    }

    #[test]
    fn test_media_credential_fields() {
        let (issuer, clock) = issuer();
        let ttl = Duration::from_secs(3600);

        let credential = issuer
            .issue_media_credential("reading_1a2b3c4d", "client-1", CredentialRole::Publisher, ttl)
            .unwrap();

        assert_eq!(credential.app_id, "test-app");
        assert_eq!(credential.channel_name.as_deref(), Some("reading_1a2b3c4d"));
        assert_eq!(credential.participant_uid, derive_participant_uid("client-1"));
        assert_eq!(credential.role, Some(CredentialRole::Publisher));
        assert_eq!(
            credential.expires_at,
            clock.now() + ChronoDuration::seconds(3600)
        );

        let claims = issuer.verify(credential.token.expose_secret()).unwrap();
        assert_eq!(claims.channel.as_deref(), Some("reading_1a2b3c4d"));
        assert!(claims.privileges.contains(&Privilege::PublishVideo));
    }

    #[test]
    fn test_subscriber_cannot_publish() {
        let (issuer, _) = issuer();
        let credential = issuer
            .issue_media_credential(
                "reading_1a2b3c4d",
                "viewer",
                CredentialRole::Subscriber,
                Duration::from_secs(60),
            )
            .unwrap();

        let claims = issuer.verify(credential.token.expose_secret()).unwrap();
        assert_eq!(claims.privileges, vec![Privilege::JoinChannel]);
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let (issuer, _) = issuer();
        let result = issuer.issue_media_credential(
            "reading 1a2b",
            "client-1",
            CredentialRole::Publisher,
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(BillingError::InvalidChannelName(_))));
    }

    #[test]
    fn test_messaging_credential_has_no_channel() {
        let (issuer, _) = issuer();
        let credential = issuer
            .issue_messaging_credential("client-1", Duration::from_secs(60))
            .unwrap();

        assert!(credential.channel_name.is_none());
        assert!(credential.role.is_none());
        let claims = issuer.verify(credential.token.expose_secret()).unwrap();
        assert_eq!(claims.privileges, vec![Privilege::MessagingLogin]);
    }

    #[test]
    fn test_credential_expires_with_clock() {
        let (issuer, clock) = issuer();
        let credential = issuer
            .issue_messaging_credential("client-1", Duration::from_secs(60))
            .unwrap();

        clock.advance(Duration::from_secs(61));
        assert_eq!(
            issuer.verify(credential.token.expose_secret()),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_debug_never_shows_token_or_certificate() {
        let (issuer, _) = issuer();
        let set = issuer
            .issue_party_credentials(
                "reading_1a2b3c4d",
                "client-1",
                CredentialRole::Publisher,
                Duration::from_secs(60),
            )
            .unwrap();

        let token = set.media.token.expose_secret().to_string();
        let debug_output = format!("{set:?} {issuer:?}");
        assert!(!debug_output.contains(&token));
        assert!(!debug_output.contains(CERT));
    }
}
