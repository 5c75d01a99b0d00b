//! Signed access token format.
//!
//! ```text
//! token     = "007" || base64(signature || payload)
//! payload   = JSON-encoded TokenClaims
//! signature = HMAC-SHA256(app_certificate, payload)   (32 bytes)
//! ```
//!
//! Tokens are bearer credentials. They are never logged, and the signing
//! certificate never leaves this module except as an `hmac::Key`.

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version prefix of every token.
pub const TOKEN_VERSION: &str = "007";

/// HMAC-SHA256 output length.
const SIGNATURE_LEN: usize = 32;

/// Capability granted by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    JoinChannel,
    PublishAudio,
    PublishVideo,
    PublishData,
    MessagingLogin,
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub app_id: String,
    /// Media channel; absent for messaging tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub uid: u32,
    pub privileges: Vec<Privilege>,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
    pub salt: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token could not be built: {0}")]
    Build(String),
}

/// Generate a random salt from the system CSPRNG.
///
/// # Errors
///
/// Returns `TokenError::Build` if the CSPRNG fails.
pub fn random_salt() -> Result<u32, TokenError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes)
        .map_err(|_| TokenError::Build("random salt generation failed".to_string()))?;
    Ok(u32::from_be_bytes(bytes))
}

/// Sign `claims` with the application certificate.
///
/// # Errors
///
/// Returns `TokenError::Build` if the claims cannot be serialized.
pub fn sign(claims: &TokenClaims, certificate: &[u8]) -> Result<String, TokenError> {
    let payload =
        serde_json::to_vec(claims).map_err(|e| TokenError::Build(format!("payload: {e}")))?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, certificate);
    let tag = hmac::sign(&key, &payload);

    let mut body = Vec::with_capacity(SIGNATURE_LEN + payload.len());
    body.extend_from_slice(tag.as_ref());
    body.extend_from_slice(&payload);

    Ok(format!("{TOKEN_VERSION}{}", STANDARD.encode(body)))
}

/// Verify a token's signature (constant time) and expiry.
///
/// `now` is Unix seconds. A token is expired once `now >= expires_at`.
///
/// # Errors
///
/// `Malformed` for a wrong prefix, bad base64 or an unreadable payload;
/// `InvalidSignature` if the signature does not match; `Expired` if the
/// token is past its expiry.
pub fn verify(token: &str, certificate: &[u8], now: i64) -> Result<TokenClaims, TokenError> {
    let encoded = token
        .strip_prefix(TOKEN_VERSION)
        .ok_or_else(|| TokenError::Malformed("unsupported version".to_string()))?;

    let body = STANDARD
        .decode(encoded)
        .map_err(|_| TokenError::Malformed("invalid encoding".to_string()))?;

    let (signature, payload) = match (body.get(..SIGNATURE_LEN), body.get(SIGNATURE_LEN..)) {
        (Some(signature), Some(payload)) if !payload.is_empty() => (signature, payload),
        _ => return Err(TokenError::Malformed("token too short".to_string())),
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, certificate);
    hmac::verify(&key, payload, signature).map_err(|_| TokenError::InvalidSignature)?;

    let claims: TokenClaims = serde_json::from_slice(payload)
        .map_err(|_| TokenError::Malformed("invalid payload".to_string()))?;

    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const CERT: &[u8] = b"5f1d0c8e2b7a4e6c9d3f8a1b2c4e6d8f";

    fn claims() -> TokenClaims {
        TokenClaims {
            app_id: "app".to_string(),
            channel: Some("reading_abc".to_string()),
            uid: 42,
            privileges: vec![Privilege::JoinChannel, Privilege::PublishAudio],
            issued_at: 1_700_000_000,
            expires_at: 1_700_003_600,
            salt: 7,
        }
    }

    #[test]
    fn test_signed_token_verifies() {
        let token = sign(&claims(), CERT).unwrap();

        assert!(token.starts_with(TOKEN_VERSION));
        let verified = verify(&token, CERT, 1_700_000_001).unwrap();
        assert_eq!(verified, claims());
    }

    #[test]
    fn test_wrong_certificate_rejected() {
        let token = sign(&claims(), CERT).unwrap();

        assert_eq!(
            verify(&token, b"another-certificate-of-32-bytes!", 1_700_000_001),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign(&claims(), CERT).unwrap();
        let mut body = STANDARD.decode(token.get(3..).unwrap()).unwrap();
        let last = body.len() - 2;
        *body.get_mut(last).unwrap() ^= 0x01;
        let tampered = format!("{TOKEN_VERSION}{}", STANDARD.encode(body));

        assert_eq!(
            verify(&tampered, CERT, 1_700_000_001),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let token = sign(&claims(), CERT).unwrap();

        assert!(verify(&token, CERT, 1_700_003_599).is_ok());
        assert_eq!(
            verify(&token, CERT, 1_700_003_600),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            verify("006abc", CERT, 0),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            verify("007!!!not-base64", CERT, 0),
            Err(TokenError::Malformed(_))
        ));
        let short = format!("{TOKEN_VERSION}{}", STANDARD.encode([0u8; 16]));
        assert!(matches!(
            verify(&short, CERT, 0),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_messaging_claims_omit_channel() {
        let mut c = claims();
        c.channel = None;
        c.privileges = vec![Privilege::MessagingLogin];

        let token = sign(&c, CERT).unwrap();
        let body = STANDARD.decode(token.get(3..).unwrap()).unwrap();
        let payload = std::str::from_utf8(body.get(32..).unwrap()).unwrap();

        assert!(!payload.contains("channel"));
        assert_eq!(verify(&token, CERT, 1_700_000_001).unwrap(), c);
    }

    #[test]
    fn test_salts_vary() {
        let salts: std::collections::HashSet<u32> =
            (0..16).map(|_| random_salt().unwrap()).collect();
        assert!(salts.len() > 1);
    }
}
