//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for signing certificates, webhook
//! secrets and issued token material. `SecretString` implements `Debug` with
//! redaction, so any struct deriving `Debug` that holds one is safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IssuedToken {
//!     channel: String,
//!     token: SecretString,
//! }
//!
//! let issued = IssuedToken {
//!     channel: "reading_1a2b3c4d".to_string(),
//!     token: SecretString::from("007abc"),
//! };
//!
//! // Debug output never contains the token itself.
//! assert!(!format!("{issued:?}").contains("007abc"));
//!
//! // The value must be requested explicitly.
//! assert_eq!(issued.token.expose_secret(), "007abc");
//! ```
//!
//! Use `SecretString` for:
//! - media/messaging provider app certificates
//! - payment rail API keys and webhook signing secrets
//! - issued credential token material
//!
//! Use `SecretBox<T>` for binary key material.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("app-certificate-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("app-certificate-value"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("whsec_123");
        assert_eq!(secret.expose_secret(), "whsec_123");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct RailCredentials {
            account: String,
            api_key: SecretString,
        }

        let creds = RailCredentials {
            account: "acct_platform".to_string(),
            api_key: SecretString::from("sk_live_super_secret"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("acct_platform"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("sk_live_super_secret"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct WebhookSettings {
            endpoint: String,
            signing_secret: SecretString,
        }

        let json = r#"{"endpoint": "/hooks/rail", "signing_secret": "whsec_value"}"#;
        let settings: WebhookSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.signing_secret.expose_secret(), "whsec_value");

        let debug = format!("{settings:?}");
        assert!(!debug.contains("whsec_value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
