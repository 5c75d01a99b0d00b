//! Media and messaging credential issuance.

pub mod access_token;
pub mod issuer;
pub mod participant;

pub use access_token::{Privilege, TokenClaims, TokenError};
pub use issuer::{Credential, CredentialRole, CredentialSet, TokenIssuer};
pub use participant::derive_participant_uid;
