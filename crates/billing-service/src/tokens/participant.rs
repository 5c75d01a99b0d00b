//! Numeric participant identity.
//!
//! Media providers address participants by a non-zero 32-bit integer. Account
//! ids are opaque strings, so the numeric id is derived from them:
//!
//! - if the account id ends in at least 8 ASCII hex digits (UUIDs, hex
//!   object ids), the last 8 digits are read as a big-endian `u32`;
//! - otherwise the whole id is hashed with 32-bit FNV-1a.
//!
//! `0` is reserved by media providers ("assign one for me") and is mapped
//! to `1`.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Derive the numeric participant id for an account id. Pure and deterministic.
#[must_use]
pub fn derive_participant_uid(account_id: &str) -> u32 {
    let uid = hex_suffix(account_id).unwrap_or_else(|| fnv1a_32(account_id.as_bytes()));
    if uid == 0 {
        1
    } else {
        uid
    }
}

fn hex_suffix(account_id: &str) -> Option<u32> {
    let start = account_id.len().checked_sub(8)?;
    let suffix = account_id.get(start..)?;
    if !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(suffix, 16).ok()
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_suffix_is_used_directly() {
        assert_eq!(
            derive_participant_uid("0f8fad5b-d9cb-469f-a165-70867728950e"),
            0x7728_950e
        );
    }

    #[test]
    fn test_non_hex_ids_are_hashed() {
        // FNV-1a reference value for "a".
        assert_eq!(derive_participant_uid("a"), 0xe40c_292c);
        assert_ne!(
            derive_participant_uid("reader-jane"),
            derive_participant_uid("reader-john")
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let id = "client:42:alice@example.com";
        assert_eq!(derive_participant_uid(id), derive_participant_uid(id));
    }

    #[test]
    fn test_zero_is_never_returned() {
        assert_eq!(derive_participant_uid("user-00000000"), 1);
    }

    #[test]
    fn test_short_and_multibyte_ids() {
        // Shorter than the suffix; hashed.
        assert_ne!(derive_participant_uid("abc"), 0);
        // Slicing inside a multibyte character falls back to hashing.
        assert_ne!(derive_participant_uid("ünïcödé-ïd"), 0);
        assert_ne!(derive_participant_uid(""), 0);
    }
}
