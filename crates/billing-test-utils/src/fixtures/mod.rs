//! Pre-configured test data.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

/// App id used by test configurations.
pub const TEST_APP_ID: &str = "test-app-id";

/// 32-byte signing certificate used by test configurations.
pub const TEST_APP_CERTIFICATE: &str = "9c1f5e2a7b3d4c6e8f0a1b2c3d4e5f60";

/// Default payer account.
pub const TEST_PAYER: &str = "client-7f3a9c21";

/// Default provider account.
pub const TEST_PROVIDER: &str = "reader-2b8e4d10";

/// Fixed start time for the manual clock.
#[must_use]
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Minimal variables for a valid configuration.
#[must_use]
pub fn base_config_vars() -> HashMap<String, String> {
    HashMap::from([
        ("BILLING_TOKEN_APP_ID".to_string(), TEST_APP_ID.to_string()),
        (
            "BILLING_TOKEN_APP_CERTIFICATE".to_string(),
            TEST_APP_CERTIFICATE.to_string(),
        ),
    ])
}

/// A payer/provider pair.
#[derive(Debug, Clone)]
pub struct TestParties {
    pub payer_id: String,
    pub provider_id: String,
}

impl TestParties {
    #[must_use]
    pub fn new(payer_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            payer_id: payer_id.into(),
            provider_id: provider_id.into(),
        }
    }
}

impl Default for TestParties {
    fn default() -> Self {
        Self::new(TEST_PAYER, TEST_PROVIDER)
    }
}
