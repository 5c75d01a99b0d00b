//! Recording live-estimate observer.

use billing_service::actors::LiveEstimateObserver;
use billing_service::session::Session;
use std::sync::Mutex;

/// Observer that records every snapshot it receives.
///
/// A failing observer still records, then returns an error.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<Session>>,
    fail: bool,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer whose every notification fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Snapshots received so far.
    pub fn snapshots(&self) -> Vec<Session> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LiveEstimateObserver for RecordingObserver {
    async fn on_live_estimate(&self, session: &Session) -> anyhow::Result<()> {
        self.snapshots.lock().unwrap().push(session.clone());
        if self.fail {
            anyhow::bail!("observer configured to fail");
        }
        Ok(())
    }
}
