//! Mailbox monitoring for the registry actor.
//!
//! | Depth | Level |
//! |-------|-------|
//! | <= 100 | Normal |
//! | 101-500 | Warning |
//! | > 500 | Critical |
//!
//! Timer ticks share the actor with lifecycle requests, so a growing mailbox
//! means live estimates and end requests are both being delayed.

use crate::observability::metrics as billing_metrics;

use tracing::{debug, warn};

/// Upper bound of the normal mailbox depth.
pub const REGISTRY_MAILBOX_NORMAL: usize = 100;

/// Upper bound of the warning mailbox depth.
pub const REGISTRY_MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub fn for_depth(depth: usize) -> Self {
        if depth > REGISTRY_MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > REGISTRY_MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Tracks queue depth and throughput of the actor that owns it.
#[derive(Debug, Default)]
pub struct MailboxMonitor {
    last_level: Option<MailboxLevel>,
    peak_depth: usize,
    messages_processed: u64,
    ticks_processed: u64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the backlog observed when a message is taken off the mailbox.
    pub fn observe_depth(&mut self, depth: usize) {
        self.peak_depth = self.peak_depth.max(depth);
        billing_metrics::set_registry_mailbox_depth(depth);

        let level = MailboxLevel::for_depth(depth);
        if self.last_level == Some(level) {
            return;
        }
        self.last_level = Some(level);

        match level {
            MailboxLevel::Critical => warn!(
                target: "billing.actor.mailbox",
                depth,
                threshold = REGISTRY_MAILBOX_WARNING,
                "Registry mailbox depth critical"
            ),
            MailboxLevel::Warning => debug!(
                target: "billing.actor.mailbox",
                depth,
                "Registry mailbox depth elevated"
            ),
            MailboxLevel::Normal => {}
        }
    }

    pub fn record_message(&mut self) {
        self.messages_processed = self.messages_processed.saturating_add(1);
    }

    pub fn record_tick(&mut self) {
        self.ticks_processed = self.ticks_processed.saturating_add(1);
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed
    }

    #[must_use]
    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(MailboxLevel::for_depth(0), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(100), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(101), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(500), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(501), MailboxLevel::Critical);
    }

    #[test]
    fn test_peak_and_counters() {
        let mut monitor = MailboxMonitor::new();

        monitor.observe_depth(3);
        monitor.observe_depth(700);
        monitor.observe_depth(1);
        monitor.record_message();
        monitor.record_message();
        monitor.record_tick();

        assert_eq!(monitor.peak_depth(), 700);
        assert_eq!(monitor.messages_processed(), 2);
        assert_eq!(monitor.ticks_processed(), 1);
    }
}
