//! `BillingEngine` wired to in-memory collaborators.

use crate::fixtures::{base_config_vars, test_epoch, TestParties};
use crate::observer::RecordingObserver;
use billing_service::actors::{LiveEstimateObserver, StartedSession};
use billing_service::clock::ManualClock;
use billing_service::config::Config;
use billing_service::services::ledger::mock::MockLedger;
use billing_service::services::payment_rail::mock::MockPaymentRail;
use billing_service::session::SessionKind;
use billing_service::{BillingEngine, EngineCollaborators};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A running engine plus handles to its collaborators.
pub struct EngineHarness {
    pub engine: BillingEngine,
    pub ledger: Arc<MockLedger>,
    pub rail: Arc<MockPaymentRail>,
    pub clock: Arc<ManualClock>,
    pub observer: Arc<RecordingObserver>,
    pub parties: TestParties,
}

impl EngineHarness {
    #[must_use]
    pub fn builder() -> EngineHarnessBuilder {
        EngineHarnessBuilder::default()
    }

    /// Advance wall clock and tokio time together, then let tasks run.
    pub async fn elapse(&self, by: Duration) {
        self.clock.advance(by);
        tokio::time::advance(by).await;
        settle().await;
    }

    /// Advance by whole billing units, one at a time so every tick lands.
    pub async fn elapse_units(&self, units: u32, unit: Duration) {
        for _ in 0..units {
            self.elapse(unit).await;
        }
    }

    /// Start a session between the harness parties.
    pub async fn start_session(&self, kind: SessionKind, rate: Decimal) -> StartedSession {
        self.engine
            .start_session(&self.parties.payer_id, &self.parties.provider_id, kind, rate)
            .await
            .expect("session should start")
    }

    pub async fn start_text_session(&self, rate: Decimal) -> StartedSession {
        self.start_session(SessionKind::Text, rate).await
    }
}

/// Let spawned tasks run to their next await point.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Builder for [`EngineHarness`].
pub struct EngineHarnessBuilder {
    vars: HashMap<String, String>,
    ledger: MockLedger,
    rail: MockPaymentRail,
    observer: RecordingObserver,
    parties: TestParties,
}

impl Default for EngineHarnessBuilder {
    fn default() -> Self {
        Self {
            vars: base_config_vars(),
            ledger: MockLedger::new(),
            rail: MockPaymentRail::accepting(),
            observer: RecordingObserver::new(),
            parties: TestParties::default(),
        }
    }
}

impl EngineHarnessBuilder {
    /// Override a configuration variable.
    #[must_use]
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_balance(self, account_id: &str, balance: Decimal) -> Self {
        self.ledger.set_balance(account_id, balance);
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: MockLedger) -> Self {
        self.ledger = ledger;
        self
    }

    #[must_use]
    pub fn with_rail(mut self, rail: MockPaymentRail) -> Self {
        self.rail = rail;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: RecordingObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Build the engine. Must run inside a tokio runtime.
    #[must_use]
    pub fn build(self) -> EngineHarness {
        let config = Config::from_vars(&self.vars).expect("harness config should be valid");
        let ledger = Arc::new(self.ledger);
        let rail = Arc::new(self.rail);
        let clock = Arc::new(ManualClock::new(test_epoch()));
        let observer = Arc::new(self.observer);

        let engine = BillingEngine::new(
            &config,
            EngineCollaborators {
                ledger: ledger.clone(),
                payment_rail: rail.clone(),
                clock: clock.clone(),
                observer: Some(observer.clone() as Arc<dyn LiveEstimateObserver>),
            },
        );

        EngineHarness {
            engine,
            ledger,
            rail,
            clock,
            observer,
            parties: self.parties,
        }
    }
}
