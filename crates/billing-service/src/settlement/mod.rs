//! Revenue settlement: commission split and provider earnings.

pub mod earnings;
pub mod splitter;

pub use earnings::{EarningsLedger, ProviderEarnings};
pub use splitter::{split, CommissionPolicy, SettlementSplit};
