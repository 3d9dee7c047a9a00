//! Durable delivery ledger and the tick driver that runs reminder cycles.

pub mod driver;
pub mod ledger;

pub use driver::{run_until_cancelled, CycleRunner};
pub use ledger::{ReminderLedger, SentLedger};
