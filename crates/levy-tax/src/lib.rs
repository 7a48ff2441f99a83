//! # levy-tax: Income averaging and power-law tax allocation.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! - **Interval ledger** ([`ledger`]): contiguous 14-day intervals, extended
//!   forward on demand with the configured default pool.
//! - **Income aggregation** ([`aggregate`]): per-source breakdowns and exact
//!   trailing averages over the most recent intervals.
//! - **Submission gate** ([`gate`]): every user must report income for the
//!   interval before its tax can be computed.
//! - **Power-law allocation** ([`allocator`]): shares proportional to
//!   `income^(p + 1)`, rounded half to even.
//! - **Metrics** ([`metrics`]): total income and payments, overall and per
//!   interval.
//! - **Engine** ([`engine`]): gate, average, allocate, then atomically replace
//!   the interval's payments.

pub mod aggregate;
pub mod allocator;
pub mod engine;
pub mod gate;
pub mod ledger;
pub mod metrics;

pub use allocator::PowerLawAllocator;
pub use engine::{TaxEngine, TaxOutcome};
