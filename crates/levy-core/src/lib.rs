//! # levy-core
//! Foundation types and traits for the levy income-tax ledger.

pub mod constants;
pub mod error;
pub mod params;
pub mod store;
pub mod traits;
pub mod types;
