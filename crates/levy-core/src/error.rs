//! Error types for the levy ledger.
use thiserror::Error;

use crate::types::{IncomeId, IncomeSourceId, IntervalId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("user not found: {0}")] UserNotFound(String),
    #[error("income source not found: {0}")] IncomeSourceNotFound(IncomeSourceId),
    #[error("income not found: {0}")] IncomeNotFound(IncomeId),
    #[error("interval not found: {0}")] IntervalNotFound(IntervalId),
    #[error("duplicate user: {0}")] DuplicateUser(String),
    #[error("duplicate income source {name:?} for user {user}")] DuplicateIncomeSource { name: String, user: String },
    #[error("invalid user id: {0:?}")] InvalidUserId(String),
    #[error("interval ends before it starts: {start} > {end}")] InvertedInterval { start: String, end: String },
    #[error("interval dates out of range near {0}")] DateOutOfRange(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown parameter: {0}")] UnknownKey(String),
    #[error("parameter {key} is not an integer: {value:?}")] NotAnInteger { key: String, value: String },
    #[error("parameter {key} out of range: {value} not in {min}..={max}")] OutOfRange { key: String, value: i64, min: i64, max: i64 },
    #[error("config source: {0}")] Source(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug)]
pub enum LevyError {
    #[error(transparent)] Record(#[from] RecordError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Tax(#[from] TaxError),
    #[error("storage: {0}")] Storage(String),
}

impl LevyError {
    /// Whether this error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Record(
                RecordError::UserNotFound(_)
                    | RecordError::IncomeSourceNotFound(_)
                    | RecordError::IncomeNotFound(_)
                    | RecordError::IntervalNotFound(_)
            )
        )
    }
}
