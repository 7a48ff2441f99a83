//! Ledger entity types: users, income sources, incomes, intervals, payments.
//!
//! Income amounts are `u64` (never negative). Pool and payment amounts are
//! `i64`, matching the integer columns of the record store.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{INTERVAL_LENGTH_DAYS, USER_ID_MAX_LEN};
use crate::error::RecordError;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian key bytes, so store iteration follows id order.
            pub fn to_key(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Store-assigned identifier of an [`IncomeSource`].
    IncomeSourceId
);
record_id!(
    /// Store-assigned identifier of an [`Income`] record.
    IncomeId
);
record_id!(
    /// Store-assigned identifier of an [`Interval`].
    IntervalId
);
record_id!(
    /// Store-assigned identifier of a [`Payment`].
    PaymentId
);

/// Short fixed-format user identifier, e.g. `MAL0001`.
///
/// 1 to [`USER_ID_MAX_LEN`] ASCII alphanumeric characters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a user identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use levy_core::types::UserId;
    /// assert!(UserId::new("MAL0001").is_ok());
    /// assert!(UserId::new("TOO-LONG-ID").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self, RecordError> {
        let id = id.into();
        let well_formed = !id.is_empty()
            && id.len() <= USER_ID_MAX_LEN
            && id.bytes().all(|b| b.is_ascii_alphanumeric());
        if !well_formed {
            return Err(RecordError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member of the tax group.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// A named channel of income (e.g. a job), scoped to one user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IncomeSource {
    pub id: IncomeSourceId,
    pub user: UserId,
    pub name: String,
}

/// One reported income amount.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Income {
    pub id: IncomeId,
    pub source: IncomeSourceId,
    pub amount: u64,
    pub date: NaiveDate,
}

/// An accounting period `[start_date, end_date]` (inclusive) with its tax pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub id: IntervalId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Total tax to be shared among users for this interval.
    pub amount: i64,
}

impl Interval {
    /// Whether `date` falls inside the interval, bounds included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Bounds of the interval that directly follows this one.
    ///
    /// Fails when the successor would end past the last representable date.
    pub fn successor_bounds(&self) -> Result<(NaiveDate, NaiveDate), RecordError> {
        let span = chrono::Duration::days(INTERVAL_LENGTH_DAYS - 1);
        let start = self.end_date.checked_add_signed(chrono::Duration::days(1));
        let end = start.and_then(|start| start.checked_add_signed(span));
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(RecordError::DateOutOfRange(self.end_date.to_string())),
        }
    }
}

/// Computed tax obligation of one user for one interval.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub interval: IntervalId,
    pub user: UserId,
    pub amount: i64,
}

/// Income summed per source for one interval.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct SourceTotal {
    pub amount: u64,
    /// Ids of the income records that make up `amount`.
    pub ids: Vec<IncomeId>,
}

/// Exact trailing-average income: `window_total / periods`.
///
/// Kept as a ratio so that odd window totals are not truncated before the
/// allocator sees them.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AverageIncome {
    /// Income summed across the whole averaging window.
    pub window_total: u64,
    /// Number of intervals the total is averaged over. Never zero.
    pub periods: u64,
}

impl AverageIncome {
    pub fn value(&self) -> f64 {
        self.window_total as f64 / self.periods as f64
    }

    /// Whether the average is a whole number.
    pub fn is_whole(&self) -> bool {
        self.window_total % self.periods == 0
    }
}

impl fmt::Display for AverageIncome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.window_total / self.periods)
        } else {
            write!(f, "{}", self.value())
        }
    }
}
