//! Trait interfaces for the levy ledger.
//!
//! These traits define the contracts between crates:
//! - [`RecordStore`]: entity persistence (levy-core `MemoryStore`, levy-node `RocksStore`)
//! - [`TaxCalculator`]: tax allocation math (levy-tax implements)

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{LevyError, RecordError, TaxError};
use crate::params::ParamKey;
use crate::types::{
    Income, IncomeId, IncomeSource, IncomeSourceId, Interval, IntervalId, Payment, User, UserId,
};

/// Selection of income records. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncomeFilter {
    pub source: Option<IncomeSourceId>,
    /// Inclusive lower date bound.
    pub from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub to: Option<NaiveDate>,
}

impl IncomeFilter {
    /// Incomes dated within `[from, to]`.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            source: None,
            from: Some(from),
            to: Some(to),
        }
    }

    /// Incomes dated within the interval's own bounds.
    pub fn within(interval: &Interval) -> Self {
        Self::between(interval.start_date, interval.end_date)
    }

    pub fn with_source(mut self, source: IncomeSourceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn matches(&self, income: &Income) -> bool {
        self.source.is_none_or(|s| s == income.source)
            && self.from.is_none_or(|from| income.date >= from)
            && self.to.is_none_or(|to| income.date <= to)
    }
}

/// Mutable record storage for the ledger entities.
///
/// The ledger, aggregator, gate, and engine are written only against this
/// trait. Not thread-safe; callers wrap it in a lock when sharing.
pub trait RecordStore: Send + Sync {
    /// All users, ordered by id.
    fn users(&self) -> Result<Vec<User>, LevyError>;

    /// Look up a user. Returns `None` if unknown.
    fn get_user(&self, id: &UserId) -> Result<Option<User>, LevyError>;

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// - [`RecordError::DuplicateUser`] if the id is taken
    fn insert_user(&mut self, user: User) -> Result<(), LevyError>;

    /// Delete a user together with its income sources, their incomes, and
    /// the user's payments.
    ///
    /// # Errors
    ///
    /// - [`RecordError::UserNotFound`] if the user does not exist
    fn delete_user(&mut self, id: &UserId) -> Result<(), LevyError>;

    /// Income sources, optionally restricted to one user, ordered by id.
    fn income_sources(&self, user: Option<&UserId>) -> Result<Vec<IncomeSource>, LevyError>;

    /// Create an income source for `user`.
    ///
    /// # Errors
    ///
    /// - [`RecordError::UserNotFound`] if the user does not exist
    /// - [`RecordError::DuplicateIncomeSource`] if `(name, user)` already exists
    fn insert_income_source(&mut self, user: &UserId, name: &str)
        -> Result<IncomeSource, LevyError>;

    /// Incomes matching `filter`, ordered by id.
    fn incomes(&self, filter: &IncomeFilter) -> Result<Vec<Income>, LevyError>;

    /// Record an income.
    ///
    /// # Errors
    ///
    /// - [`RecordError::IncomeSourceNotFound`] if the source does not exist
    fn insert_income(
        &mut self,
        source: IncomeSourceId,
        amount: u64,
        date: NaiveDate,
    ) -> Result<Income, LevyError>;

    /// Delete one income record.
    ///
    /// # Errors
    ///
    /// - [`RecordError::IncomeNotFound`] if the record does not exist
    fn delete_income(&mut self, id: IncomeId) -> Result<(), LevyError>;

    /// All intervals ordered by end date, latest first. Ties are broken by
    /// id, highest first.
    fn intervals(&self) -> Result<Vec<Interval>, LevyError>;

    /// Look up an interval. Returns `None` if unknown.
    fn get_interval(&self, id: IntervalId) -> Result<Option<Interval>, LevyError>;

    /// Look up an interval, failing with [`RecordError::IntervalNotFound`].
    fn interval(&self, id: IntervalId) -> Result<Interval, LevyError> {
        self.get_interval(id)?
            .ok_or_else(|| RecordError::IntervalNotFound(id).into())
    }

    /// The interval with the greatest end date.
    ///
    /// Default implementation takes the head of [`intervals`](Self::intervals).
    fn latest_interval(&self) -> Result<Option<Interval>, LevyError> {
        Ok(self.intervals()?.into_iter().next())
    }

    /// Append an interval.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvertedInterval`] if `end < start`
    fn insert_interval(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        amount: i64,
    ) -> Result<Interval, LevyError>;

    /// Change the tax pool of an interval.
    ///
    /// # Errors
    ///
    /// - [`RecordError::IntervalNotFound`] if the interval does not exist
    fn set_interval_amount(&mut self, id: IntervalId, amount: i64) -> Result<(), LevyError>;

    /// Payments of one interval, ordered by id. Unknown intervals have none.
    fn payments(&self, interval: IntervalId) -> Result<Vec<Payment>, LevyError>;

    /// Record a single payment.
    ///
    /// # Errors
    ///
    /// - [`RecordError::IntervalNotFound`] / [`RecordError::UserNotFound`]
    fn insert_payment(
        &mut self,
        interval: IntervalId,
        user: &UserId,
        amount: i64,
    ) -> Result<Payment, LevyError>;

    /// Atomically replace every payment of `interval` with one payment per
    /// entry of `amounts`.
    ///
    /// Either the whole replacement is visible or none of it is. All
    /// referenced users and the interval are checked before anything changes.
    fn replace_payments(
        &mut self,
        interval: IntervalId,
        amounts: &BTreeMap<UserId, i64>,
    ) -> Result<Vec<Payment>, LevyError>;

    /// Stored value of a numerical parameter, `None` if never written.
    fn get_param(&self, key: ParamKey) -> Result<Option<i64>, LevyError>;

    /// Store a numerical parameter. The value is validated against
    /// [`ParamKey::bounds`] first.
    fn set_param(&mut self, key: ParamKey, value: i64) -> Result<(), LevyError>;
}

/// Allocation weight. Wide enough for `income^(p + 1)` at the largest
/// accepted degree, summed over any realistic user count, times any pool.
pub type Weight = primitive_types::U512;

/// Pure computation of tax shares from incomes.
///
/// Implemented by the power-law allocator (levy-tax).
pub trait TaxCalculator: Send + Sync {
    /// Allocation weight of a single income.
    fn weight(&self, income: u64) -> Result<Weight, TaxError>;

    /// Split `total_pool` across users in proportion to their weights.
    ///
    /// Every user in `incomes` appears in the result. If all weights are
    /// zero every share is zero. Shares are rounded independently, so their
    /// sum may differ from `total_pool` by rounding.
    fn allocate(
        &self,
        incomes: &BTreeMap<UserId, u64>,
        total_pool: i64,
    ) -> Result<BTreeMap<UserId, i64>, TaxError>;

    /// Sum of all weights.
    ///
    /// Default implementation folds [`weight`](Self::weight) with checked
    /// addition.
    fn total_weight(&self, incomes: &BTreeMap<UserId, u64>) -> Result<Weight, TaxError> {
        incomes.values().try_fold(Weight::zero(), |acc, &income| {
            acc.checked_add(self.weight(income)?)
                .ok_or(TaxError::ArithmeticOverflow)
        })
    }
}
