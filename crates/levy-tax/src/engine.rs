//! Tax engine: wires the gate, the aggregator, and a [`TaxCalculator`] into
//! the per-interval tax computation, and records the result as payments.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use levy_core::error::LevyError;
use levy_core::params::NumericalParams;
use levy_core::traits::{RecordStore, TaxCalculator};
use levy_core::types::{Interval, IntervalId, UserId};

use crate::aggregate::{averaging_window, window_totals};
use crate::allocator::PowerLawAllocator;
use crate::gate::unsubmitted_users;
use crate::ledger;

/// Result of a tax computation for one interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaxOutcome {
    /// Tax share per user.
    Computed(BTreeMap<UserId, i64>),
    /// Some users have not reported income for the interval yet. Nothing was
    /// computed or written.
    Blocked { unsubmitted: Vec<UserId> },
}

impl TaxOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// The computed shares, or `None` when blocked.
    pub fn shares(&self) -> Option<&BTreeMap<UserId, i64>> {
        match self {
            Self::Computed(shares) => Some(shares),
            Self::Blocked { .. } => None,
        }
    }
}

/// Per-interval tax computation over any [`RecordStore`].
pub struct TaxEngine {
    params: NumericalParams,
    calculator: Box<dyn TaxCalculator>,
}

impl TaxEngine {
    /// Engine using the power-law allocator configured by `params`.
    pub fn new(params: NumericalParams) -> Self {
        Self::with_calculator(params, Box::new(PowerLawAllocator::from_params(&params)))
    }

    pub fn with_calculator(params: NumericalParams, calculator: Box<dyn TaxCalculator>) -> Self {
        Self { params, calculator }
    }

    pub fn params(&self) -> &NumericalParams {
        &self.params
    }

    /// All intervals, latest first, after extending the ledger to `today`.
    pub fn latest_intervals<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        today: NaiveDate,
    ) -> Result<Vec<Interval>, LevyError> {
        ledger::latest_intervals(store, &self.params, today)
    }

    /// Compute the tax of an interval without writing anything.
    ///
    /// Blocked when any user has not submitted income for the interval.
    /// Otherwise the interval's pool is split over the trailing-average
    /// window ending at the interval.
    pub fn preview_tax<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        interval_id: IntervalId,
    ) -> Result<TaxOutcome, LevyError> {
        let unsubmitted = unsubmitted_users(store, interval_id)?;
        if !unsubmitted.is_empty() {
            info!(interval = %interval_id, missing = unsubmitted.len(), "tax blocked: income not submitted");
            return Ok(TaxOutcome::Blocked { unsubmitted });
        }

        let interval = store.interval(interval_id)?;
        let window = averaging_window(store, interval_id, self.params.periods())?;
        // Averages share one divisor, which cancels out of the power-law
        // split, so the exact window totals are allocated directly.
        let totals = window_totals(store, &window)?;
        debug!(
            interval = %interval_id,
            window_start = %window.start,
            window_end = %window.end,
            users = totals.len(),
            pool = interval.amount,
            "allocating tax"
        );

        let shares = self.calculator.allocate(&totals, interval.amount)?;
        Ok(TaxOutcome::Computed(shares))
    }

    /// Compute the tax of an interval and replace its payments with the
    /// result.
    ///
    /// A blocked computation leaves existing payments untouched.
    pub fn compute_and_record_tax<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        interval_id: IntervalId,
    ) -> Result<TaxOutcome, LevyError> {
        let outcome = self.preview_tax(store, interval_id)?;
        if let TaxOutcome::Computed(shares) = &outcome {
            let payments = store.replace_payments(interval_id, shares)?;
            info!(
                interval = %interval_id,
                payments = payments.len(),
                total = shares.values().sum::<i64>(),
                "payments replaced"
            );
        }
        Ok(outcome)
    }
}

impl Default for TaxEngine {
    fn default() -> Self {
        Self::new(NumericalParams::default())
    }
}
