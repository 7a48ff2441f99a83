//! Submission gate: tax for an interval may only be computed once every
//! known user has reported income inside that interval.

use std::collections::{BTreeSet, HashMap};

use levy_core::error::LevyError;
use levy_core::traits::{IncomeFilter, RecordStore};
use levy_core::types::{IncomeSourceId, IntervalId, UserId};

/// Users without a single income record dated inside the interval, sorted.
///
/// Uses the interval's own bounds, not the averaging window. A record with
/// amount zero still counts as a submission.
pub fn unsubmitted_users<S: RecordStore + ?Sized>(
    store: &S,
    interval_id: IntervalId,
) -> Result<Vec<UserId>, LevyError> {
    let interval = store.interval(interval_id)?;

    let owners: HashMap<IncomeSourceId, UserId> = store
        .income_sources(None)?
        .into_iter()
        .map(|s| (s.id, s.user))
        .collect();
    let submitted: BTreeSet<UserId> = store
        .incomes(&IncomeFilter::within(&interval))?
        .iter()
        .filter_map(|income| owners.get(&income.source).cloned())
        .collect();

    let all: BTreeSet<UserId> = store.users()?.into_iter().map(|u| u.id).collect();
    Ok(all.difference(&submitted).cloned().collect())
}

/// Whether every known user has submitted income for the interval.
pub fn has_all_income_submitted<S: RecordStore + ?Sized>(
    store: &S,
    interval_id: IntervalId,
) -> Result<bool, LevyError> {
    Ok(unsubmitted_users(store, interval_id)?.is_empty())
}
