//! Interval ledger: the ordered run of 14-day accounting intervals.
//!
//! The ledger grows forward lazily. Whenever the latest interval has ended
//! before `today`, enough intervals are appended back to back for one of
//! them to contain `today`. Intervals are never deleted here.

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use levy_core::constants::INTERVAL_LENGTH_DAYS;
use levy_core::error::{LevyError, RecordError};
use levy_core::params::NumericalParams;
use levy_core::traits::RecordStore;
use levy_core::types::Interval;

/// Number of intervals to append after an interval ending on `last_end` so
/// that the ledger reaches `today`.
///
/// `ceil((today - last_end) / INTERVAL_LENGTH_DAYS)`, or 0 when `today` is
/// not past `last_end`.
pub fn periods_needed(last_end: NaiveDate, today: NaiveDate) -> u64 {
    let days = (today - last_end).num_days();
    if days <= 0 {
        return 0;
    }
    (days as u64).div_ceil(INTERVAL_LENGTH_DAYS as u64)
}

/// Append intervals until the ledger covers `today`.
///
/// Each new interval starts the day after the previous end and carries
/// `default_amount`. Returns the appended intervals, oldest first. An empty
/// ledger has nothing to extend from and yields nothing.
pub fn extend_to<S: RecordStore + ?Sized>(
    store: &mut S,
    default_amount: i64,
    today: NaiveDate,
) -> Result<Vec<Interval>, LevyError> {
    let Some(mut latest) = store.latest_interval()? else {
        warn!("interval ledger is empty; nothing to extend");
        return Ok(Vec::new());
    };

    let needed = periods_needed(latest.end_date, today);
    let mut appended = Vec::new();
    for _ in 0..needed {
        let (start, end) = latest.successor_bounds()?;
        latest = store.insert_interval(start, end, default_amount)?;
        debug!(id = %latest.id, %start, %end, amount = default_amount, "appended interval");
        appended.push(latest.clone());
    }

    if !appended.is_empty() {
        info!(count = appended.len(), %today, "interval ledger extended");
    }
    Ok(appended)
}

/// All intervals, latest first, after extending the ledger to `today`.
pub fn latest_intervals<S: RecordStore + ?Sized>(
    store: &mut S,
    params: &NumericalParams,
    today: NaiveDate,
) -> Result<Vec<Interval>, LevyError> {
    extend_to(store, params.default_interval_amount, today)?;
    store.intervals()
}

/// Create the first interval of a ledger, starting on `start`.
pub fn seed_interval<S: RecordStore + ?Sized>(
    store: &mut S,
    start: NaiveDate,
    amount: i64,
) -> Result<Interval, LevyError> {
    let end = start
        .checked_add_signed(Duration::days(INTERVAL_LENGTH_DAYS - 1))
        .ok_or_else(|| RecordError::DateOutOfRange(start.to_string()))?;
    store.insert_interval(start, end, amount)
}
