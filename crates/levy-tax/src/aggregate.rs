//! Income aggregation over intervals and trailing-average windows.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use levy_core::error::{LevyError, RecordError, TaxError};
use levy_core::traits::{IncomeFilter, RecordStore};
use levy_core::types::{
    AverageIncome, IncomeSourceId, Interval, IntervalId, SourceTotal, UserId,
};

/// Per-user, per-source income for one interval.
pub type SourceBreakdown = BTreeMap<UserId, BTreeMap<String, SourceTotal>>;

/// Income of every user broken down by income source, for incomes dated
/// inside the interval.
///
/// Sources without income in the interval are left out, and so are users
/// left with no sources.
pub fn income_by_source<S: RecordStore + ?Sized>(
    store: &S,
    interval_id: IntervalId,
) -> Result<SourceBreakdown, LevyError> {
    let interval = store.interval(interval_id)?;
    let mut breakdown = SourceBreakdown::new();

    for user in store.users()? {
        let mut per_source = BTreeMap::new();
        for source in store.income_sources(Some(&user.id))? {
            let incomes = store.incomes(&IncomeFilter::within(&interval).with_source(source.id))?;
            if incomes.is_empty() {
                continue;
            }
            let mut total = SourceTotal::default();
            for income in incomes {
                total.amount = total
                    .amount
                    .checked_add(income.amount)
                    .ok_or(TaxError::ArithmeticOverflow)?;
                total.ids.push(income.id);
            }
            per_source.insert(source.name, total);
        }
        if !per_source.is_empty() {
            breakdown.insert(user.id, per_source);
        }
    }

    Ok(breakdown)
}

/// The run of intervals a trailing average is taken over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AveragingWindow {
    /// Selected intervals, latest start first.
    pub intervals: Vec<IntervalId>,
    /// Start of the earliest selected interval.
    pub start: NaiveDate,
    /// End of the latest selected interval.
    pub end: NaiveDate,
    /// Divisor of the average. Stays at the configured period length even
    /// when fewer intervals exist.
    pub periods: u64,
}

/// Locate the averaging window for `interval_id`: the `periods` most recent
/// intervals ending on or before the target's end date.
pub fn averaging_window<S: RecordStore + ?Sized>(
    store: &S,
    interval_id: IntervalId,
    periods: u64,
) -> Result<AveragingWindow, LevyError> {
    let target = store.interval(interval_id)?;

    let mut selected: Vec<Interval> = store
        .intervals()?
        .into_iter()
        .filter(|i| i.end_date <= target.end_date)
        .collect();
    selected.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
    selected.truncate(periods.max(1) as usize);

    // The target always qualifies, so the selection is never empty.
    let (Some(latest), Some(earliest)) = (selected.first(), selected.last()) else {
        return Err(RecordError::IntervalNotFound(interval_id).into());
    };

    Ok(AveragingWindow {
        start: earliest.start_date,
        end: latest.end_date,
        intervals: selected.iter().map(|i| i.id).collect(),
        periods: periods.max(1),
    })
}

/// Sum of each user's income across all sources within the window.
///
/// Users whose total is zero are omitted.
pub fn window_totals<S: RecordStore + ?Sized>(
    store: &S,
    window: &AveragingWindow,
) -> Result<BTreeMap<UserId, u64>, LevyError> {
    let owners: HashMap<IncomeSourceId, UserId> = store
        .income_sources(None)?
        .into_iter()
        .map(|s| (s.id, s.user))
        .collect();

    let mut totals: BTreeMap<UserId, u64> = BTreeMap::new();
    for income in store.incomes(&IncomeFilter::between(window.start, window.end))? {
        let Some(user) = owners.get(&income.source) else {
            continue;
        };
        let total = totals.entry(user.clone()).or_default();
        *total = total
            .checked_add(income.amount)
            .ok_or(TaxError::ArithmeticOverflow)?;
    }
    totals.retain(|_, total| *total > 0);

    Ok(totals)
}

/// Trailing-average income per user for the window ending at `interval_id`.
///
/// The average is kept exact (`window_total / periods`). Users without
/// income in the window are absent rather than zero.
pub fn average_incomes<S: RecordStore + ?Sized>(
    store: &S,
    interval_id: IntervalId,
    periods: u64,
) -> Result<BTreeMap<UserId, AverageIncome>, LevyError> {
    let window = averaging_window(store, interval_id, periods)?;
    Ok(window_totals(store, &window)?
        .into_iter()
        .map(|(user, window_total)| {
            (
                user,
                AverageIncome {
                    window_total,
                    periods: window.periods,
                },
            )
        })
        .collect())
}
