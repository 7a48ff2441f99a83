//! Ledger-wide totals: all income, all payments, and both summed per
//! interval.

use std::collections::BTreeMap;

use levy_core::error::{LevyError, TaxError};
use levy_core::traits::{IncomeFilter, RecordStore};
use levy_core::types::IntervalId;

/// Sum of every income record.
pub fn total_income<S: RecordStore + ?Sized>(store: &S) -> Result<u64, LevyError> {
    store
        .incomes(&IncomeFilter::default())?
        .iter()
        .try_fold(0u64, |acc, income| acc.checked_add(income.amount))
        .ok_or_else(|| TaxError::ArithmeticOverflow.into())
}

/// Sum of every payment across all intervals.
pub fn total_paid<S: RecordStore + ?Sized>(store: &S) -> Result<i64, LevyError> {
    let mut total = 0i64;
    for amount in total_tax_by_interval(store)?.into_values() {
        total = total
            .checked_add(amount)
            .ok_or(TaxError::ArithmeticOverflow)?;
    }
    Ok(total)
}

/// Income dated inside each interval. Every interval is present, with zero
/// when nothing was reported.
pub fn total_income_by_interval<S: RecordStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<IntervalId, u64>, LevyError> {
    let mut totals = BTreeMap::new();
    for interval in store.intervals()? {
        let total = store
            .incomes(&IncomeFilter::within(&interval))?
            .iter()
            .try_fold(0u64, |acc, income| acc.checked_add(income.amount))
            .ok_or(TaxError::ArithmeticOverflow)?;
        totals.insert(interval.id, total);
    }
    Ok(totals)
}

/// Recorded payments summed per interval. Every interval is present, with
/// zero when no tax was recorded.
pub fn total_tax_by_interval<S: RecordStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<IntervalId, i64>, LevyError> {
    let mut totals = BTreeMap::new();
    for interval in store.intervals()? {
        let total = store
            .payments(interval.id)?
            .iter()
            .try_fold(0i64, |acc, payment| acc.checked_add(payment.amount))
            .ok_or(TaxError::ArithmeticOverflow)?;
        totals.insert(interval.id, total);
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use levy_core::store::MemoryStore;
    use levy_core::types::{IncomeSourceId, User, UserId};

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn add_user(store: &mut MemoryStore, id: &str) -> IncomeSourceId {
        store
            .insert_user(User {
                id: uid(id),
                name: id.to_string(),
            })
            .unwrap();
        store.insert_income_source(&uid(id), "Job").unwrap().id
    }

    /// Two intervals; income in both, payments in the first only.
    fn fixture() -> (MemoryStore, IntervalId, IntervalId) {
        let mut store = MemoryStore::new();
        let a = add_user(&mut store, "A");
        let b = add_user(&mut store, "B");
        let first = store.insert_interval(day(10, 4), day(10, 17), 1100).unwrap().id;
        let second = store.insert_interval(day(10, 18), day(10, 31), 1100).unwrap().id;

        store.insert_income(a, 500, day(10, 5)).unwrap();
        store.insert_income(b, 250, day(10, 17)).unwrap();
        store.insert_income(a, 100, day(10, 18)).unwrap();
        // Outside every interval: counts toward the overall total only.
        store.insert_income(b, 7, day(11, 20)).unwrap();

        store.insert_payment(first, &uid("A"), 880).unwrap();
        store.insert_payment(first, &uid("B"), 220).unwrap();
        (store, first, second)
    }

    #[test]
    fn totals_over_everything() {
        let (store, ..) = fixture();
        assert_eq!(total_income(&store).unwrap(), 857);
        assert_eq!(total_paid(&store).unwrap(), 1100);
    }

    #[test]
    fn income_per_interval() {
        let (store, first, second) = fixture();
        let got = total_income_by_interval(&store).unwrap();
        assert_eq!(got, BTreeMap::from([(first, 750), (second, 100)]));
    }

    #[test]
    fn tax_per_interval_zero_filled() {
        let (store, first, second) = fixture();
        let got = total_tax_by_interval(&store).unwrap();
        assert_eq!(got, BTreeMap::from([(first, 1100), (second, 0)]));
    }

    #[test]
    fn empty_store_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(total_income(&store).unwrap(), 0);
        assert_eq!(total_paid(&store).unwrap(), 0);
        assert!(total_income_by_interval(&store).unwrap().is_empty());
        assert!(total_tax_by_interval(&store).unwrap().is_empty());
    }

    #[test]
    fn negative_payments_net_out() {
        let (mut store, _, second) = fixture();
        store.insert_payment(second, &uid("A"), -100).unwrap();
        assert_eq!(total_paid(&store).unwrap(), 1000);
        assert_eq!(total_tax_by_interval(&store).unwrap()[&second], -100);
    }

    #[test]
    fn income_overflow_is_error() {
        let mut store = MemoryStore::new();
        let a = add_user(&mut store, "A");
        store.insert_income(a, u64::MAX, day(10, 5)).unwrap();
        store.insert_income(a, 1, day(10, 6)).unwrap();
        assert!(matches!(
            total_income(&store).unwrap_err(),
            LevyError::Tax(TaxError::ArithmeticOverflow)
        ));
    }
}
