//! In-memory record store.
//!
//! [`MemoryStore`] keeps every entity in ordered maps with no persistence.
//! It backs the unit tests of the ledger algorithms; the node uses RocksDB
//! (levy-node).

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::error::{LevyError, RecordError};
use crate::params::ParamKey;
use crate::traits::{IncomeFilter, RecordStore};
use crate::types::{
    Income, IncomeId, IncomeSource, IncomeSourceId, Interval, IntervalId, Payment, PaymentId,
    User, UserId,
};

/// In-memory record store for testing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: BTreeMap<UserId, User>,
    sources: BTreeMap<IncomeSourceId, IncomeSource>,
    incomes: BTreeMap<IncomeId, Income>,
    intervals: BTreeMap<IntervalId, Interval>,
    payments: BTreeMap<PaymentId, Payment>,
    params: HashMap<ParamKey, i64>,
    /// Last id handed out, shared by all entity kinds.
    last_id: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of payment rows across all intervals.
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn require_user(&self, id: &UserId) -> Result<(), LevyError> {
        if self.users.contains_key(id) {
            Ok(())
        } else {
            Err(RecordError::UserNotFound(id.to_string()).into())
        }
    }

    fn require_interval(&self, id: IntervalId) -> Result<(), LevyError> {
        if self.intervals.contains_key(&id) {
            Ok(())
        } else {
            Err(RecordError::IntervalNotFound(id).into())
        }
    }
}

impl RecordStore for MemoryStore {
    fn users(&self) -> Result<Vec<User>, LevyError> {
        Ok(self.users.values().cloned().collect())
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>, LevyError> {
        Ok(self.users.get(id).cloned())
    }

    fn insert_user(&mut self, user: User) -> Result<(), LevyError> {
        if self.users.contains_key(&user.id) {
            return Err(RecordError::DuplicateUser(user.id.to_string()).into());
        }
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    fn delete_user(&mut self, id: &UserId) -> Result<(), LevyError> {
        self.require_user(id)?;
        let owned: Vec<IncomeSourceId> = self
            .sources
            .values()
            .filter(|s| &s.user == id)
            .map(|s| s.id)
            .collect();
        self.incomes.retain(|_, inc| !owned.contains(&inc.source));
        self.sources.retain(|_, s| &s.user != id);
        self.payments.retain(|_, p| &p.user != id);
        self.users.remove(id);
        Ok(())
    }

    fn income_sources(&self, user: Option<&UserId>) -> Result<Vec<IncomeSource>, LevyError> {
        Ok(self
            .sources
            .values()
            .filter(|s| user.is_none_or(|u| &s.user == u))
            .cloned()
            .collect())
    }

    fn insert_income_source(
        &mut self,
        user: &UserId,
        name: &str,
    ) -> Result<IncomeSource, LevyError> {
        self.require_user(user)?;
        if self.sources.values().any(|s| &s.user == user && s.name == name) {
            return Err(RecordError::DuplicateIncomeSource {
                name: name.to_string(),
                user: user.to_string(),
            }
            .into());
        }
        let source = IncomeSource {
            id: IncomeSourceId(self.next_id()),
            user: user.clone(),
            name: name.to_string(),
        };
        self.sources.insert(source.id, source.clone());
        Ok(source)
    }

    fn incomes(&self, filter: &IncomeFilter) -> Result<Vec<Income>, LevyError> {
        Ok(self
            .incomes
            .values()
            .filter(|inc| filter.matches(inc))
            .cloned()
            .collect())
    }

    fn insert_income(
        &mut self,
        source: IncomeSourceId,
        amount: u64,
        date: NaiveDate,
    ) -> Result<Income, LevyError> {
        if !self.sources.contains_key(&source) {
            return Err(RecordError::IncomeSourceNotFound(source).into());
        }
        let income = Income {
            id: IncomeId(self.next_id()),
            source,
            amount,
            date,
        };
        self.incomes.insert(income.id, income.clone());
        Ok(income)
    }

    fn delete_income(&mut self, id: IncomeId) -> Result<(), LevyError> {
        self.incomes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RecordError::IncomeNotFound(id).into())
    }

    fn intervals(&self) -> Result<Vec<Interval>, LevyError> {
        let mut all: Vec<Interval> = self.intervals.values().cloned().collect();
        all.sort_by(|a, b| b.end_date.cmp(&a.end_date).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    fn get_interval(&self, id: IntervalId) -> Result<Option<Interval>, LevyError> {
        Ok(self.intervals.get(&id).cloned())
    }

    fn insert_interval(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        amount: i64,
    ) -> Result<Interval, LevyError> {
        if end < start {
            return Err(RecordError::InvertedInterval {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }
        let interval = Interval {
            id: IntervalId(self.next_id()),
            start_date: start,
            end_date: end,
            amount,
        };
        self.intervals.insert(interval.id, interval.clone());
        Ok(interval)
    }

    fn set_interval_amount(&mut self, id: IntervalId, amount: i64) -> Result<(), LevyError> {
        let interval = self
            .intervals
            .get_mut(&id)
            .ok_or(RecordError::IntervalNotFound(id))?;
        interval.amount = amount;
        Ok(())
    }

    fn payments(&self, interval: IntervalId) -> Result<Vec<Payment>, LevyError> {
        Ok(self
            .payments
            .values()
            .filter(|p| p.interval == interval)
            .cloned()
            .collect())
    }

    fn insert_payment(
        &mut self,
        interval: IntervalId,
        user: &UserId,
        amount: i64,
    ) -> Result<Payment, LevyError> {
        self.require_interval(interval)?;
        self.require_user(user)?;
        let payment = Payment {
            id: PaymentId(self.next_id()),
            interval,
            user: user.clone(),
            amount,
        };
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    fn replace_payments(
        &mut self,
        interval: IntervalId,
        amounts: &BTreeMap<UserId, i64>,
    ) -> Result<Vec<Payment>, LevyError> {
        self.require_interval(interval)?;
        for user in amounts.keys() {
            self.require_user(user)?;
        }

        self.payments.retain(|_, p| p.interval != interval);
        let mut created = Vec::with_capacity(amounts.len());
        for (user, &amount) in amounts {
            let payment = Payment {
                id: PaymentId(self.next_id()),
                interval,
                user: user.clone(),
                amount,
            };
            self.payments.insert(payment.id, payment.clone());
            created.push(payment);
        }
        Ok(created)
    }

    fn get_param(&self, key: ParamKey) -> Result<Option<i64>, LevyError> {
        Ok(self.params.get(&key).copied())
    }

    fn set_param(&mut self, key: ParamKey, value: i64) -> Result<(), LevyError> {
        let value = key.validate(value)?;
        self.params.insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    fn user(id: &str) -> User {
        User {
            id: UserId::new(id).unwrap(),
            name: format!("User {id}"),
        }
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn duplicate_user_rejected() {
        let mut store = MemoryStore::new();
        store.insert_user(user("TEST000")).unwrap();
        let err = store.insert_user(user("TEST000")).unwrap_err();
        assert!(matches!(err, LevyError::Record(RecordError::DuplicateUser(_))));
    }

    #[test]
    fn income_source_unique_per_user() {
        let mut store = MemoryStore::new();
        store.insert_user(user("A")).unwrap();
        store.insert_user(user("B")).unwrap();
        store.insert_income_source(&uid("A"), "Job").unwrap();
        // Same name under a different user is fine.
        store.insert_income_source(&uid("B"), "Job").unwrap();
        let err = store.insert_income_source(&uid("A"), "Job").unwrap_err();
        assert!(matches!(
            err,
            LevyError::Record(RecordError::DuplicateIncomeSource { .. })
        ));
    }

    #[test]
    fn income_source_requires_user() {
        let mut store = MemoryStore::new();
        let err = store.insert_income_source(&uid("GHOST"), "Job").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn income_requires_source() {
        let mut store = MemoryStore::new();
        let err = store
            .insert_income(IncomeSourceId(99), 10, day(10, 7))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn intervals_latest_first() {
        let mut store = MemoryStore::new();
        store.insert_interval(day(10, 4), day(10, 17), 1100).unwrap();
        store.insert_interval(day(9, 6), day(9, 19), 1100).unwrap();
        store.insert_interval(day(10, 18), day(10, 31), 1100).unwrap();
        let ends: Vec<NaiveDate> = store.intervals().unwrap().iter().map(|i| i.end_date).collect();
        assert_eq!(ends, vec![day(10, 31), day(10, 17), day(9, 19)]);
        assert_eq!(store.latest_interval().unwrap().unwrap().end_date, day(10, 31));
    }

    #[test]
    fn inverted_interval_rejected() {
        let mut store = MemoryStore::new();
        assert!(store.insert_interval(day(10, 17), day(10, 4), 0).is_err());
    }

    #[test]
    fn missing_interval_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.interval(IntervalId(5)).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_user_cascades() {
        let mut store = MemoryStore::new();
        store.insert_user(user("A")).unwrap();
        store.insert_user(user("B")).unwrap();
        let src_a = store.insert_income_source(&uid("A"), "Job").unwrap();
        let src_b = store.insert_income_source(&uid("B"), "Job").unwrap();
        store.insert_income(src_a.id, 100, day(10, 7)).unwrap();
        store.insert_income(src_b.id, 200, day(10, 7)).unwrap();
        let interval = store.insert_interval(day(10, 4), day(10, 17), 1100).unwrap();
        store.insert_payment(interval.id, &uid("A"), 10).unwrap();
        store.insert_payment(interval.id, &uid("B"), 20).unwrap();

        store.delete_user(&uid("A")).unwrap();

        assert_eq!(store.users().unwrap().len(), 1);
        assert_eq!(store.income_sources(None).unwrap(), vec![src_b.clone()]);
        let incomes = store.incomes(&IncomeFilter::default()).unwrap();
        assert_eq!(incomes.len(), 1);
        assert_eq!(incomes[0].source, src_b.id);
        let payments = store.payments(interval.id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].user, uid("B"));
    }

    #[test]
    fn delete_missing_income() {
        let mut store = MemoryStore::new();
        let err = store.delete_income(IncomeId(3)).unwrap_err();
        assert!(matches!(err, LevyError::Record(RecordError::IncomeNotFound(IncomeId(3)))));
    }

    #[test]
    fn replace_payments_drops_stale_rows() {
        let mut store = MemoryStore::new();
        for id in ["A", "B", "C"] {
            store.insert_user(user(id)).unwrap();
        }
        let target = store.insert_interval(day(10, 4), day(10, 17), 1100).unwrap();
        let other = store.insert_interval(day(9, 20), day(10, 3), 1100).unwrap();
        store.insert_payment(target.id, &uid("A"), 1).unwrap();
        store.insert_payment(target.id, &uid("C"), 2).unwrap();
        store.insert_payment(other.id, &uid("C"), 3).unwrap();

        let fresh: BTreeMap<UserId, i64> =
            [(uid("A"), 700), (uid("B"), 400)].into_iter().collect();
        store.replace_payments(target.id, &fresh).unwrap();

        let rows: BTreeMap<UserId, i64> = store
            .payments(target.id)
            .unwrap()
            .into_iter()
            .map(|p| (p.user, p.amount))
            .collect();
        assert_eq!(rows, fresh);
        assert_eq!(store.payments(other.id).unwrap().len(), 1);
        assert_eq!(store.payment_count(), 3);
    }

    #[test]
    fn replace_payments_unknown_user_changes_nothing() {
        let mut store = MemoryStore::new();
        store.insert_user(user("A")).unwrap();
        let target = store.insert_interval(day(10, 4), day(10, 17), 1100).unwrap();
        store.insert_payment(target.id, &uid("A"), 5).unwrap();

        let fresh: BTreeMap<UserId, i64> =
            [(uid("A"), 700), (uid("GHOST"), 400)].into_iter().collect();
        assert!(store.replace_payments(target.id, &fresh).is_err());

        let rows = store.payments(target.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 5);
    }

    #[test]
    fn set_param_validates() {
        let mut store = MemoryStore::new();
        assert!(store.set_param(ParamKey::PowerDegree, -1).is_err());
        assert_eq!(store.get_param(ParamKey::PowerDegree).unwrap(), None);
        store.set_param(ParamKey::PowerDegree, 2).unwrap();
        assert_eq!(store.get_param(ParamKey::PowerDegree).unwrap(), Some(2));
    }
}
