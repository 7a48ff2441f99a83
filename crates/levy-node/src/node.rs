//! Node composition.
//!
//! The [`Node`] wires a [`RecordStore`] (behind a `RwLock`) to the interval
//! ledger, the income aggregator, the submission gate, and the tax engine.
//! Parameters are read from the store on every call, so a `set_param` takes
//! effect on the next computation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, info};

use levy_core::error::LevyError;
use levy_core::params::{self, NumericalParams, ParamKey};
use levy_core::traits::RecordStore;
use levy_core::types::{
    AverageIncome, Income, IncomeId, IncomeSource, IncomeSourceId, Interval, IntervalId, Payment,
    User, UserId,
};
use levy_tax::aggregate::{self, SourceBreakdown};
use levy_tax::{gate, ledger, metrics, TaxEngine, TaxOutcome};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

/// A ledger node over any record store.
pub struct Node<S: RecordStore> {
    store: Arc<RwLock<S>>,
}

impl<S: RecordStore> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl Node<RocksStore> {
    /// Open the RocksDB store under `config.data_dir` and seed any parameter
    /// the store does not hold yet from `config.params`.
    pub fn open(config: &NodeConfig) -> Result<Self, LevyError> {
        config.params.validate()?;
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| LevyError::Storage(format!("create data dir: {e}")))?;

        let mut store = RocksStore::open(config.db_path())?;
        for key in ParamKey::ALL {
            if store.get_param(key)?.is_none() {
                store.set_param(key, config.params.get(key))?;
                debug!(key = %key, value = config.params.get(key), "seeded parameter");
            }
        }

        info!(data_dir = %config.data_dir.display(), "levy node ready");
        Ok(Self::with_store(store))
    }
}

impl<S: RecordStore> Node<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<S>> {
        Arc::clone(&self.store)
    }

    // --- Parameters ---

    /// Current parameters, defaults filled in for unset keys.
    pub fn params(&self) -> Result<NumericalParams, LevyError> {
        NumericalParams::load(&*self.store.read())
    }

    /// Current value of the parameter named `key`.
    pub fn get_param(&self, key: &str) -> Result<i64, LevyError> {
        let key: ParamKey = key.parse()?;
        Ok(self.params()?.get(key))
    }

    /// Parse, validate, and store a parameter. Returns the stored value.
    pub fn set_param(&self, key: &str, raw_value: &str) -> Result<i64, LevyError> {
        let value = params::write_param(&mut *self.store.write(), key, raw_value)?;
        info!(key, value, "parameter updated");
        Ok(value)
    }

    // --- Interval ledger ---

    /// All intervals, latest first, after extending the ledger to the local
    /// date.
    pub fn latest_intervals(&self) -> Result<Vec<Interval>, LevyError> {
        self.latest_intervals_at(chrono::Local::now().date_naive())
    }

    /// All intervals, latest first, after extending the ledger to `today`.
    pub fn latest_intervals_at(&self, today: NaiveDate) -> Result<Vec<Interval>, LevyError> {
        let mut store = self.store.write();
        let params = NumericalParams::load(&*store)?;
        ledger::latest_intervals(&mut *store, &params, today)
    }

    /// Create the first interval of the ledger. Uses the default interval
    /// amount when `amount` is `None`.
    pub fn seed_interval(
        &self,
        start: NaiveDate,
        amount: Option<i64>,
    ) -> Result<Interval, LevyError> {
        let mut store = self.store.write();
        let amount = match amount {
            Some(amount) => amount,
            None => NumericalParams::load(&*store)?.default_interval_amount,
        };
        let interval = ledger::seed_interval(&mut *store, start, amount)?;
        info!(id = %interval.id, start = %interval.start_date, amount, "interval ledger seeded");
        Ok(interval)
    }

    pub fn interval(&self, id: IntervalId) -> Result<Interval, LevyError> {
        self.store.read().interval(id)
    }

    pub fn set_interval_amount(&self, id: IntervalId, amount: i64) -> Result<(), LevyError> {
        self.store.write().set_interval_amount(id, amount)?;
        info!(interval = %id, amount, "interval amount updated");
        Ok(())
    }

    // --- Aggregation and gate ---

    pub fn income_by_source(&self, id: IntervalId) -> Result<SourceBreakdown, LevyError> {
        aggregate::income_by_source(&*self.store.read(), id)
    }

    /// Trailing-average income per user for the window ending at `id`.
    pub fn average_incomes(
        &self,
        id: IntervalId,
    ) -> Result<BTreeMap<UserId, AverageIncome>, LevyError> {
        let store = self.store.read();
        let periods = NumericalParams::load(&*store)?.periods();
        aggregate::average_incomes(&*store, id, periods)
    }

    pub fn has_all_income_submitted(&self, id: IntervalId) -> Result<bool, LevyError> {
        gate::has_all_income_submitted(&*self.store.read(), id)
    }

    pub fn unsubmitted_users(&self, id: IntervalId) -> Result<Vec<UserId>, LevyError> {
        gate::unsubmitted_users(&*self.store.read(), id)
    }

    // --- Tax ---

    /// Compute the tax of an interval without recording it.
    pub fn preview_tax(&self, id: IntervalId) -> Result<TaxOutcome, LevyError> {
        let store = self.store.read();
        let engine = TaxEngine::new(NumericalParams::load(&*store)?);
        engine.preview_tax(&*store, id)
    }

    /// Compute the tax of an interval and replace its payments.
    ///
    /// The write lock is held from the gate check to the payment write.
    pub fn compute_and_record_tax(&self, id: IntervalId) -> Result<TaxOutcome, LevyError> {
        let mut store = self.store.write();
        let engine = TaxEngine::new(NumericalParams::load(&*store)?);
        engine.compute_and_record_tax(&mut *store, id)
    }

    // --- Metrics ---

    pub fn total_income(&self) -> Result<u64, LevyError> {
        metrics::total_income(&*self.store.read())
    }

    pub fn total_paid(&self) -> Result<i64, LevyError> {
        metrics::total_paid(&*self.store.read())
    }

    pub fn total_income_by_interval(&self) -> Result<BTreeMap<IntervalId, u64>, LevyError> {
        metrics::total_income_by_interval(&*self.store.read())
    }

    pub fn total_tax_by_interval(&self) -> Result<BTreeMap<IntervalId, i64>, LevyError> {
        metrics::total_tax_by_interval(&*self.store.read())
    }

    // --- Records ---

    pub fn users(&self) -> Result<Vec<User>, LevyError> {
        self.store.read().users()
    }

    pub fn add_user(&self, id: &str, name: &str) -> Result<User, LevyError> {
        let user = User {
            id: UserId::new(id)?,
            name: name.to_string(),
        };
        self.store.write().insert_user(user.clone())?;
        info!(user = %user.id, "user added");
        Ok(user)
    }

    /// Delete a user with their income sources, incomes, and payments.
    pub fn delete_user(&self, id: &str) -> Result<(), LevyError> {
        let id = UserId::new(id)?;
        self.store.write().delete_user(&id)
    }

    pub fn add_income_source(&self, user: &str, name: &str) -> Result<IncomeSource, LevyError> {
        let user = UserId::new(user)?;
        self.store.write().insert_income_source(&user, name)
    }

    pub fn income_sources(&self, user: Option<&str>) -> Result<Vec<IncomeSource>, LevyError> {
        let user = user.map(UserId::new).transpose()?;
        self.store.read().income_sources(user.as_ref())
    }

    pub fn record_income(
        &self,
        source: IncomeSourceId,
        amount: u64,
        date: NaiveDate,
    ) -> Result<Income, LevyError> {
        let income = self.store.write().insert_income(source, amount, date)?;
        debug!(id = %income.id, source = %source, amount, %date, "income recorded");
        Ok(income)
    }

    pub fn delete_income(&self, id: IncomeId) -> Result<(), LevyError> {
        self.store.write().delete_income(id)
    }

    /// Record a single payment outside the tax computation.
    pub fn record_payment(
        &self,
        interval: IntervalId,
        user: &str,
        amount: i64,
    ) -> Result<Payment, LevyError> {
        let user = UserId::new(user)?;
        self.store.write().insert_payment(interval, &user, amount)
    }

    pub fn payments(&self, interval: IntervalId) -> Result<Vec<Payment>, LevyError> {
        self.store.read().payments(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use levy_core::error::{ConfigError, RecordError};
    use levy_core::store::MemoryStore;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    fn node() -> Node<MemoryStore> {
        Node::with_store(MemoryStore::new())
    }

    /// Users U0 and U1 with one source each and a single seeded interval.
    fn two_user_node() -> (Node<MemoryStore>, IncomeSourceId, IncomeSourceId, IntervalId) {
        let node = node();
        node.add_user("U0", "Ada").unwrap();
        node.add_user("U1", "Bob").unwrap();
        let s0 = node.add_income_source("U0", "Job").unwrap().id;
        let s1 = node.add_income_source("U1", "Job").unwrap().id;
        let interval = node.seed_interval(day(10, 4), None).unwrap();
        (node, s0, s1, interval.id)
    }

    #[test]
    fn params_default_until_set() {
        let node = node();
        assert_eq!(node.params().unwrap(), NumericalParams::default());
        assert_eq!(node.set_param("power_degree", "2").unwrap(), 2);
        assert_eq!(node.get_param("power_degree").unwrap(), 2);
    }

    #[test]
    fn set_param_rejects_bad_input() {
        let node = node();
        assert!(matches!(
            node.set_param("tax_rate", "1").unwrap_err(),
            LevyError::Config(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            node.set_param("power_degree", "two").unwrap_err(),
            LevyError::Config(ConfigError::NotAnInteger { .. })
        ));
        assert_eq!(node.get_param("power_degree").unwrap(), 1);
    }

    #[test]
    fn seed_uses_default_amount() {
        let node = node();
        node.set_param("default_interval_amount", "900").unwrap();
        let interval = node.seed_interval(day(10, 4), None).unwrap();
        assert_eq!(interval.amount, 900);
        assert_eq!(interval.end_date, day(10, 17));
    }

    #[test]
    fn latest_intervals_extends() {
        let (node, ..) = two_user_node();
        let all = node.latest_intervals_at(day(11, 1)).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].contains(day(11, 1)));
    }

    #[test]
    fn tax_blocked_then_computed() {
        let (node, s0, s1, interval) = two_user_node();
        node.record_income(s0, 500, day(10, 5)).unwrap();

        let outcome = node.compute_and_record_tax(interval).unwrap();
        assert_eq!(
            outcome,
            TaxOutcome::Blocked {
                unsubmitted: vec![UserId::new("U1").unwrap()]
            }
        );
        assert!(node.payments(interval).unwrap().is_empty());

        node.record_income(s1, 500, day(10, 6)).unwrap();
        let outcome = node.compute_and_record_tax(interval).unwrap();
        let shares = outcome.shares().unwrap();
        assert_eq!(shares.values().sum::<i64>(), 1100);
        assert_eq!(node.payments(interval).unwrap().len(), 2);
    }

    #[test]
    fn degree_change_applies_next_call() {
        let node = node();
        node.add_user("A", "A").unwrap();
        node.add_user("B", "B").unwrap();
        let a = node.add_income_source("A", "Job").unwrap().id;
        let b = node.add_income_source("B", "Job").unwrap().id;
        let interval = node.seed_interval(day(10, 4), Some(1000)).unwrap().id;
        node.record_income(a, 100, day(10, 5)).unwrap();
        node.record_income(b, 200, day(10, 5)).unwrap();

        let b_share = |node: &Node<MemoryStore>| {
            node.preview_tax(interval).unwrap().shares().unwrap()[&UserId::new("B").unwrap()]
        };
        assert_eq!(b_share(&node), 800);
        node.set_param("power_degree", "2").unwrap();
        assert_eq!(b_share(&node), 889);
    }

    #[test]
    fn average_incomes_uses_stored_period() {
        let (node, s0, s1, interval) = two_user_node();
        node.record_income(s0, 500, day(10, 5)).unwrap();
        node.record_income(s1, 123, day(10, 5)).unwrap();

        let averages = node.average_incomes(interval).unwrap();
        assert_eq!(averages[&UserId::new("U0").unwrap()].to_string(), "250");
        assert_eq!(averages[&UserId::new("U1").unwrap()].to_string(), "61.5");

        node.set_param("intervals_per_period", "1").unwrap();
        let averages = node.average_incomes(interval).unwrap();
        assert_eq!(averages[&UserId::new("U0").unwrap()].to_string(), "500");
    }

    #[test]
    fn income_by_source_and_gate() {
        let (node, s0, _, interval) = two_user_node();
        let income = node.record_income(s0, 70, day(10, 9)).unwrap();
        let breakdown = node.income_by_source(interval).unwrap();
        assert_eq!(breakdown[&UserId::new("U0").unwrap()]["Job"].amount, 70);
        assert!(!node.has_all_income_submitted(interval).unwrap());

        node.delete_income(income.id).unwrap();
        assert!(node.income_by_source(interval).unwrap().is_empty());
        assert!(node.delete_income(income.id).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_user_cascades() {
        let (node, s0, s1, interval) = two_user_node();
        node.record_income(s0, 1, day(10, 5)).unwrap();
        node.record_income(s1, 1, day(10, 5)).unwrap();
        node.compute_and_record_tax(interval).unwrap();

        node.delete_user("U0").unwrap();
        assert_eq!(node.users().unwrap().len(), 1);
        assert!(node.income_sources(Some("U0")).unwrap().is_empty());
        let payments = node.payments(interval).unwrap();
        assert!(payments.iter().all(|p| p.user.as_str() == "U1"));
        assert!(node.unsubmitted_users(interval).unwrap().is_empty());
    }

    #[test]
    fn metrics_follow_recorded_tax() {
        let (node, s0, s1, interval) = two_user_node();
        node.record_income(s0, 500, day(10, 5)).unwrap();
        node.record_income(s1, 500, day(10, 6)).unwrap();
        assert_eq!(node.total_paid().unwrap(), 0);

        node.compute_and_record_tax(interval).unwrap();
        assert_eq!(node.total_income().unwrap(), 1000);
        assert_eq!(node.total_paid().unwrap(), 1100);
        assert_eq!(node.total_income_by_interval().unwrap()[&interval], 1000);
        assert_eq!(node.total_tax_by_interval().unwrap()[&interval], 1100);
    }

    #[test]
    fn invalid_user_id_rejected() {
        let node = node();
        let err = node.add_user("TOOLONGID", "x").unwrap_err();
        assert!(matches!(err, LevyError::Record(RecordError::InvalidUserId(_))));
    }

    #[test]
    fn set_interval_amount_unknown() {
        let node = node();
        assert!(node.set_interval_amount(IntervalId(9), 5).unwrap_err().is_not_found());
    }

    #[test]
    fn record_payment_manual() {
        let (node, _, _, interval) = two_user_node();
        let payment = node.record_payment(interval, "U1", 12).unwrap();
        assert_eq!(node.payments(interval).unwrap(), vec![payment]);
    }

    #[test]
    fn clones_share_store() {
        let node = node();
        let other = node.clone();
        other.add_user("U9", "Z").unwrap();
        assert_eq!(node.users().unwrap().len(), 1);
    }
}
