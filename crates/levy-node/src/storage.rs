//! RocksDB-backed persistent record store.
//!
//! Implements [`RecordStore`] using one column family per entity plus
//! parameters and metadata. Every multi-key mutation (cascading deletes,
//! payment replacement, id allocation alongside an insert) goes through a
//! single [`WriteBatch`], so readers never see a half-applied change.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;

use levy_core::error::{LevyError, RecordError};
use levy_core::params::ParamKey;
use levy_core::traits::{IncomeFilter, RecordStore};
use levy_core::types::{
    Income, IncomeId, IncomeSource, IncomeSourceId, Interval, IntervalId, Payment, PaymentId,
    User, UserId,
};

// --- Column family names ---

const CF_USERS: &str = "users";
const CF_INCOME_SOURCES: &str = "income_sources";
const CF_INCOMES: &str = "incomes";
const CF_INTERVALS: &str = "intervals";
const CF_PAYMENTS: &str = "payments";
const CF_PARAMS: &str = "params";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_USERS,
    CF_INCOME_SOURCES,
    CF_INCOMES,
    CF_INTERVALS,
    CF_PAYMENTS,
    CF_PARAMS,
    CF_METADATA,
];

// --- Metadata keys ---

const META_LAST_ID: &[u8] = b"last_id";

fn storage_err(e: impl ToString) -> LevyError {
    LevyError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LevyError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(storage_err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LevyError> {
    let (value, _) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
    Ok(value)
}

/// Payment key: interval id (BE) || payment id (BE), so one interval's
/// payments form a contiguous prefix range.
fn payment_key(interval: IntervalId, payment: PaymentId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&interval.to_key());
    key[8..16].copy_from_slice(&payment.to_key());
    key
}

/// RocksDB-backed persistent record store.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LevyError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;

        tracing::info!(path = %path.as_ref().display(), "record store opened");
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), LevyError> {
        self.db.flush().map_err(storage_err)
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, LevyError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LevyError::Storage(format!("missing column family: {name}")))
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, LevyError> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every value of a column family, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>, LevyError> {
        let cf = self.cf_handle(cf)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Keys and decoded values of the payments of one interval.
    fn interval_payments(
        &self,
        interval: IntervalId,
    ) -> Result<Vec<(Box<[u8]>, Payment)>, LevyError> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let prefix = interval.to_key();
        let mut out = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item.map_err(storage_err)?;
            // Without a prefix extractor the iterator runs past the prefix.
            if !key.starts_with(&prefix) {
                break;
            }
            out.push((key, decode(&value)?));
        }
        Ok(out)
    }

    /// Last id handed out, 0 on a fresh store.
    fn last_id(&self) -> Result<u64, LevyError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, META_LAST_ID).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LevyError::Storage("invalid metadata value length".into()))?;
                Ok(u64::from_le_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Reserve `count` consecutive ids, recording the new high-water mark
    /// in `batch`. Returns the first reserved id.
    fn reserve_ids(&self, batch: &mut WriteBatch, count: u64) -> Result<u64, LevyError> {
        let last = self.last_id()?;
        let new_last = last
            .checked_add(count)
            .ok_or_else(|| LevyError::Storage("id space exhausted".into()))?;
        batch.put_cf(self.cf_handle(CF_METADATA)?, META_LAST_ID, new_last.to_le_bytes());
        Ok(last + 1)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), LevyError> {
        self.db.write(batch).map_err(storage_err)
    }

    fn require_user(&self, id: &UserId) -> Result<(), LevyError> {
        if self.get_user(id)?.is_none() {
            return Err(RecordError::UserNotFound(id.to_string()).into());
        }
        Ok(())
    }

    fn require_interval(&self, id: IntervalId) -> Result<(), LevyError> {
        self.interval(id).map(|_| ())
    }
}

impl RecordStore for RocksStore {
    fn users(&self) -> Result<Vec<User>, LevyError> {
        self.scan(CF_USERS)
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>, LevyError> {
        self.get(CF_USERS, id.as_str().as_bytes())
    }

    fn insert_user(&mut self, user: User) -> Result<(), LevyError> {
        if self.get_user(&user.id)?.is_some() {
            return Err(RecordError::DuplicateUser(user.id.to_string()).into());
        }
        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .put_cf(cf, user.id.as_str().as_bytes(), encode(&user)?)
            .map_err(storage_err)
    }

    fn delete_user(&mut self, id: &UserId) -> Result<(), LevyError> {
        self.require_user(id)?;

        let owned: Vec<IncomeSource> = self.income_sources(Some(id))?;
        let owned_ids: Vec<IncomeSourceId> = owned.iter().map(|s| s.id).collect();
        let incomes: Vec<Income> = self.scan(CF_INCOMES)?;

        let mut batch = WriteBatch::default();
        let cf_incomes = self.cf_handle(CF_INCOMES)?;
        for income in incomes.iter().filter(|i| owned_ids.contains(&i.source)) {
            batch.delete_cf(cf_incomes, income.id.to_key());
        }
        let cf_sources = self.cf_handle(CF_INCOME_SOURCES)?;
        for source in &owned {
            batch.delete_cf(cf_sources, source.id.to_key());
        }
        let cf_payments = self.cf_handle(CF_PAYMENTS)?;
        for item in self.db.iterator_cf(cf_payments, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let payment: Payment = decode(&value)?;
            if &payment.user == id {
                batch.delete_cf(cf_payments, key);
            }
        }
        batch.delete_cf(self.cf_handle(CF_USERS)?, id.as_str().as_bytes());

        self.write(batch)?;
        tracing::info!(user = %id, sources = owned.len(), "user deleted");
        Ok(())
    }

    fn income_sources(&self, user: Option<&UserId>) -> Result<Vec<IncomeSource>, LevyError> {
        let all: Vec<IncomeSource> = self.scan(CF_INCOME_SOURCES)?;
        Ok(all
            .into_iter()
            .filter(|s| user.is_none_or(|u| &s.user == u))
            .collect())
    }

    fn insert_income_source(
        &mut self,
        user: &UserId,
        name: &str,
    ) -> Result<IncomeSource, LevyError> {
        self.require_user(user)?;
        if self.income_sources(Some(user))?.iter().any(|s| s.name == name) {
            return Err(RecordError::DuplicateIncomeSource {
                name: name.to_string(),
                user: user.to_string(),
            }
            .into());
        }

        let mut batch = WriteBatch::default();
        let source = IncomeSource {
            id: IncomeSourceId(self.reserve_ids(&mut batch, 1)?),
            user: user.clone(),
            name: name.to_string(),
        };
        batch.put_cf(self.cf_handle(CF_INCOME_SOURCES)?, source.id.to_key(), encode(&source)?);
        self.write(batch)?;
        Ok(source)
    }

    fn incomes(&self, filter: &IncomeFilter) -> Result<Vec<Income>, LevyError> {
        let all: Vec<Income> = self.scan(CF_INCOMES)?;
        Ok(all.into_iter().filter(|i| filter.matches(i)).collect())
    }

    fn insert_income(
        &mut self,
        source: IncomeSourceId,
        amount: u64,
        date: NaiveDate,
    ) -> Result<Income, LevyError> {
        if self
            .get::<IncomeSource>(CF_INCOME_SOURCES, &source.to_key())?
            .is_none()
        {
            return Err(RecordError::IncomeSourceNotFound(source).into());
        }

        let mut batch = WriteBatch::default();
        let income = Income {
            id: IncomeId(self.reserve_ids(&mut batch, 1)?),
            source,
            amount,
            date,
        };
        batch.put_cf(self.cf_handle(CF_INCOMES)?, income.id.to_key(), encode(&income)?);
        self.write(batch)?;
        Ok(income)
    }

    fn delete_income(&mut self, id: IncomeId) -> Result<(), LevyError> {
        if self.get::<Income>(CF_INCOMES, &id.to_key())?.is_none() {
            return Err(RecordError::IncomeNotFound(id).into());
        }
        let cf = self.cf_handle(CF_INCOMES)?;
        self.db.delete_cf(cf, id.to_key()).map_err(storage_err)
    }

    fn intervals(&self) -> Result<Vec<Interval>, LevyError> {
        let mut all: Vec<Interval> = self.scan(CF_INTERVALS)?;
        all.sort_by(|a, b| b.end_date.cmp(&a.end_date).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    fn get_interval(&self, id: IntervalId) -> Result<Option<Interval>, LevyError> {
        self.get(CF_INTERVALS, &id.to_key())
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

        let mut batch = WriteBatch::default();
        let interval = Interval {
            id: IntervalId(self.reserve_ids(&mut batch, 1)?),
            start_date: start,
            end_date: end,
            amount,
        };
        batch.put_cf(self.cf_handle(CF_INTERVALS)?, interval.id.to_key(), encode(&interval)?);
        self.write(batch)?;
        Ok(interval)
    }

    fn set_interval_amount(&mut self, id: IntervalId, amount: i64) -> Result<(), LevyError> {
        let mut interval = self.interval(id)?;
        interval.amount = amount;
        let cf = self.cf_handle(CF_INTERVALS)?;
        self.db
            .put_cf(cf, id.to_key(), encode(&interval)?)
            .map_err(storage_err)
    }

    fn payments(&self, interval: IntervalId) -> Result<Vec<Payment>, LevyError> {
        Ok(self
            .interval_payments(interval)?
            .into_iter()
            .map(|(_, p)| p)
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

        let mut batch = WriteBatch::default();
        let payment = Payment {
            id: PaymentId(self.reserve_ids(&mut batch, 1)?),
            interval,
            user: user.clone(),
            amount,
        };
        batch.put_cf(
            self.cf_handle(CF_PAYMENTS)?,
            payment_key(interval, payment.id),
            encode(&payment)?,
        );
        self.write(batch)?;
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

        let cf = self.cf_handle(CF_PAYMENTS)?;
        let mut batch = WriteBatch::default();
        let stale = self.interval_payments(interval)?;
        for (key, _) in &stale {
            batch.delete_cf(cf, key);
        }

        let first_id = self.reserve_ids(&mut batch, amounts.len() as u64)?;
        let mut created = Vec::with_capacity(amounts.len());
        for (offset, (user, &amount)) in amounts.iter().enumerate() {
            let payment = Payment {
                id: PaymentId(first_id + offset as u64),
                interval,
                user: user.clone(),
                amount,
            };
            batch.put_cf(cf, payment_key(interval, payment.id), encode(&payment)?);
            created.push(payment);
        }

        self.write(batch)?;
        tracing::debug!(
            interval = %interval,
            removed = stale.len(),
            created = created.len(),
            "payments replaced"
        );
        Ok(created)
    }

    fn get_param(&self, key: ParamKey) -> Result<Option<i64>, LevyError> {
        let cf = self.cf_handle(CF_PARAMS)?;
        match self.db.get_cf(cf, key.as_str()).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LevyError::Storage(format!("invalid value length for {key}")))?;
                Ok(Some(i64::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn set_param(&mut self, key: ParamKey, value: i64) -> Result<(), LevyError> {
        let value = key.validate(value)?;
        let cf = self.cf_handle(CF_PARAMS)?;
        self.db
            .put_cf(cf, key.as_str(), value.to_le_bytes())
            .map_err(storage_err)
    }
}
