//! Numerical parameters: the fixed set of integer tunables kept in the record
//! store.
//!
//! Keys are a closed set ([`ParamKey`]). Writes are validated before they
//! reach the store, so a rejected write leaves the previous value in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INTERVALS_PER_PERIOD, DEFAULT_INTERVAL_AMOUNT, DEFAULT_POWER_DEGREE,
    MAX_INTERVALS_PER_PERIOD, MAX_POWER_DEGREE,
};
use crate::error::{ConfigError, LevyError};
use crate::traits::RecordStore;

/// A known numerical-parameter key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    /// Pool amount given to intervals appended by the ledger.
    DefaultIntervalAmount,
    /// Exponent `p` of the `income^(p + 1)` allocation weight.
    PowerDegree,
    /// Number of intervals in the trailing-average window.
    IntervalsPerPeriod,
}

impl ParamKey {
    pub const ALL: [ParamKey; 3] = [
        ParamKey::DefaultIntervalAmount,
        ParamKey::PowerDegree,
        ParamKey::IntervalsPerPeriod,
    ];

    /// Storage and wire name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultIntervalAmount => "default_interval_amount",
            Self::PowerDegree => "power_degree",
            Self::IntervalsPerPeriod => "intervals_per_period",
        }
    }

    /// Value used when the store holds nothing for this key.
    pub fn default_value(&self) -> i64 {
        match self {
            Self::DefaultIntervalAmount => DEFAULT_INTERVAL_AMOUNT,
            Self::PowerDegree => DEFAULT_POWER_DEGREE,
            Self::IntervalsPerPeriod => DEFAULT_INTERVALS_PER_PERIOD,
        }
    }

    /// Inclusive range of accepted values.
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            Self::DefaultIntervalAmount => (i64::MIN, i64::MAX),
            Self::PowerDegree => (0, MAX_POWER_DEGREE),
            Self::IntervalsPerPeriod => (1, MAX_INTERVALS_PER_PERIOD),
        }
    }

    /// Check `value` against [`bounds`](Self::bounds).
    pub fn validate(&self, value: i64) -> Result<i64, ConfigError> {
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(ConfigError::OutOfRange {
                key: self.as_str().to_string(),
                value,
                min,
                max,
            });
        }
        Ok(value)
    }

    /// Parse and validate a raw textual value.
    pub fn parse_value(&self, raw: &str) -> Result<i64, ConfigError> {
        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::NotAnInteger {
                key: self.as_str().to_string(),
                value: raw.to_string(),
            })?;
        self.validate(value)
    }
}

impl FromStr for ParamKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed snapshot of every numerical parameter.
///
/// Passed explicitly into the ledger and engine instead of being looked up
/// globally.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct NumericalParams {
    pub default_interval_amount: i64,
    pub power_degree: i64,
    pub intervals_per_period: i64,
}

impl Default for NumericalParams {
    fn default() -> Self {
        Self {
            default_interval_amount: DEFAULT_INTERVAL_AMOUNT,
            power_degree: DEFAULT_POWER_DEGREE,
            intervals_per_period: DEFAULT_INTERVALS_PER_PERIOD,
        }
    }
}

impl NumericalParams {
    pub fn get(&self, key: ParamKey) -> i64 {
        match key {
            ParamKey::DefaultIntervalAmount => self.default_interval_amount,
            ParamKey::PowerDegree => self.power_degree,
            ParamKey::IntervalsPerPeriod => self.intervals_per_period,
        }
    }

    /// Set a value after validating it. On error nothing changes.
    pub fn set(&mut self, key: ParamKey, value: i64) -> Result<(), ConfigError> {
        let value = key.validate(value)?;
        match key {
            ParamKey::DefaultIntervalAmount => self.default_interval_amount = value,
            ParamKey::PowerDegree => self.power_degree = value,
            ParamKey::IntervalsPerPeriod => self.intervals_per_period = value,
        }
        Ok(())
    }

    /// Validate every field, e.g. after deserializing from a config file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in ParamKey::ALL {
            key.validate(self.get(key))?;
        }
        Ok(())
    }

    /// The allocator exponent `p`.
    pub fn degree(&self) -> u32 {
        self.power_degree.clamp(0, MAX_POWER_DEGREE) as u32
    }

    /// The averaging window length, at least one interval.
    pub fn periods(&self) -> u64 {
        self.intervals_per_period.clamp(1, MAX_INTERVALS_PER_PERIOD) as u64
    }

    /// Read all parameters from `store`, falling back to defaults for keys
    /// that were never written.
    pub fn load<S: RecordStore + ?Sized>(store: &S) -> Result<Self, LevyError> {
        let mut params = Self::default();
        for key in ParamKey::ALL {
            if let Some(value) = store.get_param(key)? {
                params.set(key, value)?;
            }
        }
        Ok(params)
    }

    /// Write every parameter to `store`.
    pub fn store<S: RecordStore + ?Sized>(&self, store: &mut S) -> Result<(), LevyError> {
        self.validate()?;
        for key in ParamKey::ALL {
            store.set_param(key, self.get(key))?;
        }
        Ok(())
    }
}

/// Validate and persist one parameter given as raw strings.
///
/// Unknown keys and non-integer values are rejected before the store is
/// touched. Returns the stored value.
pub fn write_param<S: RecordStore + ?Sized>(
    store: &mut S,
    key: &str,
    raw_value: &str,
) -> Result<i64, LevyError> {
    let key: ParamKey = key.parse()?;
    let value = key.parse_value(raw_value)?;
    store.set_param(key, value)?;
    Ok(value)
}
