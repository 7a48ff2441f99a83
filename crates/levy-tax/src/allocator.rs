//! Power-law tax allocator implementing the [`TaxCalculator`] trait.
//!
//! Each user's share of the pool is proportional to `income^(p + 1)`, so
//! higher earners carry disproportionately more than under a flat split.
//! All arithmetic is integer-only on 512-bit [`Weight`]s: a `u64` income
//! to the fifth power summed over users and multiplied by an `i64` pool
//! stays far below the type's range. The single division per user is
//! rounded half to even.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use levy_core::constants::{DEFAULT_POWER_DEGREE, MAX_POWER_DEGREE};
use levy_core::error::TaxError;
use levy_core::params::NumericalParams;
use levy_core::traits::{TaxCalculator, Weight};
use levy_core::types::UserId;

/// The production tax calculator.
///
/// `degree` is the `p` of the `income^(p + 1)` weight. With the default
/// `p = 1` weights are squared incomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLawAllocator {
    degree: u32,
}

impl Default for PowerLawAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_POWER_DEGREE as u32)
    }
}

impl PowerLawAllocator {
    /// Degrees above [`MAX_POWER_DEGREE`] are clamped to it.
    pub fn new(degree: u32) -> Self {
        Self {
            degree: degree.min(MAX_POWER_DEGREE as u32),
        }
    }

    /// Allocator configured from the stored numerical parameters.
    pub fn from_params(params: &NumericalParams) -> Self {
        Self::new(params.degree())
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }
}

/// `num / den` rounded to the nearest integer, ties to even.
///
/// `den` must be non-zero.
fn div_round_half_even(num: Weight, den: Weight) -> Weight {
    let (quotient, remainder) = num.div_mod(den);
    match remainder.cmp(&(den - remainder)) {
        Ordering::Less => quotient,
        Ordering::Greater => quotient + Weight::one(),
        Ordering::Equal if quotient.low_u64() % 2 == 0 => quotient,
        Ordering::Equal => quotient + Weight::one(),
    }
}

impl TaxCalculator for PowerLawAllocator {
    fn weight(&self, income: u64) -> Result<Weight, TaxError> {
        let base = Weight::from(income);
        (0..self.degree).try_fold(base, |acc, _| {
            acc.checked_mul(base).ok_or(TaxError::ArithmeticOverflow)
        })
    }

    fn allocate(
        &self,
        incomes: &BTreeMap<UserId, u64>,
        total_pool: i64,
    ) -> Result<BTreeMap<UserId, i64>, TaxError> {
        let total_weight = self.total_weight(incomes)?;

        // Every income is zero: nobody carries any tax.
        if total_weight.is_zero() {
            return Ok(incomes.keys().map(|user| (user.clone(), 0)).collect());
        }

        // Half-to-even rounding is symmetric, so a negative pool is split by
        // magnitude and the sign restored afterwards.
        let pool = Weight::from(total_pool.unsigned_abs());

        let mut shares = BTreeMap::new();
        for (user, &income) in incomes {
            // share = round(pool * weight / total_weight)
            let num = pool
                .checked_mul(self.weight(income)?)
                .ok_or(TaxError::ArithmeticOverflow)?;
            let magnitude = div_round_half_even(num, total_weight);
            // weight <= total_weight, so the magnitude never exceeds the pool.
            if magnitude > pool {
                return Err(TaxError::ArithmeticOverflow);
            }
            let magnitude = i128::from(magnitude.low_u64());
            let share = if total_pool < 0 { -magnitude } else { magnitude };
            let share = i64::try_from(share).map_err(|_| TaxError::ArithmeticOverflow)?;
            shares.insert(user.clone(), share);
        }

        Ok(shares)
    }
}
