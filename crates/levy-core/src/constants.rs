//! Ledger constants and numerical-parameter defaults.

/// Length of every accounting interval, in days. Interval bounds are
/// inclusive, so an interval starting on day `d` ends on day `d + 13`.
pub const INTERVAL_LENGTH_DAYS: i64 = 14;

/// Number of intervals averaged into one income period.
pub const DEFAULT_INTERVALS_PER_PERIOD: i64 = 2;

/// Exponent `p` of the allocator weighting `income^(p + 1)`.
pub const DEFAULT_POWER_DEGREE: i64 = 1;

/// Tax pool carried by newly appended intervals.
pub const DEFAULT_INTERVAL_AMOUNT: i64 = 1100;

/// Largest accepted `power_degree`.
///
/// `u64::MAX^(MAX_POWER_DEGREE + 1)` times an `i64` pool fits the 512-bit
/// allocation weight with room for any user count.
pub const MAX_POWER_DEGREE: i64 = 4;

/// Largest accepted `intervals_per_period` (one year of intervals).
pub const MAX_INTERVALS_PER_PERIOD: i64 = 26;

/// Maximum length of a [`UserId`](crate::types::UserId).
pub const USER_ID_MAX_LEN: usize = 7;
