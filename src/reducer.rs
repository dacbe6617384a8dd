//! Reduction algebra for measurable types
//!
//! A [`Reducer`] knows how to combine, compare, average and render one
//! measurable type. The engine never inspects values directly; every
//! aggregation goes through the reducer the metric was created with.
//!
//! ## Absent values
//!
//! The provided combinators take `Option<&T>` operands. When exactly one
//! operand is absent the present one is returned unchanged; when both are
//! absent the result is absent.
//!
//! ## Built-in reducers
//!
//! | Reducer            | Type       | Identity | Rendering       |
//! |--------------------|------------|----------|-----------------|
//! | [`DurationReducer`] | `Duration` | zero     | `H:MM:SS`       |
//! | [`IntegerReducer`]  | `i64`      | `0`      | `1,234,567`     |
//! | [`FloatReducer`]    | `f64`      | `0.0`    | `1,234.568`     |

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Bound satisfied by every value a metric can hold
pub trait Measurable: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Measurable for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Type-specific algebra used to fold measures into snapshots
///
/// `combine` must be commutative and associative and `compare` must be a
/// total order; snapshot merges rely on both.
pub trait Reducer<T: Measurable>: fmt::Debug + Send + Sync {
    /// Neutral value used for empty snapshots
    fn identity(&self) -> T;

    /// Sum two present values
    fn combine(&self, a: &T, b: &T) -> T;

    /// Total order between two present values
    fn compare(&self, a: &T, b: &T) -> Ordering;

    /// Divide a present total by a non-zero count
    fn divide(&self, total: &T, count: u64) -> T;

    /// Canonical text rendering of a present value
    fn format(&self, value: &T) -> String;

    /// Accumulate two possibly absent values
    fn accumulate(&self, a: Option<&T>, b: Option<&T>) -> Option<T> {
        merge(a, b, |a, b| self.combine(a, b))
    }

    /// Greatest of two possibly absent values
    ///
    /// On equality the right operand is selected.
    fn max(&self, a: Option<&T>, b: Option<&T>) -> Option<T> {
        merge(a, b, |a, b| match self.compare(a, b) {
            Ordering::Greater => a.clone(),
            _ => b.clone(),
        })
    }

    /// Least of two possibly absent values
    ///
    /// On equality the left operand is selected.
    fn min(&self, a: Option<&T>, b: Option<&T>) -> Option<T> {
        merge(a, b, |a, b| match self.compare(a, b) {
            Ordering::Greater => b.clone(),
            _ => a.clone(),
        })
    }

    /// Average of `total` over `count` samples
    ///
    /// Absent only when `total` is absent. A zero count yields the identity.
    fn average(&self, total: Option<&T>, count: u64) -> Option<T> {
        total.map(|total| {
            if count == 0 {
                self.identity()
            } else {
                self.divide(total, count)
            }
        })
    }

    /// Render a possibly absent value, absent renders as `null`
    fn render(&self, value: Option<&T>) -> String {
        value.map_or_else(|| "null".to_string(), |v| self.format(v))
    }
}

fn merge<T, F>(a: Option<&T>, b: Option<&T>, f: F) -> Option<T>
where
    T: Clone,
    F: FnOnce(&T, &T) -> T,
{
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v.clone()),
        (None, None) => None,
    }
}

/// Reducer for elapsed times
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationReducer;

impl Reducer<Duration> for DurationReducer {
    fn identity(&self) -> Duration {
        Duration::ZERO
    }

    fn combine(&self, a: &Duration, b: &Duration) -> Duration {
        a.saturating_add(*b)
    }

    fn compare(&self, a: &Duration, b: &Duration) -> Ordering {
        a.cmp(b)
    }

    fn divide(&self, total: &Duration, count: u64) -> Duration {
        let nanos = total.as_nanos() / u128::from(count);
        let secs = (nanos / 1_000_000_000) as u64;
        Duration::new(secs, (nanos % 1_000_000_000) as u32)
    }

    fn format(&self, value: &Duration) -> String {
        let secs = value.as_secs();
        format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

/// Reducer for 64-bit counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegerReducer;

impl Reducer<i64> for IntegerReducer {
    fn identity(&self) -> i64 {
        0
    }

    fn combine(&self, a: &i64, b: &i64) -> i64 {
        // wrapping keeps the sum associative on overflow
        a.wrapping_add(*b)
    }

    fn compare(&self, a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn divide(&self, total: &i64, count: u64) -> i64 {
        i64::try_from(count).map_or(0, |count| total / count)
    }

    fn format(&self, value: &i64) -> String {
        let digits = group_thousands(&value.unsigned_abs().to_string());
        if *value < 0 {
            format!("-{}", digits)
        } else {
            digits
        }
    }
}

/// Reducer for 64-bit floating point values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloatReducer;

/// Fraction digits kept when rendering floats
const FLOAT_FRACTION_DIGITS: usize = 3;

impl Reducer<f64> for FloatReducer {
    fn identity(&self) -> f64 {
        0.0
    }

    fn combine(&self, a: &f64, b: &f64) -> f64 {
        a + b
    }

    fn compare(&self, a: &f64, b: &f64) -> Ordering {
        a.total_cmp(b)
    }

    fn divide(&self, total: &f64, count: u64) -> f64 {
        total / count as f64
    }

    fn format(&self, value: &f64) -> String {
        if !value.is_finite() {
            return value.to_string();
        }

        let fixed = format!("{:.*}", FLOAT_FRACTION_DIGITS, value.abs());
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let frac_part = frac_part.trim_end_matches('0');

        let mut out = String::with_capacity(fixed.len() + 4);
        // -0.0001 rounds to "0", which carries no sign
        if value.is_sign_negative() && (int_part != "0" || !frac_part.is_empty()) {
            out.push('-');
        }
        out.push_str(&group_thousands(int_part));
        if !frac_part.is_empty() {
            out.push('.');
            out.push_str(frac_part);
        }
        out
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Shared duration reducer
pub fn duration() -> Arc<dyn Reducer<Duration>> {
    static SHARED: OnceLock<Arc<dyn Reducer<Duration>>> = OnceLock::new();
    SHARED.get_or_init(|| Arc::new(DurationReducer)).clone()
}

/// Shared integer reducer
pub fn integer() -> Arc<dyn Reducer<i64>> {
    static SHARED: OnceLock<Arc<dyn Reducer<i64>>> = OnceLock::new();
    SHARED.get_or_init(|| Arc::new(IntegerReducer)).clone()
}

/// Shared float reducer
pub fn float() -> Arc<dyn Reducer<f64>> {
    static SHARED: OnceLock<Arc<dyn Reducer<f64>>> = OnceLock::new();
    SHARED.get_or_init(|| Arc::new(FloatReducer)).clone()
}
