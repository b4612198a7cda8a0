//! Best-rational approximation for EXIF rational fields
//!
//! EXIF stores measurements as integer numerator/denominator pairs. A fixed
//! scale factor (seconds times 100 over 100) caps GPS precision at roughly
//! 0.3 m; picking the denominator per value instead keeps the error bounded
//! by `1 / (2 * bound)` of the unit, which for the bounds used by the geo tag
//! builder is far below a millimeter on the ground.
//!
//! The search walks the continued-fraction convergents of the input and
//! finishes with the best semiconvergent that still fits the bound, which is
//! the optimal rational among all denominators up to the bound.

use serde::{Deserialize, Serialize};

/// Errors from rational encoding
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RationalError {
    /// Input was NaN or infinite
    #[error("cannot encode non-finite value: {0}")]
    NonFinite(f64),

    /// Denominator bound must be at least 1
    #[error("denominator bound must be >= 1, got {0}")]
    InvalidBound(u64),

    /// Input magnitude exceeds what a 64-bit numerator can carry
    #[error("value {0} is out of encodable range")]
    OutOfRange(f64),
}

/// A signed rational number with a positive denominator.
///
/// Always reduced to lowest terms. Produced by [`Rational::approximate`];
/// the represented value never changes under reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator, carries the sign
    pub numerator: i64,
    /// Denominator, always positive
    pub denominator: i64,
}

impl Rational {
    /// Encode `value` as the closest rational with denominator <= `max_denominator`.
    ///
    /// The result is optimal: no rational with a denominator within the bound
    /// lies strictly closer to `value`. Exact inputs (including integers)
    /// encode exactly whenever the bound admits their reduced denominator.
    ///
    /// # Errors
    /// [`RationalError::NonFinite`] for NaN or infinite input,
    /// [`RationalError::InvalidBound`] for a zero bound. Out-of-bound input is
    /// never clamped.
    pub fn approximate(value: f64, max_denominator: u64) -> Result<Self, RationalError> {
        if !value.is_finite() {
            return Err(RationalError::NonFinite(value));
        }
        if max_denominator == 0 {
            return Err(RationalError::InvalidBound(max_denominator));
        }

        let negative = value.is_sign_negative();
        let target = value.abs();
        // The numerator grows up to target * bound; both factors must leave
        // room in i64 after reduction.
        if target * max_denominator as f64 >= i64::MAX as f64 {
            return Err(RationalError::OutOfRange(value));
        }
        let (numerator, denominator) = best_fraction(target, max_denominator as i128);

        let numerator = if negative { -numerator } else { numerator };
        Ok(Self {
            numerator: numerator as i64,
            denominator: denominator as i64,
        })
    }

    /// The decimal value this pair represents.
    pub fn to_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Whether the represented value is negative.
    pub fn is_negative(self) -> bool {
        self.numerator < 0
    }

    /// Absolute value of the pair.
    pub fn abs(self) -> Self {
        Self {
            numerator: self.numerator.abs(),
            denominator: self.denominator,
        }
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Continued-fraction search for the best fraction `p/q`, `q <= bound`.
///
/// Maintains the last two convergents `p0/q0` and `p1/q1`. When the next
/// convergent would overflow the bound, the best semiconvergent
/// `(p0 + k*p1) / (q0 + k*q1)` with the largest admissible `k` competes with
/// the last convergent; whichever lies closer to the target wins.
fn best_fraction(target: f64, bound: i128) -> (i128, i128) {
    debug_assert!(target >= 0.0);
    debug_assert!(bound >= 1);

    let (mut p0, mut q0): (i128, i128) = (0, 1);
    let (mut p1, mut q1): (i128, i128) = (1, 0);
    let mut x = target;

    loop {
        let a = x.floor();
        // A term too large for i128 means x is effectively integral already.
        if a >= 1e30 {
            break;
        }
        let a = a as i128;

        let q2 = q0 + a * q1;
        if q1 != 0 && q2 > bound {
            break;
        }
        let p2 = p0 + a * p1;

        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;

        let frac = x - a as f64;
        if frac <= 0.0 {
            // Exact expansion terminated.
            return (p1, q1);
        }
        let next = 1.0 / frac;
        if !next.is_finite() {
            return (p1, q1);
        }
        x = next;
    }

    // p1/q1 is the last convergent within the bound; try the best
    // semiconvergent built from it.
    let k = (bound - q0) / q1;
    let (sp, sq) = (p0 + k * p1, q0 + k * q1);

    let conv_err = (target - p1 as f64 / q1 as f64).abs();
    let semi_err = (target - sp as f64 / sq as f64).abs();

    let (p, q) = if semi_err < conv_err { (sp, sq) } else { (p1, q1) };
    let g = gcd(p, q);
    (p / g, q / g)
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}
