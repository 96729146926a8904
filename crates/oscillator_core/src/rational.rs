//! Exact rational coefficients.
//!
//! Physical inputs arrive as floats; the equation of motion is built over the
//! best rational approximation of each one so that the symbolic solve never
//! works on floating-point noise.

use num_rational::Ratio;
use num_traits::{CheckedMul, CheckedSub, Signed, Zero};

pub type Rational = Ratio<i128>;

/// Largest coefficient magnitude accepted. Keeps exact products of two
/// coefficients (numerators up to `1e12 * max_denominator`) inside `i128`.
pub const MAX_COEFFICIENT_MAGNITUDE: f64 = 1e12;

/// Best rational approximation of `value` whose denominator does not exceed
/// `max_denominator`.
///
/// Walks the continued-fraction convergents of `value` and finishes with the
/// closer of the last convergent and the best semiconvergent. Returns `None` for
/// non-finite values, magnitudes above [`MAX_COEFFICIENT_MAGNITUDE`], or a
/// non-positive bound.
pub fn limit_denominator(value: f64, max_denominator: i128) -> Option<Rational> {
    if !value.is_finite() || max_denominator < 1 || value.abs() > MAX_COEFFICIENT_MAGNITUDE {
        return None;
    }
    let negative = value < 0.0;
    let target = value.abs();

    let (mut p0, mut q0, mut p1, mut q1) = (0_i128, 1_i128, 1_i128, 0_i128);
    let mut remainder = target;
    let mut exact = false;

    for _ in 0..64 {
        let whole = remainder.floor();
        let a = whole as i128;
        let Some(q2) = a.checked_mul(q1).and_then(|v| v.checked_add(q0)) else {
            break;
        };
        if q2 > max_denominator {
            break;
        }
        let Some(p2) = a.checked_mul(p1).and_then(|v| v.checked_add(p0)) else {
            break;
        };
        (p0, q0, p1, q1) = (p1, q1, p2, q2);

        let fraction = remainder - whole;
        if fraction <= f64::EPSILON * remainder.max(1.0) {
            exact = true;
            break;
        }
        remainder = 1.0 / fraction;
    }

    let best = if exact || q1 == 0 {
        Rational::new(p1, q1.max(1))
    } else {
        let k = (max_denominator - q0) / q1;
        let semi = Rational::new(p0 + k * p1, q0 + k * q1);
        let convergent = Rational::new(p1, q1);
        if (to_f64(&convergent) - target).abs() <= (to_f64(&semi) - target).abs() {
            convergent
        } else {
            semi
        }
    };

    Some(if negative { -best } else { best })
}

pub fn to_f64(value: &Rational) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

/// `b^2 - 4ac` computed exactly, or `None` on overflow.
pub fn discriminant(a: &Rational, b: &Rational, c: &Rational) -> Option<Rational> {
    let b_squared = b.checked_mul(b)?;
    let four_ac = Rational::from_integer(4).checked_mul(a)?.checked_mul(c)?;
    b_squared.checked_sub(&four_ac)
}

pub fn is_positive(value: &Rational) -> bool {
    value.is_positive()
}

pub fn is_zero(value: &Rational) -> bool {
    value.is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_decimals_are_recovered() {
        assert_eq!(limit_denominator(0.1, 1_000_000), Some(Rational::new(1, 10)));
        assert_eq!(limit_denominator(2.5, 1_000_000), Some(Rational::new(5, 2)));
        assert_eq!(limit_denominator(-0.75, 1_000_000), Some(Rational::new(-3, 4)));
        assert_eq!(limit_denominator(0.0, 1_000_000), Some(Rational::from_integer(0)));
        assert_eq!(limit_denominator(7.0, 1_000_000), Some(Rational::from_integer(7)));
    }

    #[test]
    fn denominator_bound_is_respected() {
        let pi = limit_denominator(std::f64::consts::PI, 1000).unwrap();
        assert_eq!(pi, Rational::new(355, 113));
        let third = limit_denominator(1.0 / 3.0, 1_000_000).unwrap();
        assert_eq!(third, Rational::new(1, 3));
        let tiny = limit_denominator(1e-9, 1_000_000).unwrap();
        assert!(tiny.is_zero());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(limit_denominator(f64::NAN, 10), None);
        assert_eq!(limit_denominator(1e13, 10), None);
        assert_eq!(limit_denominator(1.0, 0), None);
    }

    #[test]
    fn discriminant_is_exact() {
        let one = Rational::from_integer(1);
        let two = Rational::from_integer(2);
        assert_eq!(discriminant(&one, &two, &one), Some(Rational::from_integer(0)));
        let quarter = Rational::new(1, 4);
        assert_eq!(
            discriminant(&one, &quarter, &one),
            Some(Rational::new(1, 16) - Rational::from_integer(4))
        );
    }
}
