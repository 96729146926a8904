use crate::traits::Scalar;
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// Seeds the independent variable: value `val`, unit derivative.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    fn chain(self, val: f64, slope: f64) -> Self {
        Self::new(val, slope * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    fn powf(self, exponent: Self) -> Self {
        let val = self.val.powf(exponent.val);
        if exponent.eps == 0.0 {
            // Constant exponent: avoid ln of a negative base.
            let slope = exponent.val * self.val.powf(exponent.val - 1.0);
            return self.chain(val, slope);
        }
        let eps = val * (exponent.eps * self.val.ln() + exponent.val * self.eps / self.val);
        Self::new(val, eps)
    }

    fn powi(self, n: i32) -> Self {
        let val = self.val.powi(n);
        let slope = if n == 0 {
            0.0
        } else {
            f64::from(n) * self.val.powi(n - 1)
        };
        self.chain(val, slope)
    }

    fn sqrt(self) -> Self {
        let root = self.val.sqrt();
        self.chain(root, 0.5 / root)
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    fn ln(self) -> Self {
        self.chain(self.val.ln(), 1.0 / self.val)
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }

    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }

    fn tan(self) -> Self {
        let c = self.val.cos();
        self.chain(self.val.tan(), 1.0 / (c * c))
    }

    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }

    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }

    fn tanh(self) -> Self {
        let th = self.val.tanh();
        self.chain(th, 1.0 - th * th)
    }

    fn asin(self) -> Self {
        self.chain(self.val.asin(), 1.0 / (1.0 - self.val * self.val).sqrt())
    }

    fn acos(self) -> Self {
        self.chain(self.val.acos(), -1.0 / (1.0 - self.val * self.val).sqrt())
    }

    fn atan(self) -> Self {
        self.chain(self.val.atan(), 1.0 / (1.0 + self.val * self.val))
    }

    fn abs(self) -> Self {
        let sign = if self.val < 0.0 { -1.0 } else { 1.0 };
        self.chain(self.val.abs(), sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn product_and_quotient_rules() {
        let x = Dual::variable(3.0);
        let y = x * x / (x + Dual::one());
        // d/dx x^2/(x+1) = (x^2 + 2x)/(x+1)^2
        assert_close(y.val, 9.0 / 4.0);
        assert_close(y.eps, 15.0 / 16.0);
    }

    #[test]
    fn elementary_functions_match_analytic_derivatives() {
        let x = Dual::variable(0.3);
        assert_close(Scalar::sin(x).eps, 0.3_f64.cos());
        assert_close(Scalar::cos(x).eps, -0.3_f64.sin());
        assert_close(Scalar::exp(x).eps, 0.3_f64.exp());
        assert_close(Scalar::ln(x).eps, 1.0 / 0.3);
        assert_close(Scalar::atan(x).eps, 1.0 / 1.09);
        assert_close(Scalar::sqrt(x).eps, 0.5 / 0.3_f64.sqrt());
    }

    #[test]
    fn powi_handles_negative_base() {
        let x = Dual::variable(-2.0);
        let cube = Scalar::powi(x, 3);
        assert_close(cube.val, -8.0);
        assert_close(cube.eps, 12.0);
        let squared = Scalar::powf(x, Dual::from_f64(2.0));
        assert_close(squared.val, 4.0);
        assert_close(squared.eps, -4.0);
    }

    #[test]
    fn powf_with_variable_exponent() {
        // d/dx 2^x = 2^x ln 2
        let x = Dual::variable(1.5);
        let y = Scalar::powf(Dual::from_f64(2.0), x);
        assert_close(y.eps, 2.0_f64.powf(1.5) * 2.0_f64.ln());
    }
}
