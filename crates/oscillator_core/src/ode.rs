//! Constant-coefficient second-order linear equations
//! `m x'' + c x' + k x = f(t)` with exponential-polynomial forcing.

use crate::error::{OscillatorError, OscillatorResult};
use crate::expression::{Equation, Expr};
use crate::quasi_polynomial::{poly_integral, ExpPolynomial, ExpTerm};
use crate::rational::{self, Rational};
use nalgebra::{Matrix2, Vector2};
use num_complex::Complex64;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A coefficient of the characteristic polynomial at a forcing rate counts as
/// zero (resonance) below this fraction of the polynomial's term magnitudes.
const RESONANCE_TOLERANCE: f64 = 1e-9;

/// Roots of `m r^2 + c r + k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CharacteristicRoots {
    Distinct(Complex64, Complex64),
    Repeated(Complex64),
}

impl CharacteristicRoots {
    pub fn pair(&self) -> (Complex64, Complex64) {
        match *self {
            Self::Distinct(r1, r2) => (r1, r2),
            Self::Repeated(r) => (r, r),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecondOrderOde {
    pub mass: Rational,
    pub damping: Rational,
    pub stiffness: Rational,
}

impl SecondOrderOde {
    pub fn new(mass: Rational, damping: Rational, stiffness: Rational) -> Self {
        Self {
            mass,
            damping,
            stiffness,
        }
    }

    fn coefficients(&self) -> (f64, f64, f64) {
        (
            rational::to_f64(&self.mass),
            rational::to_f64(&self.damping),
            rational::to_f64(&self.stiffness),
        )
    }

    /// `mass*x''(var) + damping*x'(var) + stiffness*x(var) = forcing`, with
    /// zero terms left out and unit coefficients implicit.
    pub fn equation(&self, forcing: &Expr, var: &str) -> Equation {
        let mut terms = Vec::with_capacity(3);
        for (coefficient, order) in [(self.mass, 2), (self.damping, 1), (self.stiffness, 0)] {
            if coefficient.is_zero() {
                continue;
            }
            let unknown = Expr::unknown("x", order, Expr::symbol(var));
            terms.push(if coefficient.is_one() {
                unknown
            } else {
                Expr::mul(Expr::rational(coefficient), unknown)
            });
        }
        Equation::new(Expr::sum(terms), forcing.clone())
    }

    /// The discriminant is taken exactly, so repeated roots are detected without
    /// a tolerance.
    pub fn characteristic_roots(&self) -> CharacteristicRoots {
        let (m, c, k) = self.coefficients();
        let exact = rational::discriminant(&self.mass, &self.damping, &self.stiffness);
        if exact.is_some_and(|d| rational::is_zero(&d)) {
            return CharacteristicRoots::Repeated(Complex64::new(-c / (2.0 * m), 0.0));
        }
        let discriminant = match exact {
            Some(d) => rational::to_f64(&d),
            None => {
                warn!("discriminant overflowed exact arithmetic; using floating point");
                c * c - 4.0 * m * k
            }
        };
        if discriminant > 0.0 && c != 0.0 {
            // q = -(c + sign(c) sqrt(D)) / 2 never cancels; the small root is k/q.
            let q = -0.5 * (c + c.signum() * discriminant.sqrt());
            let (large, small) = (q / m, k / q);
            let (plus, minus) = if c > 0.0 { (small, large) } else { (large, small) };
            return CharacteristicRoots::Distinct(
                Complex64::new(plus, 0.0),
                Complex64::new(minus, 0.0),
            );
        }
        let root = Complex64::new(discriminant, 0.0).sqrt();
        let two_m = 2.0 * m;
        CharacteristicRoots::Distinct((-c + root) / two_m, (-c - root) / two_m)
    }

    /// Particular solution for one forcing term `p(t) e^(s t)` by undetermined
    /// coefficients.
    ///
    /// With `u e^(s t)` as the ansatz the equation becomes
    /// `P(s) u + P'(s) u' + m u'' = p`. When `s` is a root of multiplicity `j`
    /// the first `j` coefficients vanish, so the equation is solved for
    /// `v = u^(j)` and `v` is integrated `j` times.
    fn particular_term(&self, term: &ExpTerm) -> ExpTerm {
        let (m, c, k) = self.coefficients();
        let s = term.rate;
        let a = [
            s * s * m + s * c + k,
            s * (2.0 * m) + c,
            Complex64::new(m, 0.0),
        ];
        let scale = m * s.norm_sqr() + c.abs() * s.norm() + k.abs();
        let order = a
            .iter()
            .position(|ai| ai.norm() > RESONANCE_TOLERANCE * scale)
            .unwrap_or(2);
        if order > 0 {
            debug!(rate = %s, multiplicity = order, "resonant forcing term");
        }

        let zero = Complex64::new(0.0, 0.0);
        let b0 = a[order];
        let b1 = a.get(order + 1).copied().unwrap_or(zero);
        let b2 = a.get(order + 2).copied().unwrap_or(zero);

        let degree = term.poly.len();
        let mut v = vec![zero; degree];
        for idx in (0..degree).rev() {
            let mut rhs = term.poly[idx];
            let n = idx as f64;
            if idx + 1 < degree {
                rhs -= b1 * (n + 1.0) * v[idx + 1];
            }
            if idx + 2 < degree {
                rhs -= b2 * ((n + 1.0) * (n + 2.0)) * v[idx + 2];
            }
            v[idx] = rhs / b0;
        }

        let mut u = v;
        for _ in 0..order {
            u = poly_integral(&u);
        }
        ExpTerm::new(s, u)
    }

    pub fn particular_solution(&self, forcing: &ExpPolynomial) -> ExpPolynomial {
        ExpPolynomial::from_terms(
            forcing
                .terms()
                .iter()
                .map(|term| self.particular_term(term))
                .collect(),
        )
    }

    /// Solves with `x(0) = x0`, `x'(0) = v0`.
    pub fn solve(
        &self,
        forcing: &ExpPolynomial,
        x0: f64,
        v0: f64,
    ) -> OscillatorResult<ExpPolynomial> {
        if !rational::is_positive(&self.mass) {
            return Err(OscillatorError::unsolvable(
                "the leading coefficient must be positive",
            ));
        }
        let particular = self.particular_solution(forcing);
        let xp0 = particular.value_at(0.0);
        let dxp0 = particular.derivative().value_at(0.0);

        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        let roots = self.characteristic_roots();
        let (matrix, basis) = match roots {
            CharacteristicRoots::Distinct(r1, r2) => (
                Matrix2::new(one, one, r1, r2),
                [ExpTerm::new(r1, vec![one]), ExpTerm::new(r2, vec![one])],
            ),
            CharacteristicRoots::Repeated(r) => (
                Matrix2::new(one, zero, r, one),
                [ExpTerm::new(r, vec![one]), ExpTerm::new(r, vec![zero, one])],
            ),
        };
        let rhs = Vector2::new(Complex64::new(x0, 0.0) - xp0, Complex64::new(v0, 0.0) - dxp0);
        let constants = matrix.lu().solve(&rhs).ok_or_else(|| {
            OscillatorError::unsolvable("the initial conditions do not determine the constants")
        })?;
        let (c1, c2) = (constants[0], constants[1]);
        debug!(?roots, c1 = %c1, c2 = %c2, "homogeneous constants");

        let mut solution = particular;
        for (constant, term) in constants.iter().zip(basis) {
            let scaled: Vec<Complex64> = term.poly.iter().map(|p| *p * *constant).collect();
            solution.push(ExpTerm::new(term.rate, scaled));
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;

    fn ode(m: i128, c: i128, k: i128) -> SecondOrderOde {
        SecondOrderOde::new(
            Rational::from_integer(m),
            Rational::from_integer(c),
            Rational::from_integer(k),
        )
    }

    fn forcing(input: &str) -> ExpPolynomial {
        ExpPolynomial::from_expr(&parse(input).unwrap(), "t", 64).unwrap()
    }

    /// Checks `m x'' + c x' + k x = f` at a few times and the initial conditions.
    fn assert_solves(ode: &SecondOrderOde, f: &str, x0: f64, v0: f64) {
        let f_poly = forcing(f);
        let x = ode.solve(&f_poly, x0, v0).unwrap();
        let dx = x.derivative();
        let ddx = dx.derivative();
        let (m, c, k) = ode.coefficients();
        for t in [0.0, 0.5, 1.7, 3.2] {
            let lhs = ddx.value_at(t) * m + dx.value_at(t) * c + x.value_at(t) * k;
            let rhs = f_poly.value_at(t);
            assert!(
                (lhs - rhs).norm() < 1e-8 * (1.0 + rhs.norm()),
                "residual at {t}: {lhs} vs {rhs}"
            );
        }
        assert!((x.value_at(0.0).re - x0).abs() < 1e-12);
        assert!((dx.value_at(0.0).re - v0).abs() < 1e-12);
    }

    #[test]
    fn free_undamped_motion_is_cosine() {
        let x = ode(1, 0, 1).solve(&ExpPolynomial::zero(), 1.0, 0.0).unwrap();
        assert_eq!(x.to_real_expr("t").to_string(), "cos(t)");
    }

    #[test]
    fn critical_damping_has_repeated_root() {
        let roots = ode(1, 2, 1).characteristic_roots();
        assert_eq!(roots, CharacteristicRoots::Repeated(Complex64::new(-1.0, 0.0)));
        assert_solves(&ode(1, 2, 1), "0", 1.0, 0.0);
        let x = ode(1, 2, 1).solve(&ExpPolynomial::zero(), 1.0, 0.0).unwrap();
        assert_eq!(x.to_real_expr("t").to_string(), "exp(-t) + t*exp(-t)");
    }

    #[test]
    fn forced_responses_satisfy_the_equation() {
        assert_solves(&ode(1, 0, 4), "3*t^2 + 1", 0.5, -1.0);
        assert_solves(&ode(2, 3, 5), "exp(-t)*cos(2*t)", 0.0, 1.0);
        assert_solves(&ode(1, 4, 1), "sin(3*t) + t", 1.0, 0.0);
        assert_solves(&ode(1, 5, 6), "exp(-2*t)", 0.0, 0.0);
    }

    #[test]
    fn heavy_damping_keeps_both_roots_accurate() {
        let heavy = ode(1, 100_000_000, 1);
        let (slow, fast) = heavy.characteristic_roots().pair();
        assert!((slow.re + 1e-8).abs() < 1e-22, "{slow}");
        assert!((fast.re + 1e8).abs() < 1e-6, "{fast}");
        assert_solves(&ode(1, 1_000_000, 1), "0", 1.0, 0.0);
    }

    #[test]
    fn resonance_produces_secular_terms() {
        assert_solves(&ode(1, 0, 1), "sin(t)", 0.0, 0.0);
        let x = ode(1, 0, 1).solve(&forcing("sin(t)"), 0.0, 0.0).unwrap();
        // x = sin(t)/2 - t cos(t)/2
        assert_eq!(x.to_real_expr("t").to_string(), "sin(t)/2 - t*cos(t)/2");

        // Double resonance: e^(-t) forcing on a critically damped system.
        assert_solves(&ode(1, 2, 1), "exp(-t)", 0.0, 0.0);
        let x = ode(1, 2, 1).solve(&forcing("exp(-t)"), 0.0, 0.0).unwrap();
        assert_eq!(x.degree(), 2);
    }

    #[test]
    fn equation_omits_zero_terms() {
        let equation = ode(1, 0, 4).equation(&parse("sin(t)").unwrap(), "t");
        assert_eq!(
            equation.to_string(),
            "Derivative(x(t), (t, 2)) + 4*x(t) = sin(t)"
        );
        let damped = SecondOrderOde::new(
            Rational::from_integer(2),
            Rational::new(1, 2),
            Rational::from_integer(1),
        );
        assert_eq!(
            damped.equation(&Expr::zero(), "t").to_string(),
            "2*Derivative(x(t), (t, 2)) + Derivative(x(t), t)/2 + x(t) = 0"
        );
    }
}
