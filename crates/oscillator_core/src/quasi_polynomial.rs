//! Exponential polynomials: finite sums of `p(t) * e^(s t)` with complex
//! rates `s` and complex polynomial coefficients.
//!
//! This is the class of forcing terms the closed-form solver accepts and the
//! class every solution lives in. Products of sines, cosines, exponentials and
//! polynomials in `t` all reduce to it through Euler's formula.

use crate::expression::{Expr, Function, Number};
use crate::rational::{self, limit_denominator};
use num_complex::Complex64;
use num_traits::Zero;
use thiserror::Error;

/// Rates closer than this (relative) are treated as the same exponential.
const RATE_TOLERANCE: f64 = 1e-12;
/// Weighted real coefficients below this fraction of the largest one are dropped.
const COEFFICIENT_CUTOFF: f64 = 1e-12;
/// Denominator bound when snapping float coefficients back to rationals.
const SNAP_DENOMINATOR: i128 = 1000;
const SNAP_TOLERANCE: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForcingError {
    #[error("`{0}` is not a sum of polynomial, exponential and sinusoidal terms in t")]
    NotExponentialPolynomial(String),
    #[error("`{expr}` needs a power of t above the limit of {limit}")]
    DegreeTooHigh { expr: String, limit: u32 },
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("`{0}` does not evaluate to a finite number")]
    NonFinite(String),
}

/// `poly(t) * e^(rate t)`; `poly[k]` multiplies `t^k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpTerm {
    pub rate: Complex64,
    pub poly: Vec<Complex64>,
}

impl ExpTerm {
    pub fn new(rate: Complex64, poly: Vec<Complex64>) -> Self {
        Self { rate, poly }
    }

    pub fn degree(&self) -> usize {
        self.poly.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpPolynomial {
    terms: Vec<ExpTerm>,
}

fn same_rate(a: Complex64, b: Complex64) -> bool {
    (a - b).norm() <= RATE_TOLERANCE * (1.0 + a.norm().max(b.norm()))
}

pub(crate) fn poly_add(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); a.len().max(b.len())];
    for (i, c) in a.iter().enumerate() {
        out[i] += *c;
    }
    for (i, c) in b.iter().enumerate() {
        out[i] += *c;
    }
    out
}

pub(crate) fn poly_mul(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![Complex64::new(0.0, 0.0); a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += *x * *y;
        }
    }
    out
}

pub(crate) fn poly_derivative(p: &[Complex64]) -> Vec<Complex64> {
    p.iter()
        .enumerate()
        .skip(1)
        .map(|(k, c)| *c * k as f64)
        .collect()
}

/// Antiderivative with zero constant term.
pub(crate) fn poly_integral(p: &[Complex64]) -> Vec<Complex64> {
    let mut out = Vec::with_capacity(p.len() + 1);
    out.push(Complex64::new(0.0, 0.0));
    out.extend(p.iter().enumerate().map(|(k, c)| *c / (k + 1) as f64));
    out
}

fn poly_eval(p: &[Complex64], t: f64) -> Complex64 {
    p.iter()
        .rev()
        .fold(Complex64::new(0.0, 0.0), |acc, c| acc * t + *c)
}

impl ExpPolynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: Complex64) -> Self {
        Self::from_terms(vec![ExpTerm::new(Complex64::new(0.0, 0.0), vec![value])])
    }

    /// The identity `t`.
    pub fn variable() -> Self {
        let zero = Complex64::new(0.0, 0.0);
        Self::from_terms(vec![ExpTerm::new(zero, vec![zero, Complex64::new(1.0, 0.0)])])
    }

    pub fn from_terms(terms: Vec<ExpTerm>) -> Self {
        let mut out = Self::zero();
        for term in terms {
            out.push(term);
        }
        out
    }

    pub fn terms(&self) -> &[ExpTerm] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Highest power of `t` over all terms.
    pub fn degree(&self) -> usize {
        self.terms.iter().map(ExpTerm::degree).max().unwrap_or(0)
    }

    /// Adds a term, merging it with an existing term of the same rate.
    pub fn push(&mut self, term: ExpTerm) {
        let zero = Complex64::new(0.0, 0.0);
        match self.terms.iter_mut().find(|t| same_rate(t.rate, term.rate)) {
            Some(existing) => existing.poly = poly_add(&existing.poly, &term.poly),
            None => self.terms.push(term),
        }
        for t in &mut self.terms {
            while t.poly.last() == Some(&zero) {
                t.poly.pop();
            }
        }
        self.terms.retain(|t| !t.poly.is_empty());
    }

    pub fn add(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for term in &other.terms {
            out.push(term.clone());
        }
        out
    }

    pub fn scale(&self, factor: Complex64) -> Self {
        Self::from_terms(
            self.terms
                .iter()
                .map(|t| ExpTerm::new(t.rate, t.poly.iter().map(|c| *c * factor).collect()))
                .collect(),
        )
    }

    pub fn mul(&self, other: &Self) -> Self {
        let mut out = Self::zero();
        for a in &self.terms {
            for b in &other.terms {
                out.push(ExpTerm::new(a.rate + b.rate, poly_mul(&a.poly, &b.poly)));
            }
        }
        out
    }

    pub fn powi(&self, n: u32) -> Self {
        let mut result = Self::constant(Complex64::new(1.0, 0.0));
        let mut base = self.clone();
        let mut remaining = n;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.mul(&base);
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.mul(&base);
            }
        }
        result
    }

    /// `d/dt (p e^(s t)) = (p' + s p) e^(s t)`.
    pub fn derivative(&self) -> Self {
        Self::from_terms(
            self.terms
                .iter()
                .map(|t| {
                    let scaled: Vec<Complex64> = t.poly.iter().map(|c| *c * t.rate).collect();
                    ExpTerm::new(t.rate, poly_add(&poly_derivative(&t.poly), &scaled))
                })
                .collect(),
        )
    }

    pub fn value_at(&self, t: f64) -> Complex64 {
        self.terms
            .iter()
            .map(|term| poly_eval(&term.poly, t) * (term.rate * t).exp())
            .sum()
    }

    /// `(a, b)` when the expression is exactly `a + b t`.
    pub fn as_affine(&self) -> Option<(Complex64, Complex64)> {
        let zero = Complex64::new(0.0, 0.0);
        match self.terms.as_slice() {
            [] => Some((zero, zero)),
            [term] if same_rate(term.rate, zero) && term.poly.len() <= 2 => Some((
                term.poly.first().copied().unwrap_or(zero),
                term.poly.get(1).copied().unwrap_or(zero),
            )),
            _ => None,
        }
    }

    /// Decomposes a forcing expression in `var`.
    ///
    /// Accepts sums and products of polynomials, `exp`, `sin`, `cos`, `sinh` and
    /// `cosh` of affine arguments, positive constants raised to affine powers,
    /// and integer powers up to `max_power`.
    pub fn from_expr(expr: &Expr, var: &str, max_power: u32) -> Result<Self, ForcingError> {
        if !expr.depends_on(var) {
            return constant_of(expr).map(Self::constant);
        }
        match expr {
            Expr::Symbol(_) => Ok(Self::variable()),
            Expr::Add(terms) => terms.iter().try_fold(Self::zero(), |acc, term| {
                Ok(acc.add(&Self::from_expr(term, var, max_power)?))
            }),
            Expr::Mul(factors) => {
                let mut acc = Self::constant(Complex64::new(1.0, 0.0));
                for factor in factors {
                    acc = acc.mul(&Self::from_expr(factor, var, max_power)?);
                    check_degree(&acc, expr, max_power)?;
                }
                Ok(acc)
            }
            Expr::Pow(base, exponent) => Self::from_pow(expr, base, exponent, var, max_power),
            Expr::Call(function, arg) => Self::from_call(expr, *function, arg, var, max_power),
            Expr::Number(_) | Expr::Constant(_) | Expr::Unknown { .. } => {
                Err(ForcingError::NotExponentialPolynomial(expr.to_string()))
            }
        }
    }

    fn from_pow(
        expr: &Expr,
        base: &Expr,
        exponent: &Expr,
        var: &str,
        max_power: u32,
    ) -> Result<Self, ForcingError> {
        let not_closed = || ForcingError::NotExponentialPolynomial(expr.to_string());

        if exponent.depends_on(var) {
            if base.depends_on(var) {
                return Err(not_closed());
            }
            // a^u = e^(u ln a) for a positive constant a.
            let a = constant_of(base)?;
            if a.im != 0.0 || a.re <= 0.0 {
                return Err(not_closed());
            }
            let (c0, c1) = Self::from_expr(exponent, var, max_power)?
                .as_affine()
                .ok_or_else(not_closed)?;
            return Ok(exp_affine(c0 * a.re.ln(), c1 * a.re.ln()));
        }

        let base_poly = Self::from_expr(base, var, max_power)?;
        let power = constant_of(exponent)?;
        if power.im == 0.0 && power.re.fract() == 0.0 {
            let n = power.re;
            if n.abs() > f64::from(max_power) {
                return Err(ForcingError::DegreeTooHigh {
                    expr: expr.to_string(),
                    limit: max_power,
                });
            }
            if n >= 0.0 {
                let result = base_poly.powi(n as u32);
                check_degree(&result, expr, max_power)?;
                return Ok(result);
            }
        }
        // Negative or fractional powers only of a single pure exponential c e^(s t).
        match base_poly.terms.as_slice() {
            [term]
                if term.poly.len() == 1
                    && (power.re.fract() == 0.0 || is_positive_real(term.poly[0])) =>
            {
                let coefficient = term.poly[0].powc(power);
                let rate = term.rate * power;
                Ok(Self::from_terms(vec![ExpTerm::new(rate, vec![coefficient])]))
            }
            _ => Err(not_closed()),
        }
    }

    fn from_call(
        expr: &Expr,
        function: Function,
        arg: &Expr,
        var: &str,
        max_power: u32,
    ) -> Result<Self, ForcingError> {
        let not_closed = || ForcingError::NotExponentialPolynomial(expr.to_string());
        let (a, b) = Self::from_expr(arg, var, max_power)
            .map_err(|_| not_closed())?
            .as_affine()
            .ok_or_else(not_closed)?;

        let i = Complex64::new(0.0, 1.0);
        let half = Complex64::new(0.5, 0.0);
        // e^(k (a + b t)) scaled by `weight`.
        let wave = |k: Complex64, weight: Complex64| exp_affine(k * a, k * b).scale(weight);
        let one = Complex64::new(1.0, 0.0);

        let result = match function {
            Function::Exp => exp_affine(a, b),
            Function::Sin => wave(i, -i * half).add(&wave(-i, i * half)),
            Function::Cos => wave(i, half).add(&wave(-i, half)),
            Function::Sinh => wave(one, half).add(&wave(-one, -half)),
            Function::Cosh => wave(one, half).add(&wave(-one, half)),
            _ => return Err(not_closed()),
        };
        Ok(result)
    }

    /// The real part as a real-valued expression in `var`: a sum of
    /// `c * var^k * exp(alpha var) * cos/sin(beta var)` terms.
    ///
    /// Terms with matching `(k, alpha, beta)` are merged and coefficients and
    /// rates within `1e-12` of a small rational are snapped to it. A term is
    /// dropped when its coefficient scaled by its rate is negligible, so a fast
    /// transient with a tiny coefficient still carries its share of `x'(0)`.
    pub fn to_real_expr(&self, var: &str) -> Expr {
        let mut parts: Vec<RealPart> = Vec::new();
        for term in &self.terms {
            let alpha = term.rate.re;
            let beta = term.rate.im.abs();
            let oscillating = beta > RATE_TOLERANCE * (1.0 + alpha.abs());
            for (power, q) in term.poly.iter().enumerate() {
                let (cos, sin) = if oscillating {
                    (q.re, -q.im * term.rate.im.signum())
                } else {
                    (q.re, 0.0)
                };
                let beta = if oscillating { beta } else { 0.0 };
                match parts.iter_mut().find(|p| p.matches(power, alpha, beta)) {
                    Some(part) => {
                        part.cos += cos;
                        part.sin += sin;
                    }
                    None => parts.push(RealPart {
                        power,
                        alpha,
                        beta,
                        cos,
                        sin,
                    }),
                }
            }
        }

        let largest = parts
            .iter()
            .map(|p| p.cos.abs().max(p.sin.abs()) * p.weight())
            .fold(0.0, f64::max);
        let cutoff = COEFFICIENT_CUTOFF * largest;
        parts.sort_by(|a, b| {
            a.beta
                .total_cmp(&b.beta)
                .then(a.alpha.total_cmp(&b.alpha))
                .then(a.power.cmp(&b.power))
        });

        let t = Expr::symbol(var);
        let mut addends = Vec::new();
        for part in parts {
            let alpha = snap(part.alpha);
            let beta = snap(part.beta);
            let weight = part.weight();
            if part.cos.abs() * weight > cutoff {
                let trig = (!beta.is_zero()).then_some(Function::Cos);
                addends.push(real_addend(part.cos, part.power, alpha, trig, beta, &t));
            }
            if part.sin.abs() * weight > cutoff && !beta.is_zero() {
                addends.push(real_addend(
                    part.sin,
                    part.power,
                    alpha,
                    Some(Function::Sin),
                    beta,
                    &t,
                ));
            }
        }
        Expr::sum(addends)
    }
}

struct RealPart {
    power: usize,
    alpha: f64,
    beta: f64,
    cos: f64,
    sin: f64,
}

impl RealPart {
    fn matches(&self, power: usize, alpha: f64, beta: f64) -> bool {
        let close = |x: f64, y: f64| (x - y).abs() <= RATE_TOLERANCE * (1.0 + x.abs().max(y.abs()));
        self.power == power && close(self.alpha, alpha) && close(self.beta, beta)
    }

    fn weight(&self) -> f64 {
        self.alpha.hypot(self.beta).max(1.0)
    }
}

fn real_addend(
    coefficient: f64,
    power: usize,
    alpha: Number,
    trig: Option<Function>,
    beta: Number,
    t: &Expr,
) -> Expr {
    let scaled = |rate: Number| {
        if rate.is_one() {
            t.clone()
        } else {
            Expr::product(vec![Expr::Number(rate), t.clone()])
        }
    };
    let coefficient = snap(coefficient);
    let mut factors = Vec::new();
    if !coefficient.is_one() {
        factors.push(Expr::Number(coefficient));
    }
    match power {
        0 => {}
        1 => factors.push(t.clone()),
        k => factors.push(Expr::pow(t.clone(), Expr::integer(k as i128))),
    }
    if !alpha.is_zero() {
        factors.push(Expr::call(Function::Exp, scaled(alpha)));
    }
    if let Some(function) = trig {
        factors.push(Expr::call(function, scaled(beta)));
    }
    Expr::product(factors)
}

/// The small rational within `1e-12` of `value`, if there is one. Nonzero
/// values never snap to zero.
pub(crate) fn snap(value: f64) -> Number {
    if let Some(r) = limit_denominator(value, SNAP_DENOMINATOR) {
        let close = (rational::to_f64(&r) - value).abs() <= SNAP_TOLERANCE * value.abs().max(1.0);
        if close && (value == 0.0 || !r.is_zero()) {
            return Number::Rational(r);
        }
    }
    Number::Float(value)
}

fn is_positive_real(z: Complex64) -> bool {
    z.im == 0.0 && z.re > 0.0
}

/// `e^(a + b t)`.
fn exp_affine(a: Complex64, b: Complex64) -> ExpPolynomial {
    ExpPolynomial::from_terms(vec![ExpTerm::new(b, vec![a.exp()])])
}

fn constant_of(expr: &Expr) -> Result<Complex64, ForcingError> {
    if let Some(symbol) = expr.free_symbols().into_iter().next() {
        return Err(ForcingError::UnknownSymbol(symbol));
    }
    expr.numeric_value()
        .map(|v| Complex64::new(v, 0.0))
        .ok_or_else(|| ForcingError::NonFinite(expr.to_string()))
}

fn check_degree(poly: &ExpPolynomial, expr: &Expr, max_power: u32) -> Result<(), ForcingError> {
    if poly.degree() > max_power as usize {
        return Err(ForcingError::DegreeTooHigh {
            expr: expr.to_string(),
            limit: max_power,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;

    fn decompose(input: &str) -> Result<ExpPolynomial, ForcingError> {
        ExpPolynomial::from_expr(&parse(input).unwrap(), "t", 64)
    }

    fn assert_matches_expression(input: &str) {
        let expr = parse(input).unwrap();
        let poly = decompose(input).unwrap();
        for t in [0.0, 0.4, 1.3, 2.9] {
            let expected = expr.substitute("t", &Expr::float(t)).numeric_value().unwrap();
            let actual = poly.value_at(t);
            assert!(
                (actual.re - expected).abs() < 1e-10 * (1.0 + expected.abs()),
                "{input} at {t}: {actual} vs {expected}"
            );
            assert!(actual.im.abs() < 1e-10 * (1.0 + expected.abs()));
        }
    }

    #[test]
    fn decomposes_supported_forcing_terms() {
        assert_matches_expression("3*t^2 - t + 5");
        assert_matches_expression("sin(2*t)");
        assert_matches_expression("cos(t + 1)*exp(-t/3)");
        assert_matches_expression("t*sinh(t) + cosh(2*t)");
        assert_matches_expression("sin(t)^2");
        assert_matches_expression("2^t + e^(1 - t)");
        assert_matches_expression("exp(t)^-2");
        assert_matches_expression("(t + 1)^3*sin(t)");
    }

    #[test]
    fn merges_equal_rates() {
        let poly = decompose("sin(t)^2 + cos(t)^2").unwrap();
        assert_eq!(poly.terms().len(), 1);
        let value = poly.value_at(0.7);
        assert!((value.re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_closed_forms() {
        for input in ["1/(1 + t)", "sin(t^2)", "ln(t)", "t^t", "sqrt(t)", "tan(t)"] {
            assert!(
                matches!(
                    decompose(input),
                    Err(ForcingError::NotExponentialPolynomial(_))
                ),
                "{input} should be rejected"
            );
        }
        assert!(matches!(
            ExpPolynomial::from_expr(&parse("t^5").unwrap(), "t", 4),
            Err(ForcingError::DegreeTooHigh { .. })
        ));
        assert!(matches!(
            decompose("sin(w*t)"),
            Err(ForcingError::NotExponentialPolynomial(_))
        ));
        assert!(matches!(decompose("a + t"), Err(ForcingError::UnknownSymbol(_))));
    }

    #[test]
    fn derivative_matches_symbolic() {
        let expr = parse("t^2*exp(-t)*cos(3*t)").unwrap();
        let derivative = expr.derivative("t");
        let poly = decompose("t^2*exp(-t)*cos(3*t)").unwrap().derivative();
        for t in [0.2, 1.1] {
            let expected = derivative
                .substitute("t", &Expr::float(t))
                .numeric_value()
                .unwrap();
            assert!((poly.value_at(t).re - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn real_form_snaps_to_exact_trigonometry() {
        let half = Complex64::new(0.5, 0.0);
        let i = Complex64::new(0.0, 1.0);
        let poly = ExpPolynomial::from_terms(vec![
            ExpTerm::new(i, vec![half]),
            ExpTerm::new(-i, vec![half]),
        ]);
        assert_eq!(poly.to_real_expr("t").to_string(), "cos(t)");

        let decaying = decompose("2*exp(-t/2)*sin(3*t)").unwrap();
        assert_eq!(decaying.to_real_expr("t").to_string(), "2*exp(-t/2)*sin(3*t)");
    }

    #[test]
    fn snap_keeps_irrational_values() {
        assert_eq!(snap(0.25), Number::Rational(crate::rational::Rational::new(1, 4)));
        assert!(matches!(snap(2f64.sqrt()), Number::Float(_)));
        assert_eq!(snap(-1e-16), Number::Float(-1e-16));
        assert!(snap(0.0).is_zero());
    }

    #[test]
    fn fast_transients_survive_the_cutoff() {
        // 1 e^(-1e-8 t) - 1e-16 e^(-1e8 t): the second term fixes x'(0) = 0.
        let poly = ExpPolynomial::from_terms(vec![
            ExpTerm::new(Complex64::new(-1e-8, 0.0), vec![Complex64::new(1.0, 0.0)]),
            ExpTerm::new(Complex64::new(-1e8, 0.0), vec![Complex64::new(-1e-16, 0.0)]),
        ]);
        let real = poly.to_real_expr("t");
        let Expr::Add(terms) = &real else {
            panic!("expected two terms, got {real}");
        };
        assert_eq!(terms.len(), 2);
        let slope = real.derivative("t").substitute("t", &Expr::zero());
        assert!(slope.numeric_value().unwrap().abs() < 1e-20);
    }
}
