use crate::rational::{self, Rational};
use crate::traits::Scalar;
use num_traits::{CheckedAdd, CheckedMul, One, Signed, Zero};
use std::collections::BTreeSet;

/// A numeric leaf: exact when it can be, floating-point otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Rational(Rational),
    Float(f64),
}

impl Number {
    pub fn integer(value: i128) -> Self {
        Self::Rational(Rational::from_integer(value))
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Self::Rational(r) => rational::to_f64(&r),
            Self::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Self::Rational(r) => r.is_zero(),
            Self::Float(f) => f == 0.0,
        }
    }

    pub fn is_one(self) -> bool {
        match self {
            Self::Rational(r) => r.is_one(),
            Self::Float(f) => f == 1.0,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Self::Rational(r) => r.is_negative(),
            Self::Float(f) => f < 0.0,
        }
    }

    /// The value as an integer, if it is an exact integer.
    pub fn as_integer(self) -> Option<i128> {
        match self {
            Self::Rational(r) if r.is_integer() => Some(*r.numer()),
            _ => None,
        }
    }

    pub fn add(self, other: Self) -> Self {
        if let (Self::Rational(a), Self::Rational(b)) = (self, other) {
            if let Some(sum) = a.checked_add(&b) {
                return Self::Rational(sum);
            }
        }
        Self::Float(self.to_f64() + other.to_f64())
    }

    pub fn mul(self, other: Self) -> Self {
        if let (Self::Rational(a), Self::Rational(b)) = (self, other) {
            if let Some(product) = a.checked_mul(&b) {
                return Self::Rational(product);
            }
        }
        Self::Float(self.to_f64() * other.to_f64())
    }

    pub fn neg(self) -> Self {
        match self {
            Self::Rational(r) => Self::Rational(-r),
            Self::Float(f) => Self::Float(-f),
        }
    }

    pub fn abs(self) -> Self {
        if self.is_negative() {
            self.neg()
        } else {
            self
        }
    }

    /// `self ^ exponent` when the result is a number: exact for rational bases
    /// raised to small integer powers, floating-point when either side is a
    /// float. Rational bases with fractional exponents stay symbolic (`None`).
    pub fn pow(self, exponent: Self) -> Option<Self> {
        match (self, exponent) {
            (Self::Rational(base), Self::Rational(_)) => {
                let n = exponent.as_integer()?;
                if n.unsigned_abs() > 64 {
                    return None;
                }
                if n < 0 && base.is_zero() {
                    return None;
                }
                let mut acc = Rational::one();
                for _ in 0..n.unsigned_abs() {
                    acc = acc.checked_mul(&base)?;
                }
                Some(Self::Rational(if n < 0 { acc.recip() } else { acc }))
            }
            _ => {
                let value = self.to_f64().powf(exponent.to_f64());
                value.is_finite().then_some(Self::Float(value))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Self::Pi => std::f64::consts::PI,
            Self::E => std::f64::consts::E,
        }
    }
}

/// Elementary functions understood by the parser, the differentiator and the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Sinh,
    Cosh,
    Tanh,
    Asin,
    Acos,
    Atan,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "sqrt" => Self::Sqrt,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "abs" => Self::Abs,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Exp => "exp",
            Self::Ln => "log",
            Self::Sqrt => "sqrt",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Abs => "abs",
        }
    }

    pub fn apply<T: Scalar>(self, x: T) -> T {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Abs => x.abs(),
        }
    }
}

/// Symbolic expression tree.
///
/// Subtraction is stored as addition of a `-1` multiple and division as a
/// product with a `-1` power, so sums and products stay n-ary and flat.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Number),
    Constant(Constant),
    Symbol(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
    /// The `order`-th derivative of an undetermined function, e.g. `x''(t)`.
    Unknown {
        name: String,
        order: u32,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn zero() -> Self {
        Self::integer(0)
    }

    pub fn one() -> Self {
        Self::integer(1)
    }

    pub fn integer(value: i128) -> Self {
        Self::Number(Number::integer(value))
    }

    pub fn rational(value: Rational) -> Self {
        Self::Number(Number::Rational(value))
    }

    pub fn float(value: f64) -> Self {
        Self::Number(Number::Float(value))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn call(function: Function, arg: Expr) -> Self {
        Self::Call(function, Box::new(arg))
    }

    pub fn unknown(name: impl Into<String>, order: u32, arg: Expr) -> Self {
        Self::Unknown {
            name: name.into(),
            order,
            arg: Box::new(arg),
        }
    }

    /// `a + b`, flattening nested sums.
    pub fn add(a: Expr, b: Expr) -> Self {
        Self::sum(vec![a, b])
    }

    pub fn sum(terms: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Self::Add(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::zero(),
            1 => flat.remove(0),
            _ => Self::Add(flat),
        }
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Self::add(a, Self::neg(b))
    }

    /// `a * b`, flattening nested products.
    pub fn mul(a: Expr, b: Expr) -> Self {
        Self::product(vec![a, b])
    }

    pub fn product(factors: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Self::Mul(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::one(),
            1 => flat.remove(0),
            _ => Self::Mul(flat),
        }
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        if let Self::Number(Number::Rational(r)) = &b {
            if !r.is_zero() {
                return Self::mul(Self::rational(r.recip()), a);
            }
        }
        Self::mul(a, Self::pow(b, Self::integer(-1)))
    }

    pub fn neg(a: Expr) -> Self {
        match a {
            Self::Number(n) => Self::Number(n.neg()),
            other => Self::mul(Self::integer(-1), other),
        }
    }

    pub fn pow(base: Expr, exponent: Expr) -> Self {
        Self::Pow(Box::new(base), Box::new(exponent))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_number().is_some_and(Number::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.as_number().is_some_and(Number::is_one)
    }

    /// True if `var` occurs anywhere in the tree.
    pub fn depends_on(&self, var: &str) -> bool {
        match self {
            Self::Number(_) | Self::Constant(_) => false,
            Self::Symbol(name) => name == var,
            Self::Add(items) | Self::Mul(items) => items.iter().any(|e| e.depends_on(var)),
            Self::Pow(base, exponent) => base.depends_on(var) || exponent.depends_on(var),
            Self::Call(_, arg) => arg.depends_on(var),
            Self::Unknown { arg, .. } => arg.depends_on(var),
        }
    }

    /// Names of every symbol in the tree.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Number(_) | Self::Constant(_) => {}
            Self::Symbol(name) => {
                out.insert(name.clone());
            }
            Self::Add(items) | Self::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Self::Pow(base, exponent) => {
                base.collect_symbols(out);
                exponent.collect_symbols(out);
            }
            Self::Call(_, arg) | Self::Unknown { arg, .. } => arg.collect_symbols(out),
        }
    }

    /// Replaces every occurrence of the symbol `var` with `value`.
    pub fn substitute(&self, var: &str, value: &Expr) -> Expr {
        match self {
            Self::Symbol(name) if name == var => value.clone(),
            Self::Number(_) | Self::Constant(_) | Self::Symbol(_) => self.clone(),
            Self::Add(items) => Self::sum(items.iter().map(|e| e.substitute(var, value)).collect()),
            Self::Mul(items) => {
                Self::product(items.iter().map(|e| e.substitute(var, value)).collect())
            }
            Self::Pow(base, exponent) => Self::pow(
                base.substitute(var, value),
                exponent.substitute(var, value),
            ),
            Self::Call(function, arg) => Self::call(*function, arg.substitute(var, value)),
            Self::Unknown { name, order, arg } => {
                Self::unknown(name.clone(), *order, arg.substitute(var, value))
            }
        }
    }

    /// Rounds every numeric leaf, constant and numeric sub-expression to
    /// `digits` significant digits. Integer exponents and unit coefficients are
    /// kept exact so `t**2` and `-t` print as such.
    pub fn round_numbers(&self, digits: usize) -> Expr {
        if !matches!(self, Self::Number(_)) && self.free_symbols().is_empty() {
            if let Some(value) = self.numeric_value() {
                return Self::float(round_significant(value, digits));
            }
        }
        match self {
            Self::Number(Number::Rational(r)) if r.is_integer() && r.abs() <= Rational::one() => {
                self.clone()
            }
            Self::Number(n) => Self::float(round_significant(n.to_f64(), digits)),
            Self::Constant(_) | Self::Symbol(_) => self.clone(),
            Self::Add(items) => Self::Add(items.iter().map(|e| e.round_numbers(digits)).collect()),
            Self::Mul(items) => Self::Mul(items.iter().map(|e| e.round_numbers(digits)).collect()),
            Self::Pow(base, exponent) => {
                let exponent = if exponent.as_number().and_then(Number::as_integer).is_some() {
                    (**exponent).clone()
                } else {
                    exponent.round_numbers(digits)
                };
                Self::pow(base.round_numbers(digits), exponent)
            }
            Self::Call(function, arg) => Self::call(*function, arg.round_numbers(digits)),
            Self::Unknown { name, order, arg } => {
                Self::unknown(name.clone(), *order, arg.round_numbers(digits))
            }
        }
    }

    /// Value of a symbol-free tree, if it is finite.
    pub fn numeric_value(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => n.to_f64(),
            Self::Constant(c) => c.value(),
            Self::Symbol(_) | Self::Unknown { .. } => return None,
            Self::Add(items) => items
                .iter()
                .map(Self::numeric_value)
                .sum::<Option<f64>>()?,
            Self::Mul(items) => items
                .iter()
                .map(Self::numeric_value)
                .product::<Option<f64>>()?,
            Self::Pow(base, exponent) => {
                let base = base.numeric_value()?;
                match exponent.as_number().and_then(Number::as_integer) {
                    Some(n) if n.unsigned_abs() <= i32::MAX as u128 => base.powi(n as i32),
                    _ => base.powf(exponent.numeric_value()?),
                }
            }
            Self::Call(function, arg) => function.apply(arg.numeric_value()?),
        };
        value.is_finite().then_some(value)
    }
}

/// `lhs = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Self { lhs, rhs }
    }

    /// Rounds only the right-hand side.
    pub fn round_rhs(&self, digits: usize) -> Self {
        Self::new(self.lhs.clone(), self.rhs.round_numbers(digits))
    }

    /// Rounds both sides.
    pub fn round_numbers(&self, digits: usize) -> Self {
        Self::new(self.lhs.round_numbers(digits), self.rhs.round_numbers(digits))
    }
}

pub fn round_significant(value: f64, digits: usize) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let shift = digits as i32 - 1 - magnitude;
    if shift >= 0 {
        let factor = 10f64.powi(shift);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-shift);
        (value / factor).round() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_significant_digits() {
        assert_eq!(round_significant(0.70710678, 4), 0.7071);
        assert_eq!(round_significant(123456.0, 4), 123500.0);
        assert_eq!(round_significant(-0.000123456, 4), -0.0001235);
        assert_eq!(round_significant(0.0, 4), 0.0);
    }

    #[test]
    fn exact_number_arithmetic_stays_rational() {
        let half = Number::Rational(Rational::new(1, 2));
        let third = Number::Rational(Rational::new(1, 3));
        assert_eq!(half.add(third), Number::Rational(Rational::new(5, 6)));
        assert_eq!(half.mul(third), Number::Rational(Rational::new(1, 6)));
        assert_eq!(
            half.pow(Number::integer(-2)),
            Some(Number::Rational(Rational::from_integer(4)))
        );
        assert_eq!(Number::integer(4).pow(Number::Rational(Rational::new(1, 2))), None);
        assert_eq!(half.add(Number::Float(0.25)), Number::Float(0.75));
    }

    #[test]
    fn substitution_and_dependencies() {
        let t = Expr::symbol("t");
        let expr = Expr::call(Function::Sin, Expr::mul(Expr::integer(2), t.clone()));
        assert!(expr.depends_on("t"));
        assert!(!expr.depends_on("x"));
        let at_zero = expr.substitute("t", &Expr::zero());
        assert_eq!(at_zero.numeric_value(), Some(0.0));
    }

    #[test]
    fn round_numbers_keeps_integer_exponents() {
        let t = Expr::symbol("t");
        let expr = Expr::mul(
            Expr::rational(Rational::new(1, 3)),
            Expr::pow(t, Expr::integer(2)),
        );
        let rounded = expr.round_numbers(4);
        assert_eq!(
            rounded,
            Expr::Mul(vec![
                Expr::float(0.3333),
                Expr::pow(Expr::symbol("t"), Expr::integer(2)),
            ])
        );
    }
}
