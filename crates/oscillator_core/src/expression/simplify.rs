use super::expr::{Constant, Expr, Function, Number};
use std::cmp::Ordering;

impl Expr {
    /// Returns an equivalent, canonicalised expression.
    ///
    /// Flattens sums and products, folds numbers (exactly for rationals),
    /// collects like terms and like bases, drops identities and folds the
    /// elementary functions at their trivial points.
    pub fn simplify(&self) -> Expr {
        match self {
            Self::Number(_) | Self::Constant(_) | Self::Symbol(_) => self.clone(),
            Self::Add(items) => simplify_sum(items.iter().map(Self::simplify).collect()),
            Self::Mul(items) => simplify_product(items.iter().map(Self::simplify).collect()),
            Self::Pow(base, exponent) => simplify_pow(base.simplify(), exponent.simplify()),
            Self::Call(function, arg) => simplify_call(*function, arg.simplify()),
            Self::Unknown { name, order, arg } => {
                Self::unknown(name.clone(), *order, arg.simplify())
            }
        }
    }
}

/// Splits a term into its numeric coefficient and the remaining factor.
fn split_coefficient(term: Expr) -> (Number, Expr) {
    match term {
        Expr::Number(n) => (n, Expr::one()),
        Expr::Mul(factors) => {
            let mut coefficient = Number::integer(1);
            let mut rest = Vec::with_capacity(factors.len());
            for factor in factors {
                match factor {
                    Expr::Number(n) => coefficient = coefficient.mul(n),
                    other => rest.push(other),
                }
            }
            (coefficient, Expr::product(rest))
        }
        other => (Number::integer(1), other),
    }
}

fn with_coefficient(coefficient: Number, rest: Expr) -> Expr {
    if coefficient.is_zero() {
        Expr::zero()
    } else if rest.is_one() {
        Expr::Number(coefficient)
    } else if coefficient.is_one() {
        rest
    } else {
        Expr::product(vec![Expr::Number(coefficient), rest])
    }
}

fn simplify_sum(items: Vec<Expr>) -> Expr {
    let mut constant = Number::integer(0);
    let mut collected: Vec<(Number, Expr)> = Vec::new();

    for item in items {
        let terms = match item {
            Expr::Add(inner) => inner,
            other => vec![other],
        };
        for term in terms {
            let (coefficient, rest) = split_coefficient(term);
            if rest.is_one() {
                constant = constant.add(coefficient);
                continue;
            }
            match collected.iter_mut().find(|(_, existing)| *existing == rest) {
                Some((total, _)) => *total = total.add(coefficient),
                None => collected.push((coefficient, rest)),
            }
        }
    }

    let mut terms: Vec<Expr> = collected
        .into_iter()
        .filter(|(coefficient, _)| !coefficient.is_zero())
        .map(|(coefficient, rest)| with_coefficient(coefficient, rest))
        .collect();
    if !constant.is_zero() {
        terms.push(Expr::Number(constant));
    }
    Expr::sum(terms)
}

/// Splits a factor into `(base, exponent)`.
fn split_power(factor: Expr) -> (Expr, Expr) {
    match factor {
        Expr::Pow(base, exponent) => (*base, *exponent),
        other => (other, Expr::one()),
    }
}

fn simplify_product(items: Vec<Expr>) -> Expr {
    let mut coefficient = Number::integer(1);
    let mut bases: Vec<(Expr, Vec<Expr>)> = Vec::new();

    for item in items {
        let factors = match item {
            Expr::Mul(inner) => inner,
            other => vec![other],
        };
        for factor in factors {
            if let Expr::Number(n) = factor {
                coefficient = coefficient.mul(n);
                continue;
            }
            let (base, exponent) = split_power(factor);
            match bases.iter_mut().find(|(existing, _)| *existing == base) {
                Some((_, exponents)) => exponents.push(exponent),
                None => bases.push((base, vec![exponent])),
            }
        }
    }

    if coefficient.is_zero() {
        return Expr::zero();
    }

    let mut factors = Vec::with_capacity(bases.len());
    for (base, exponents) in bases {
        let exponent = if exponents.len() == 1 {
            exponents.into_iter().next().unwrap_or_else(Expr::one)
        } else {
            simplify_sum(exponents)
        };
        match simplify_pow(base, exponent) {
            Expr::Number(n) => coefficient = coefficient.mul(n),
            Expr::Mul(inner) => {
                for factor in inner {
                    match factor {
                        Expr::Number(n) => coefficient = coefficient.mul(n),
                        other => factors.push(other),
                    }
                }
            }
            other => factors.push(other),
        }
    }

    if coefficient.is_zero() {
        return Expr::zero();
    }
    factors.sort_by(factor_order);

    // A bare number times a single sum distributes over it: 2*(t + 1) -> 2*t + 2.
    if !coefficient.is_one() && factors.len() == 1 {
        if let Expr::Add(terms) = &factors[0] {
            return simplify_sum(
                terms
                    .iter()
                    .map(|term| simplify_product(vec![Expr::Number(coefficient), term.clone()]))
                    .collect(),
            );
        }
    }

    with_coefficient(coefficient, Expr::product(factors))
}

fn factor_rank(factor: &Expr) -> u8 {
    match factor {
        Expr::Number(_) => 0,
        Expr::Constant(_) => 1,
        Expr::Symbol(_) | Expr::Unknown { .. } => 2,
        Expr::Pow(base, _) if matches!(**base, Expr::Symbol(_)) => 2,
        Expr::Call(Function::Exp, _) => 3,
        Expr::Call(..) => 4,
        Expr::Pow(..) => 5,
        Expr::Add(_) => 6,
        Expr::Mul(_) => 7,
    }
}

fn factor_order(a: &Expr, b: &Expr) -> Ordering {
    factor_rank(a)
        .cmp(&factor_rank(b))
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

fn simplify_pow(base: Expr, exponent: Expr) -> Expr {
    if exponent.is_zero() {
        return Expr::one();
    }
    if exponent.is_one() {
        return base;
    }
    if base.is_one() {
        return Expr::one();
    }
    if let (Some(b), Some(e)) = (base.as_number(), exponent.as_number()) {
        if b.is_zero() && !e.is_negative() {
            return Expr::zero();
        }
        if let Some(value) = b.pow(e) {
            return Expr::Number(value);
        }
    }
    if base == Expr::Constant(Constant::E) {
        return simplify_call(Function::Exp, exponent);
    }

    let integer_exponent = exponent.as_number().and_then(Number::as_integer);
    match (base, integer_exponent) {
        (Expr::Pow(inner_base, inner_exponent), Some(_)) => {
            let combined = simplify_product(vec![*inner_exponent, exponent]);
            simplify_pow(*inner_base, combined)
        }
        (Expr::Mul(factors), Some(_)) => simplify_product(
            factors
                .into_iter()
                .map(|factor| simplify_pow(factor, exponent.clone()))
                .collect(),
        ),
        (Expr::Call(Function::Exp, arg), Some(_)) => {
            simplify_call(Function::Exp, simplify_product(vec![*arg, exponent]))
        }
        (base, _) => Expr::pow(base, exponent),
    }
}

fn simplify_call(function: Function, arg: Expr) -> Expr {
    if arg.is_zero() {
        match function {
            Function::Cos | Function::Cosh | Function::Exp => return Expr::one(),
            Function::Sin
            | Function::Tan
            | Function::Sinh
            | Function::Tanh
            | Function::Asin
            | Function::Atan
            | Function::Sqrt
            | Function::Abs => return Expr::zero(),
            Function::Ln | Function::Acos => {}
        }
    }
    match (function, &arg) {
        (Function::Ln, a) if a.is_one() => return Expr::zero(),
        (Function::Ln, Expr::Constant(Constant::E)) => return Expr::one(),
        (Function::Exp, Expr::Call(Function::Ln, inner)) => return (**inner).clone(),
        (Function::Ln, Expr::Call(Function::Exp, inner)) => return (**inner).clone(),
        (Function::Abs, Expr::Number(n)) => return Expr::Number(n.abs()),
        (_, Expr::Number(Number::Float(x))) => {
            let value = function.apply(*x);
            if value.is_finite() {
                return Expr::float(value);
            }
        }
        _ => {}
    }
    Expr::call(function, arg)
}

#[cfg(test)]
mod tests {
    use crate::expression::{parse, Expr};
    use crate::rational::Rational;

    fn simplified(input: &str) -> Expr {
        parse(input).unwrap().simplify()
    }

    #[test]
    fn folds_numbers_exactly() {
        assert_eq!(simplified("1/3 + 1/6"), Expr::rational(Rational::new(1, 2)));
        assert_eq!(simplified("2^10"), Expr::integer(1024));
        assert_eq!(simplified("(2/3)^-2"), Expr::rational(Rational::new(9, 4)));
    }

    #[test]
    fn collects_like_terms_and_bases() {
        assert_eq!(simplified("t + t"), simplified("2*t"));
        assert_eq!(simplified("t*t*t"), simplified("t^3"));
        assert_eq!(simplified("3*t - 3*t"), Expr::zero());
        assert_eq!(simplified("t^2/t"), Expr::symbol("t"));
        assert_eq!(simplified("x*t - t*x"), Expr::zero());
    }

    #[test]
    fn removes_identities() {
        assert_eq!(simplified("0 + 1*t^1"), Expr::symbol("t"));
        assert_eq!(simplified("t^0"), Expr::one());
        assert_eq!(simplified("0*sin(t)"), Expr::zero());
    }

    #[test]
    fn folds_trivial_function_values() {
        assert_eq!(simplified("sin(0) + cos(0) + exp(0) + ln(1)"), Expr::integer(2));
        assert_eq!(simplified("exp(ln(t))"), Expr::symbol("t"));
        assert_eq!(simplified("log(e)"), Expr::one());
        assert_eq!(simplified("e^t"), simplified("exp(t)"));
    }

    #[test]
    fn distributes_numeric_coefficients() {
        assert_eq!(simplified("2*(t + 1)"), simplified("2*t + 2"));
        assert_eq!(simplified("-(t - 1)"), simplified("1 - t"));
    }

    #[test]
    fn preserves_value() {
        let expr = parse("3*exp(-t/2)*cos(2*t) - t^2*(t + 1)/4 + 2*t*t").unwrap();
        let simple = expr.simplify();
        for t in [0.0, 0.3, 1.7, -2.2] {
            let a = expr.substitute("t", &Expr::float(t)).numeric_value().unwrap();
            let b = simple.substitute("t", &Expr::float(t)).numeric_value().unwrap();
            assert!((a - b).abs() < 1e-12, "{a} vs {b} at t = {t}");
        }
    }
}
