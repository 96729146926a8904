use super::expr::{Constant, Expr, Function};
use crate::rational::Rational;

impl Expr {
    /// Symbolic derivative with respect to `var`, simplified.
    pub fn derivative(&self, var: &str) -> Expr {
        self.differentiate(var).simplify()
    }

    fn differentiate(&self, var: &str) -> Expr {
        if !self.depends_on(var) {
            return Expr::zero();
        }
        match self {
            Self::Number(_) | Self::Constant(_) => Expr::zero(),
            Self::Symbol(_) => Expr::one(),
            Self::Add(terms) => Expr::sum(terms.iter().map(|t| t.differentiate(var)).collect()),
            Self::Mul(factors) => {
                // Product rule over n factors.
                let mut terms = Vec::new();
                for (i, factor) in factors.iter().enumerate() {
                    if !factor.depends_on(var) {
                        continue;
                    }
                    let mut product = factors.clone();
                    product[i] = factor.differentiate(var);
                    terms.push(Expr::product(product));
                }
                Expr::sum(terms)
            }
            Self::Pow(base, exponent) => {
                let base = base.as_ref();
                let exponent = exponent.as_ref();
                if !exponent.depends_on(var) {
                    // d(u^n) = n u^(n-1) u'
                    let lowered = Expr::add(exponent.clone(), Expr::integer(-1));
                    Expr::product(vec![
                        exponent.clone(),
                        Expr::pow(base.clone(), lowered),
                        base.differentiate(var),
                    ])
                } else if !base.depends_on(var) {
                    // d(a^v) = a^v ln(a) v'
                    let mut factors = vec![self.clone(), exponent.differentiate(var)];
                    if *base != Expr::Constant(Constant::E) {
                        factors.push(Expr::call(Function::Ln, base.clone()));
                    }
                    Expr::product(factors)
                } else {
                    // d(u^v) = u^v (v' ln(u) + v u'/u)
                    Expr::product(vec![
                        self.clone(),
                        Expr::add(
                            Expr::mul(
                                exponent.differentiate(var),
                                Expr::call(Function::Ln, base.clone()),
                            ),
                            Expr::product(vec![
                                exponent.clone(),
                                base.differentiate(var),
                                Expr::pow(base.clone(), Expr::integer(-1)),
                            ]),
                        ),
                    ])
                }
            }
            Self::Call(function, arg) => {
                let outer = outer_derivative(*function, arg);
                Expr::mul(outer, arg.differentiate(var))
            }
            Self::Unknown { name, order, arg } => {
                let raised = Expr::unknown(name.clone(), order + 1, (**arg).clone());
                if **arg == Expr::Symbol(var.to_string()) {
                    raised
                } else {
                    Expr::mul(raised, arg.differentiate(var))
                }
            }
        }
    }
}

/// `f'(u)` for an elementary function `f`.
fn outer_derivative(function: Function, u: &Expr) -> Expr {
    let u = u.clone();
    let square = |e: Expr| Expr::pow(e, Expr::integer(2));
    let inverse_sqrt = |e: Expr| Expr::pow(e, Expr::rational(Rational::new(-1, 2)));
    match function {
        Function::Sin => Expr::call(Function::Cos, u),
        Function::Cos => Expr::neg(Expr::call(Function::Sin, u)),
        Function::Tan => Expr::pow(Expr::call(Function::Cos, u), Expr::integer(-2)),
        Function::Exp => Expr::call(Function::Exp, u),
        Function::Ln => Expr::pow(u, Expr::integer(-1)),
        Function::Sqrt => Expr::mul(Expr::rational(Rational::new(1, 2)), inverse_sqrt(u)),
        Function::Sinh => Expr::call(Function::Cosh, u),
        Function::Cosh => Expr::call(Function::Sinh, u),
        Function::Tanh => Expr::sub(Expr::one(), square(Expr::call(Function::Tanh, u))),
        Function::Asin => inverse_sqrt(Expr::sub(Expr::one(), square(u))),
        Function::Acos => Expr::neg(inverse_sqrt(Expr::sub(Expr::one(), square(u)))),
        Function::Atan => Expr::pow(Expr::add(Expr::one(), square(u)), Expr::integer(-1)),
        Function::Abs => Expr::mul(
            u.clone(),
            Expr::pow(Expr::call(Function::Abs, u), Expr::integer(-1)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use crate::expression::{parse, Expr};

    fn at(expr: &Expr, t: f64) -> f64 {
        expr.substitute("t", &Expr::float(t)).numeric_value().unwrap()
    }

    fn check_against_central_difference(input: &str, points: &[f64]) {
        let expr = parse(input).unwrap();
        let derivative = expr.derivative("t");
        let h = 1e-6;
        for &t in points {
            let numeric = (at(&expr, t + h) - at(&expr, t - h)) / (2.0 * h);
            let symbolic = at(&derivative, t);
            assert!(
                (numeric - symbolic).abs() < 1e-5 * (1.0 + symbolic.abs()),
                "d/dt {input} at {t}: symbolic {symbolic}, numeric {numeric}"
            );
        }
    }

    #[test]
    fn polynomial_and_product_rules() {
        assert_eq!(
            parse("3*t^2 + 2*t + 7").unwrap().derivative("t"),
            parse("6*t + 2").unwrap().simplify()
        );
        check_against_central_difference("t^3*(t - 2)/5", &[-1.0, 0.5, 2.0]);
    }

    #[test]
    fn elementary_functions_follow_chain_rule() {
        check_against_central_difference("sin(2*t) + cos(t^2)", &[0.1, 1.3]);
        check_against_central_difference("exp(-t/2)*sin(3*t)", &[0.0, 0.7, 2.5]);
        check_against_central_difference("tan(t) + ln(t) + sqrt(t)", &[0.4, 1.1]);
        check_against_central_difference("sinh(t) + cosh(2*t) + tanh(t)", &[-0.5, 0.9]);
        check_against_central_difference("asin(t/2) + acos(t/3) + atan(t)", &[0.2, 0.8]);
        check_against_central_difference("abs(t - 1)", &[0.3, 2.0]);
    }

    #[test]
    fn exponential_bases() {
        check_against_central_difference("2^t + e^(3*t)", &[0.0, 1.5]);
        check_against_central_difference("t^t", &[0.5, 1.5]);
    }

    #[test]
    fn unknown_functions_raise_order() {
        let x = Expr::unknown("x", 0, Expr::symbol("t"));
        assert_eq!(x.derivative("t"), Expr::unknown("x", 1, Expr::symbol("t")));
        assert_eq!(
            x.derivative("t").derivative("t"),
            Expr::unknown("x", 2, Expr::symbol("t"))
        );
        assert_eq!(x.derivative("s"), Expr::zero());
    }
}
