use super::expr::{Constant, Equation, Expr, Function, Number};
use crate::rational::Rational;
use num_traits::{One, Signed};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    /// `3*t**2/2 - exp(-t)*sin(t)`
    Plain,
    /// `\frac{3 t^{2}}{2} - e^{- t} \sin{\left(t \right)}`
    Latex,
    /// `3·t²/2 - exp(-t)·sin(t)`
    Pretty,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self, Style::Plain))
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

impl Expr {
    pub fn to_latex(&self) -> String {
        render(self, Style::Latex)
    }

    /// Unicode rendering with superscript powers and primes on derivatives.
    pub fn to_pretty(&self) -> String {
        render(self, Style::Pretty)
    }
}

impl Equation {
    pub fn to_latex(&self) -> String {
        format!("{} = {}", self.lhs.to_latex(), self.rhs.to_latex())
    }

    pub fn to_pretty(&self) -> String {
        format!("{} = {}", self.lhs.to_pretty(), self.rhs.to_pretty())
    }
}

fn render(expr: &Expr, style: Style) -> String {
    match expr {
        Expr::Number(n) => format_number(*n, style),
        Expr::Constant(c) => format_constant(*c, style),
        Expr::Symbol(name) => name.clone(),
        Expr::Add(terms) => render_sum(terms, style),
        Expr::Mul(_) => {
            let (negative, magnitude) = split_sign(expr);
            let body = render_product(&magnitude, style);
            if negative {
                format!("-{body}")
            } else {
                body
            }
        }
        Expr::Pow(base, exponent) => render_pow(base, exponent, style),
        Expr::Call(function, arg) => render_call(*function, arg, style),
        Expr::Unknown { name, order, arg } => render_unknown(name, *order, arg, style),
    }
}

fn format_number(n: Number, style: Style) -> String {
    match n {
        Number::Rational(r) if r.is_integer() => r.numer().to_string(),
        Number::Rational(r) => match style {
            Style::Latex => {
                let sign = if r.is_negative() { "-" } else { "" };
                format!("{sign}\\frac{{{}}}{{{}}}", r.numer().abs(), r.denom())
            }
            Style::Plain | Style::Pretty => format!("{}/{}", r.numer(), r.denom()),
        },
        Number::Float(x) => format_float(x),
    }
}

pub(crate) fn format_float(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn format_constant(c: Constant, style: Style) -> String {
    match (c, style) {
        (Constant::Pi, Style::Plain) => "pi".to_string(),
        (Constant::Pi, Style::Latex) => "\\pi".to_string(),
        (Constant::Pi, Style::Pretty) => "π".to_string(),
        (Constant::E, Style::Plain) => "E".to_string(),
        (Constant::E, Style::Latex | Style::Pretty) => "e".to_string(),
    }
}

/// Splits a leading negative coefficient off a term: `-3*t` becomes `(true, 3*t)`.
fn split_sign(term: &Expr) -> (bool, Expr) {
    match term {
        Expr::Number(n) if n.is_negative() => (true, Expr::Number(n.neg())),
        Expr::Mul(factors) => match factors.first() {
            Some(Expr::Number(n)) if n.is_negative() => {
                let magnitude = n.neg();
                let mut rest = Vec::with_capacity(factors.len());
                if !magnitude.is_one() {
                    rest.push(Expr::Number(magnitude));
                }
                rest.extend(factors[1..].iter().cloned());
                (true, Expr::product(rest))
            }
            _ => (false, term.clone()),
        },
        _ => (false, term.clone()),
    }
}

fn render_sum(terms: &[Expr], style: Style) -> String {
    let mut out = String::new();
    for (i, term) in terms.iter().enumerate() {
        let (negative, magnitude) = split_sign(term);
        let body = render(&magnitude, style);
        match (i, negative) {
            (0, true) => {
                out.push('-');
                out.push_str(&body);
            }
            (0, false) => out.push_str(&body),
            (_, true) => {
                out.push_str(" - ");
                out.push_str(&body);
            }
            (_, false) => {
                out.push_str(" + ");
                out.push_str(&body);
            }
        }
    }
    out
}

/// Separates a product into numerator and denominator factors.
fn fraction_parts(factors: &[Expr]) -> (Vec<Expr>, Vec<Expr>) {
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for factor in factors {
        match factor {
            Expr::Number(Number::Rational(r)) if !r.is_integer() => {
                if !r.numer().abs().is_one() {
                    numerator.push(Expr::integer(*r.numer()));
                } else if r.is_negative() {
                    numerator.push(Expr::integer(-1));
                }
                denominator.push(Expr::integer(*r.denom()));
            }
            Expr::Pow(base, exponent)
                if exponent.as_number().is_some_and(Number::is_negative) =>
            {
                let positive = exponent.as_number().map_or(Number::integer(1), Number::neg);
                if positive.is_one() {
                    denominator.push((**base).clone());
                } else {
                    denominator.push(Expr::pow((**base).clone(), Expr::Number(positive)));
                }
            }
            other => numerator.push(other.clone()),
        }
    }
    (numerator, denominator)
}

fn render_product(expr: &Expr, style: Style) -> String {
    let factors = match expr {
        Expr::Mul(factors) => factors.as_slice(),
        other => return render(other, style),
    };
    let (numerator, denominator) = fraction_parts(factors);
    let top = join_factors(&numerator, style);
    if denominator.is_empty() {
        return top;
    }
    let bottom = join_factors(&denominator, style);
    match style {
        Style::Latex => format!("\\frac{{{top}}}{{{bottom}}}"),
        Style::Plain | Style::Pretty => {
            if denominator.len() > 1 {
                format!("{top}/({bottom})")
            } else {
                format!("{top}/{bottom}")
            }
        }
    }
}

fn join_factors(factors: &[Expr], style: Style) -> String {
    if factors.is_empty() {
        return "1".to_string();
    }
    let mut out = String::new();
    for (i, factor) in factors.iter().enumerate() {
        let needs_parens = matches!(factor, Expr::Add(_))
            || factor.as_number().is_some_and(Number::is_negative) && i > 0;
        let body = if needs_parens {
            parenthesize(&render(factor, style), style)
        } else {
            render(factor, style)
        };
        if i > 0 {
            let separator = match style {
                Style::Plain => "*",
                Style::Pretty => "·",
                Style::Latex => {
                    if body.starts_with(|c: char| c.is_ascii_digit()) {
                        " \\cdot "
                    } else {
                        " "
                    }
                }
            };
            out.push_str(separator);
        }
        out.push_str(&body);
    }
    out
}

fn parenthesize(body: &str, style: Style) -> String {
    match style {
        Style::Latex => format!("\\left({body}\\right)"),
        Style::Plain | Style::Pretty => format!("({body})"),
    }
}

fn is_atom(expr: &Expr) -> bool {
    match expr {
        Expr::Number(Number::Rational(r)) => r.is_integer() && !r.is_negative(),
        Expr::Number(Number::Float(x)) => *x >= 0.0,
        Expr::Constant(_) | Expr::Symbol(_) | Expr::Call(..) | Expr::Unknown { .. } => true,
        Expr::Add(_) | Expr::Mul(_) | Expr::Pow(..) => false,
    }
}

fn render_pow(base: &Expr, exponent: &Expr, style: Style) -> String {
    let half = Rational::new(1, 2);
    if exponent.as_number() == Some(Number::Rational(half)) {
        let inner = render(base, style);
        return match style {
            Style::Latex => format!("\\sqrt{{{inner}}}"),
            Style::Plain => format!("sqrt({inner})"),
            Style::Pretty => format!("√({inner})"),
        };
    }
    if exponent.as_number().is_some_and(Number::is_negative) {
        // A lone reciprocal; products route these through `fraction_parts`.
        let reciprocal = Expr::Mul(vec![
            Expr::one(),
            Expr::pow(base.clone(), exponent.clone()),
        ]);
        return render_product(&reciprocal, style);
    }
    if *base == Expr::Constant(Constant::E) {
        return render_call(Function::Exp, exponent, style);
    }

    let base_text = if is_atom(base) {
        render(base, style)
    } else {
        parenthesize(&render(base, style), style)
    };
    match style {
        Style::Latex => format!("{base_text}^{{{}}}", render(exponent, style)),
        Style::Plain => {
            let exponent_text = if is_atom(exponent) {
                render(exponent, style)
            } else {
                parenthesize(&render(exponent, style), style)
            };
            format!("{base_text}**{exponent_text}")
        }
        Style::Pretty => match exponent.as_number().and_then(Number::as_integer) {
            Some(n) => format!("{base_text}{}", superscript(n)),
            None => format!("{base_text}^({})", render(exponent, style)),
        },
    }
}

fn superscript(n: i128) -> String {
    n.to_string()
        .chars()
        .map(|c| match c {
            '-' => '⁻',
            '0' => '⁰',
            '1' => '¹',
            '2' => '²',
            '3' => '³',
            '4' => '⁴',
            '5' => '⁵',
            '6' => '⁶',
            '7' => '⁷',
            '8' => '⁸',
            _ => '⁹',
        })
        .collect()
}

fn render_call(function: Function, arg: &Expr, style: Style) -> String {
    let inner = render(arg, style);
    match style {
        Style::Plain | Style::Pretty => format!("{}({inner})", function.name()),
        Style::Latex => match function {
            Function::Exp => format!("e^{{{inner}}}"),
            Function::Sqrt => format!("\\sqrt{{{inner}}}"),
            Function::Abs => format!("\\left|{{{inner}}}\\right|"),
            Function::Asin | Function::Acos | Function::Atan => {
                format!("\\operatorname{{{}}}{{\\left({inner} \\right)}}", function.name())
            }
            _ => format!("\\{}{{\\left({inner} \\right)}}", function.name()),
        },
    }
}

fn render_unknown(name: &str, order: u32, arg: &Expr, style: Style) -> String {
    let inner = render(arg, style);
    match style {
        Style::Plain => match order {
            0 => format!("{name}({inner})"),
            1 => format!("Derivative({name}({inner}), {inner})"),
            n => format!("Derivative({name}({inner}), ({inner}, {n}))"),
        },
        Style::Latex => {
            let applied = format!("{name}{{\\left({inner} \\right)}}");
            match order {
                0 => applied,
                1 => format!("\\frac{{d}}{{d {inner}}} {applied}"),
                n => format!("\\frac{{d^{{{n}}}}}{{d {inner}^{{{n}}}}} {applied}"),
            }
        }
        Style::Pretty => {
            let primes = match order {
                0 => String::new(),
                1 => "′".to_string(),
                2 => "″".to_string(),
                3 => "‴".to_string(),
                n => format!("⁽{}⁾", superscript(i128::from(n))),
            };
            format!("{name}{primes}({inner})")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::expression::{parse, Equation, Expr};

    fn plain(input: &str) -> String {
        parse(input).unwrap().simplify().to_string()
    }

    #[test]
    fn plain_text_reads_like_source() {
        assert_eq!(plain("cos(t)"), "cos(t)");
        assert_eq!(plain("3*t^2/2"), "3*t**2/2");
        assert_eq!(plain("t - 1"), "t - 1");
        assert_eq!(plain("-t + 2*sin(t)"), "-t + 2*sin(t)");
        assert_eq!(plain("exp(-t)*sin(t)/4"), "exp(-t)*sin(t)/4");
        assert_eq!(plain("1/t"), "1/t");
        assert_eq!(plain("(t + 1)^2"), "(t + 1)**2");
        assert_eq!(plain("2^(1/2)"), "sqrt(2)");
    }

    #[test]
    fn latex_uses_fractions_and_function_markup() {
        let expr = parse("t/2 - sin(3*t)").unwrap().simplify();
        assert_eq!(expr.to_latex(), "\\frac{t}{2} - \\sin{\\left(3 t \\right)}");
        let expr = parse("exp(-t)*cos(t)").unwrap().simplify();
        assert_eq!(expr.to_latex(), "e^{-t} \\cos{\\left(t \\right)}");
        assert_eq!(parse("pi").unwrap().to_latex(), "\\pi");
    }

    #[test]
    fn derivatives_print_per_style() {
        let t = Expr::symbol("t");
        let lhs = Expr::sum(vec![
            Expr::unknown("x", 2, t.clone()),
            Expr::mul(Expr::integer(4), Expr::unknown("x", 0, t.clone())),
        ]);
        let equation = Equation::new(lhs, Expr::zero());
        assert_eq!(
            equation.to_string(),
            "Derivative(x(t), (t, 2)) + 4*x(t) = 0"
        );
        assert_eq!(
            equation.to_latex(),
            "\\frac{d^{2}}{d t^{2}} x{\\left(t \\right)} + 4 x{\\left(t \\right)} = 0"
        );
        assert_eq!(equation.to_pretty(), "x″(t) + 4·x(t) = 0");
    }

    #[test]
    fn pretty_form_uses_superscripts() {
        let expr = parse("t^2*exp(-t/2) + pi").unwrap().simplify();
        assert_eq!(expr.to_pretty(), "t²·exp(-t/2) + π");
        assert_eq!(Expr::float(2.0).to_string(), "2.0");
        assert_eq!(Expr::float(0.7071).to_string(), "0.7071");
    }
}
