use super::expr::{Constant, Expr, Function, Number};
use crate::rational::Rational;
use thiserror::Error;

/// A syntax error with the byte offset where it was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub reason: String,
}

impl ParseError {
    fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

/// Parses a string expression into an AST.
///
/// Grammar, loosest binding first:
/// `expression := term (('+' | '-') term)*`,
/// `term := unary (('*' | '/') unary)*`,
/// `unary := ('-' | '+') unary | power`,
/// `power := primary (('^' | '**') unary)?`.
/// Power is right-associative and binds tighter than unary minus, so
/// `-2^2 = -4` and `2^3^2 = 512`.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::new(
            token.position,
            format!("unexpected {}", token.kind.describe()),
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(Number),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Number(_) => "number".to_string(),
            Self::Identifier(name) => format!("identifier `{name}`"),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::Caret => "'^'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Optional exponent: e.g. 1e-3, 2.5E+4.
            if let Some(&(_, marker)) = chars.peek() {
                if marker == 'e' || marker == 'E' {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::new();
                    if let Some(&(_, sign)) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    let mut digits = 0;
                    while let Some(&(_, d)) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                            digits += 1;
                        } else {
                            break;
                        }
                    }
                    if digits > 0 {
                        literal.push('e');
                        literal.push_str(&exponent);
                        chars = lookahead;
                    }
                }
            }
            let number = parse_number(&literal)
                .ok_or_else(|| ParseError::new(position, format!("malformed number `{literal}`")))?;
            tokens.push(Token {
                kind: TokenKind::Number(number),
                position,
            });
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Identifier(ident),
                position,
            });
        } else {
            chars.next();
            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => {
                    if let Some(&(_, '*')) = chars.peek() {
                        chars.next();
                        TokenKind::Caret
                    } else {
                        TokenKind::Star
                    }
                }
                '/' => TokenKind::Slash,
                '^' => TokenKind::Caret,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                other => {
                    return Err(ParseError::new(
                        position,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };
            tokens.push(Token { kind, position });
        }
    }
    Ok(tokens)
}

/// Decimal literals become exact rationals when they fit; otherwise floats.
fn parse_number(literal: &str) -> Option<Number> {
    let (mantissa, exponent) = match literal.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().ok()?),
        None => (literal, 0),
    };
    if mantissa.is_empty() || mantissa == "." || mantissa.matches('.').count() > 1 {
        return None;
    }
    let float: f64 = literal.parse().ok()?;

    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{whole}{fraction}");
    let scale = exponent - fraction.len() as i32;
    if digits.len() > 30 || scale.unsigned_abs() > 30 {
        return Some(Number::Float(float));
    }
    let numerator: i128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
    let power = 10_i128.checked_pow(scale.unsigned_abs())?;
    let exact = if scale >= 0 {
        match numerator.checked_mul(power) {
            Some(n) => Rational::from_integer(n),
            None => return Some(Number::Float(float)),
        }
    } else {
        Rational::new(numerator, power)
    };
    Some(Number::Rational(exact))
}

/// Deepest nesting of parentheses, signs and exponents accepted.
const MAX_DEPTH: usize = 200;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn current_position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;

        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Plus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = Expr::add(left, right);
                }
                TokenKind::Minus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = Expr::sub(left, right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Star => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::mul(left, right);
                }
                TokenKind::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::div(left, right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // Every nested construct recurses through here.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                self.current_position(),
                "expression is nested too deeply",
            ));
        }
        self.depth += 1;
        let result = self.parse_signed();
        self.depth -= 1;
        result
    }

    fn parse_signed(&mut self) -> Result<Expr, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Minus) => {
                self.consume();
                Ok(Expr::neg(self.parse_unary()?))
            }
            Some(TokenKind::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if let Some(TokenKind::Caret) = self.peek().map(|t| &t.kind) {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::pow(base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.current_position();
        let Some(token) = self.consume() else {
            return Err(ParseError::new(position, "unexpected end of expression"));
        };
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Identifier(name) => {
                let called = matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen));
                if called {
                    let function = Function::from_name(&name).ok_or_else(|| {
                        ParseError::new(token.position, format!("unknown function `{name}`"))
                    })?;
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    self.expect_closing_paren()?;
                    return Ok(Expr::call(function, arg));
                }
                if Function::from_name(&name).is_some() {
                    return Err(ParseError::new(
                        token.position,
                        format!("function `{name}` requires a parenthesised argument"),
                    ));
                }
                Ok(match name.as_str() {
                    "pi" => Expr::Constant(Constant::Pi),
                    "e" | "E" => Expr::Constant(Constant::E),
                    _ => Expr::Symbol(name),
                })
            }
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect_closing_paren()?;
                Ok(expr)
            }
            other => Err(ParseError::new(
                token.position,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn expect_closing_paren(&mut self) -> Result<(), ParseError> {
        let position = self.current_position();
        match self.consume() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            _ => Err(ParseError::new(position, "expected ')'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(input: &str) -> f64 {
        parse(input)
            .expect("parse")
            .numeric_value()
            .expect("numeric")
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(value_of("1 + 2 * 3"), 7.0);
        assert_eq!(value_of("-2^2"), -4.0);
        assert_eq!(value_of("2^3^2"), 512.0);
        assert_eq!(value_of("2**-1"), 0.5);
        assert_eq!(value_of("(1 + 2) * 3"), 9.0);
        assert_eq!(value_of("8 / 4 / 2"), 1.0);
        assert_eq!(value_of("10 - 4 - 3"), 3.0);
    }

    #[test]
    fn literals_are_exact() {
        assert_eq!(
            parse("0.25").unwrap(),
            Expr::rational(Rational::new(1, 4))
        );
        assert_eq!(
            parse("1.5e-3").unwrap(),
            Expr::rational(Rational::new(3, 2000))
        );
        assert_eq!(parse("2E2").unwrap(), Expr::integer(200));
    }

    #[test]
    fn identifiers_and_functions() {
        let expr = parse("3*sin(2*t) + e^t - pi").unwrap();
        assert!(expr.depends_on("t"));
        let symbols = expr.free_symbols();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["t".to_string()]);
        assert!((value_of("cos(pi)") + 1.0).abs() < 1e-15);
        assert!((value_of("log(e)") - 1.0).abs() < 1e-15);
    }

    #[test]
    fn reports_errors_with_positions() {
        assert_eq!(parse("").unwrap_err().reason, "empty expression");
        assert_eq!(parse("   ").unwrap_err().reason, "empty expression");

        let err = parse("1 +").unwrap_err();
        assert_eq!(err.position, 3);
        assert!(err.reason.contains("end of expression"));

        let err = parse("(1 + 2").unwrap_err();
        assert_eq!(err.reason, "expected ')'");

        let err = parse("2 $ 3").unwrap_err();
        assert_eq!(err.position, 2);

        assert!(parse("foo(t)").unwrap_err().reason.contains("unknown function"));
        assert!(parse("sin t").unwrap_err().reason.contains("requires"));
        assert!(parse("1 2").unwrap_err().reason.contains("unexpected number"));
        assert!(parse("1..2").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error_not_an_overflow() {
        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&nested).unwrap_err();
        assert!(err.reason.contains("nested too deeply"), "{err}");

        let signs = format!("{}1", "-".repeat(10_000));
        assert!(parse(&signs).unwrap_err().reason.contains("nested too deeply"));

        let tower = format!("2{}", "^2".repeat(10_000));
        assert!(parse(&tower).is_err());

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(value_of(&shallow), 1.0);
        assert_eq!(value_of("--1"), 1.0);
    }
}
