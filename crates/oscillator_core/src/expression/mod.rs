//! Symbolic expressions: the tree, a parser, simplification, differentiation
//! and printers for plain text, LaTeX and Unicode.

mod derivative;
mod expr;
mod parser;
mod printer;
mod simplify;

pub use expr::{round_significant, Constant, Equation, Expr, Function, Number};
pub use parser::{parse, ParseError};
