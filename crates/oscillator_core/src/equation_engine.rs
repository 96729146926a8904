use crate::autodiff::Dual;
use crate::expression::{Expr, Function, Number};
use crate::traits::Scalar;
use std::collections::HashMap;
use thiserror::Error;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64 or Dual).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    /// Indices follow the symbol table the expression was compiled against.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes a^n for a fixed integer n.
    PowI(i32),
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("cannot evaluate the undetermined function `{0}`")]
    UndeterminedFunction(String),
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Values bound to the symbol table (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the value left on the stack, or NaN for malformed bytecode.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], stack: &mut Vec<T>) -> T {
        let nan = T::from_f64(f64::NAN);
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(val)),
                OpCode::LoadVar(idx) => match vars.get(idx) {
                    Some(&v) => stack.push(v),
                    None => return nan,
                },
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        return nan;
                    };
                    stack.push(match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
                OpCode::PowI(n) => {
                    let Some(a) = stack.pop() else { return nan };
                    stack.push(a.powi(n));
                }
                OpCode::Neg => {
                    let Some(a) = stack.pop() else { return nan };
                    stack.push(-a);
                }
                OpCode::Call(function) => {
                    let Some(a) = stack.pop() else { return nan };
                    stack.push(function.apply(a));
                }
            }
        }

        stack.pop().unwrap_or(nan)
    }
}

/// Compiles an `Expr` into `Bytecode`.
/// Resolves symbol names to indices into the variable slice given to the VM.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[&str]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, CompileError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(n.to_f64())),
            Expr::Constant(c) => ops.push(OpCode::LoadConst(c.value())),
            Expr::Symbol(name) => {
                let idx = self
                    .var_map
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownSymbol(name.clone()))?;
                ops.push(OpCode::LoadVar(*idx));
            }
            Expr::Add(terms) => self.compile_chain(terms, OpCode::Add, ops)?,
            Expr::Mul(factors) => {
                // A leading -1 compiles to a negation rather than a multiply.
                match factors.split_first() {
                    Some((Expr::Number(n), rest)) if n.to_f64() == -1.0 && !rest.is_empty() => {
                        self.compile_chain(rest, OpCode::Mul, ops)?;
                        ops.push(OpCode::Neg);
                    }
                    _ => self.compile_chain(factors, OpCode::Mul, ops)?,
                }
            }
            Expr::Pow(base, exponent) => {
                self.compile_recursive(base, ops)?;
                match exponent.as_number().and_then(Number::as_integer) {
                    Some(n) if i32::try_from(n).is_ok() => ops.push(OpCode::PowI(n as i32)),
                    _ => {
                        self.compile_recursive(exponent, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Expr::Call(function, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(*function));
            }
            Expr::Unknown { name, .. } => {
                return Err(CompileError::UndeterminedFunction(name.clone()))
            }
        }
        Ok(())
    }

    fn compile_chain(
        &self,
        items: &[Expr],
        op: OpCode,
        ops: &mut Vec<OpCode>,
    ) -> Result<(), CompileError> {
        let Some((first, rest)) = items.split_first() else {
            let identity = if op == OpCode::Mul { 1.0 } else { 0.0 };
            ops.push(OpCode::LoadConst(identity));
            return Ok(());
        };
        self.compile_recursive(first, ops)?;
        for item in rest {
            self.compile_recursive(item, ops)?;
            ops.push(op);
        }
        Ok(())
    }
}

/// A single-variable expression compiled once and evaluated many times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    bytecode: Bytecode,
}

impl CompiledExpr {
    pub fn new(expr: &Expr, var: &str) -> Result<Self, CompileError> {
        let bytecode = Compiler::new(&[var]).compile(expr)?;
        Ok(Self { bytecode })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let mut stack = Vec::with_capacity(16);
        VM::execute(&self.bytecode, &[x], &mut stack)
    }

    /// Value and first derivative at `x` by forward-mode differentiation.
    pub fn eval_with_slope(&self, x: f64) -> (f64, f64) {
        let mut stack = Vec::with_capacity(16);
        let d = VM::execute(&self.bytecode, &[Dual::variable(x)], &mut stack);
        (d.val, d.eps)
    }

    /// Evaluates at every point, reusing one stack.
    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        let mut stack = Vec::with_capacity(16);
        xs.iter()
            .map(|&x| VM::execute(&self.bytecode, &[x], &mut stack))
            .collect()
    }
}

/// Evaluates a symbol-free expression through the VM.
pub fn evaluate_constant(expr: &Expr) -> Result<f64, CompileError> {
    let bytecode = Compiler::new(&[]).compile(expr)?;
    let mut stack = Vec::with_capacity(16);
    Ok(VM::execute::<f64>(&bytecode, &[], &mut stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;

    #[test]
    fn test_vm_execution() {
        // x^2 + 2x + 1 at x = 3
        let expr = parse("x^2 + 2*x + 1").unwrap();
        let compiled = CompiledExpr::new(&expr, "x").unwrap();
        assert_eq!(compiled.eval(3.0), 16.0);
        assert_eq!(compiled.eval_many(&[0.0, 1.0, -1.0]), vec![1.0, 4.0, 0.0]);
    }

    #[test]
    fn test_dual_slope() {
        let expr = parse("exp(-t/2)*sin(3*t)").unwrap();
        let compiled = CompiledExpr::new(&expr, "t").unwrap();
        let t: f64 = 0.8;
        let (value, slope) = compiled.eval_with_slope(t);
        let expected = (-t / 2.0).exp() * (3.0 * t).sin();
        let expected_slope =
            (-t / 2.0).exp() * (3.0 * (3.0 * t).cos() - 0.5 * (3.0 * t).sin());
        assert!((value - expected).abs() < 1e-14);
        assert!((slope - expected_slope).abs() < 1e-12);
    }

    #[test]
    fn test_negation_and_powers() {
        let expr = parse("-t^2 + t^(1/2)").unwrap();
        let compiled = CompiledExpr::new(&expr, "t").unwrap();
        assert!(compiled.bytecode.ops.contains(&OpCode::Neg));
        assert!(compiled.bytecode.ops.contains(&OpCode::PowI(2)));
        assert!((compiled.eval(4.0) - (-14.0)).abs() < 1e-15);
    }

    #[test]
    fn test_compile_errors() {
        let expr = parse("t + y").unwrap();
        assert_eq!(
            CompiledExpr::new(&expr, "t").unwrap_err(),
            CompileError::UnknownSymbol("y".to_string())
        );
        let unknown = Expr::unknown("x", 1, Expr::symbol("t"));
        assert!(matches!(
            CompiledExpr::new(&unknown, "t"),
            Err(CompileError::UndeterminedFunction(_))
        ));
    }

    #[test]
    fn test_constants_and_malformed_bytecode() {
        let expr = parse("2*pi - cos(0)").unwrap();
        let value = evaluate_constant(&expr).unwrap();
        assert!((value - (2.0 * std::f64::consts::PI - 1.0)).abs() < 1e-15);

        let broken = Bytecode {
            ops: vec![OpCode::Add],
        };
        let mut stack = Vec::new();
        assert!(VM::execute::<f64>(&broken, &[], &mut stack).is_nan());
    }
}
