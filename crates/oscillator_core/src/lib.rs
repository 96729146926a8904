//! The `oscillator_core` crate solves single-degree-of-freedom spring-mass(-damper)
//! oscillators in closed form and answers queries against the solution.
//!
//! Key components:
//! - **Expression**: expression tree, parser, simplifier, symbolic derivative and printers.
//! - **Equation Engine**: a bytecode VM that evaluates expressions over `f64` or `Dual`.
//! - **ODE**: exact characteristic roots and undetermined coefficients over
//!   exponential-polynomial forcing (`quasi_polynomial`).
//! - **Oscillator**: the undamped and damped models behind `HarmonicOscillator`.
//! - **Render**: SVG images of the typeset solution and the response plot.
//! - **Session**: one text-in, response-out solve for form-driven front ends.
pub mod autodiff;
pub mod equation_engine;
pub mod error;
pub mod expression;
pub mod inversion;
pub mod ode;
pub mod oscillator;
pub mod quasi_polynomial;
pub mod rational;
pub mod render;
pub mod session;
pub mod settings;
pub mod traits;

pub use error::{ErrorKind, OscillatorError, OscillatorResult};
pub use oscillator::{
    DampedOscillator, DampingRegime, OscillatorModel, OscillatorSpec, OscillatorVariant,
    ResponseCurve, UndampedOscillator,
};
pub use session::{solve, SolveRequest, SolveResponse};
pub use settings::OscillatorSettings;
pub use traits::HarmonicOscillator;
