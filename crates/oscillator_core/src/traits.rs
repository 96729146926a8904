use crate::error::OscillatorResult;
use crate::expression::Equation;
use crate::ode::CharacteristicRoots;
use crate::oscillator::{OscillatorVariant, ResponseCurve};
use crate::render::{PlotImage, SolutionImage};
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A numeric type the bytecode VM can evaluate over.
/// Implemented for `f64` and for the forward-mode `Dual` number in `autodiff`.
pub trait Scalar:
    Copy
    + Debug
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    fn from_f64(value: f64) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn abs(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn tan(self) -> Self {
        f64::tan(self)
    }
    fn sinh(self) -> Self {
        f64::sinh(self)
    }
    fn cosh(self) -> Self {
        f64::cosh(self)
    }
    fn tanh(self) -> Self {
        f64::tanh(self)
    }
    fn asin(self) -> Self {
        f64::asin(self)
    }
    fn acos(self) -> Self {
        f64::acos(self)
    }
    fn atan(self) -> Self {
        f64::atan(self)
    }
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// The query contract shared by the undamped and damped oscillator models.
///
/// Every method is a pure function of the stored closed-form solution and its
/// argument; a solved model is never mutated.
pub trait HarmonicOscillator {
    fn variant(&self) -> OscillatorVariant;

    /// The equation of motion with exact rational coefficients.
    fn equation(&self) -> &Equation;

    /// The solved equality `x(t) = ...`.
    fn solution(&self) -> &Equation;

    /// `sqrt(stiffness / mass)`.
    fn natural_frequency(&self) -> f64;

    /// Roots of `m r^2 + c r + k`.
    fn characteristic_roots(&self) -> CharacteristicRoots;

    /// Typesets the solution, rounded for display, into an image.
    fn solution_display(&self) -> OscillatorResult<SolutionImage>;

    fn displacement_at(&self, time: f64) -> OscillatorResult<f64>;

    fn displacements_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>>;

    fn velocity_at(&self, time: f64) -> OscillatorResult<f64>;

    fn velocities_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>>;

    /// All times inside the configured inversion window at which the
    /// displacement equals `displacement`, in ascending order.
    fn times_at_displacement(&self, displacement: f64) -> OscillatorResult<Vec<f64>>;

    fn response_curve(
        &self,
        t_start: f64,
        t_end: f64,
        sample_count: usize,
    ) -> OscillatorResult<ResponseCurve>;

    /// Line plot of a curve produced by [`Self::response_curve`].
    fn render_plot(&self, curve: &ResponseCurve) -> OscillatorResult<PlotImage>;
}
