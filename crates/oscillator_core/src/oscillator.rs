//! The undamped and damped oscillator models.
//!
//! A model is solved once at construction and is read-only afterwards; every
//! query evaluates the stored closed form.

use crate::equation_engine::{CompileError, CompiledExpr};
use crate::error::{ensure_finite, OscillatorError, OscillatorResult};
use crate::expression::{parse, Equation, Expr};
use crate::inversion;
use crate::ode::{CharacteristicRoots, SecondOrderOde};
use crate::quasi_polynomial::{ExpPolynomial, ForcingError};
use crate::rational::{self, limit_denominator, Rational};
use crate::render::{self, PlotImage, SolutionImage};
use crate::settings::{validate_window, OscillatorSettings};
use crate::traits::HarmonicOscillator;
use num_traits::{CheckedMul, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Name of the independent variable in forcing expressions and solutions.
pub const TIME: &str = "t";
/// Name of the displacement function in equations.
pub const DISPLACEMENT: &str = "x";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorVariant {
    Undamped,
    Damped,
}

impl OscillatorVariant {
    /// Both variants share one plot title.
    pub fn plot_title(self) -> &'static str {
        match self {
            Self::Undamped | Self::Damped => "Simple Harmonic Oscillator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DampingRegime {
    Overdamped,
    CriticallyDamped,
    Underdamped,
}

/// Displacement sampled at ascending times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCurve {
    pub times: Vec<f64>,
    pub displacements: Vec<f64>,
}

impl ResponseCurve {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.displacements.iter().copied())
    }
}

/// Physical parameters, initial conditions and forcing of one oscillator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSpec {
    pub mass: f64,
    pub stiffness: f64,
    /// Ignored by the undamped model.
    #[serde(default)]
    pub damping: f64,
    pub initial_displacement: f64,
    pub initial_velocity: f64,
    /// Right-hand side `f(t)` as text.
    pub forcing: String,
}

impl OscillatorSpec {
    pub fn undamped(
        mass: f64,
        stiffness: f64,
        initial_displacement: f64,
        initial_velocity: f64,
        forcing: impl Into<String>,
    ) -> Self {
        Self {
            mass,
            stiffness,
            damping: 0.0,
            initial_displacement,
            initial_velocity,
            forcing: forcing.into(),
        }
    }

    pub fn damped(
        mass: f64,
        stiffness: f64,
        damping: f64,
        initial_displacement: f64,
        initial_velocity: f64,
        forcing: impl Into<String>,
    ) -> Self {
        Self {
            damping,
            ..Self::undamped(
                mass,
                stiffness,
                initial_displacement,
                initial_velocity,
                forcing,
            )
        }
    }
}

fn exact_coefficient(value: f64, what: &str, max_denominator: u32) -> OscillatorResult<Rational> {
    ensure_finite(value, what)?;
    limit_denominator(value, i128::from(max_denominator)).ok_or_else(|| {
        OscillatorError::invalid_input(format!(
            "{what} magnitude must not exceed {:e} (got {value})",
            rational::MAX_COEFFICIENT_MAGNITUDE
        ))
    })
}

fn positive_coefficient(
    value: f64,
    what: &str,
    max_denominator: u32,
) -> OscillatorResult<Rational> {
    let exact = exact_coefficient(value, what, max_denominator)?;
    if !rational::is_positive(&exact) {
        return Err(OscillatorError::invalid_input(format!(
            "{what} must be positive (got {value})"
        )));
    }
    Ok(exact)
}

/// Parses `f(t)`; blank text, syntax errors and foreign symbols are rejected.
pub fn parse_forcing(text: &str) -> OscillatorResult<Expr> {
    if text.trim().is_empty() {
        return Err(OscillatorError::invalid_forcing(
            "the forcing expression is empty",
        ));
    }
    let expr = parse(text).map_err(|e| OscillatorError::invalid_forcing(e.to_string()))?;
    let foreign: Vec<String> = expr
        .free_symbols()
        .into_iter()
        .filter(|name| name != TIME)
        .collect();
    if !foreign.is_empty() {
        return Err(OscillatorError::invalid_forcing(format!(
            "only `{TIME}` may appear in the forcing expression (found {})",
            foreign.join(", ")
        )));
    }
    Ok(expr.simplify())
}

fn internal(err: CompileError) -> OscillatorError {
    OscillatorError::unsolvable(format!("the closed form cannot be evaluated: {err}"))
}

/// The state shared by both variants.
#[derive(Debug, Clone)]
struct SolvedModel {
    ode: SecondOrderOde,
    equation: Equation,
    solution: Equation,
    velocity: Expr,
    displacement_fn: CompiledExpr,
    velocity_fn: CompiledExpr,
    settings: OscillatorSettings,
}

impl SolvedModel {
    fn solve(
        spec: &OscillatorSpec,
        variant: OscillatorVariant,
        settings: &OscillatorSettings,
    ) -> OscillatorResult<Self> {
        settings.validate()?;
        let mass = positive_coefficient(spec.mass, "mass", settings.max_denominator)?;
        let stiffness = positive_coefficient(spec.stiffness, "stiffness", settings.max_denominator)?;
        let damping = match variant {
            OscillatorVariant::Undamped => Rational::zero(),
            OscillatorVariant::Damped => {
                exact_coefficient(spec.damping, "damping", settings.max_denominator)?
            }
        };
        let x0 = ensure_finite(spec.initial_displacement, "initial displacement")?;
        let v0 = ensure_finite(spec.initial_velocity, "initial velocity")?;

        let forcing = parse_forcing(&spec.forcing)?;
        let decomposition = ExpPolynomial::from_expr(&forcing, TIME, settings.max_power)
            .map_err(|err| match err {
                ForcingError::UnknownSymbol(_) | ForcingError::NonFinite(_) => {
                    OscillatorError::invalid_forcing(err.to_string())
                }
                _ => OscillatorError::unsolvable(err.to_string()),
            })?;
        debug!(
            ?variant,
            %mass,
            %damping,
            %stiffness,
            terms = decomposition.terms().len(),
            "decomposed forcing"
        );

        let ode = SecondOrderOde::new(mass, damping, stiffness);
        let equation = ode.equation(&forcing, TIME);
        let closed_form = ode.solve(&decomposition, x0, v0)?.to_real_expr(TIME);
        let velocity = closed_form.derivative(TIME);
        debug!(solution = %closed_form, "solved equation of motion");

        let displacement_fn = CompiledExpr::new(&closed_form, TIME).map_err(internal)?;
        let velocity_fn = CompiledExpr::new(&velocity, TIME).map_err(internal)?;
        let solution = Equation::new(
            Expr::unknown(DISPLACEMENT, 0, Expr::symbol(TIME)),
            closed_form,
        );

        Ok(Self {
            ode,
            equation,
            solution,
            velocity,
            displacement_fn,
            velocity_fn,
            settings: *settings,
        })
    }

    fn natural_frequency(&self) -> f64 {
        (rational::to_f64(&self.ode.stiffness) / rational::to_f64(&self.ode.mass)).sqrt()
    }

    fn evaluate(compiled: &CompiledExpr, time: f64, what: &str) -> OscillatorResult<f64> {
        ensure_finite(time, "time")?;
        let value = compiled.eval(time);
        if !value.is_finite() {
            return Err(OscillatorError::evaluation_domain(format!(
                "the {what} is not finite at t = {time}"
            )));
        }
        Ok(value)
    }

    fn evaluate_many(compiled: &CompiledExpr, times: &[f64], what: &str) -> OscillatorResult<Vec<f64>> {
        for &time in times {
            ensure_finite(time, "time")?;
        }
        let values = compiled.eval_many(times);
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(OscillatorError::evaluation_domain(format!(
                "the {what} is not finite at t = {}",
                times[i]
            )));
        }
        Ok(values)
    }

    fn times_at_displacement(&self, displacement: f64) -> OscillatorResult<Vec<f64>> {
        if !self.solution.rhs.depends_on(TIME) {
            return Err(OscillatorError::evaluation_domain(
                "the displacement is constant, so no time is singled out",
            ));
        }
        inversion::times_at_displacement(&self.displacement_fn, displacement, &self.settings.inversion)
    }

    fn sample(
        compiled: &CompiledExpr,
        t_start: f64,
        t_end: f64,
        sample_count: usize,
    ) -> OscillatorResult<ResponseCurve> {
        validate_window(t_start, t_end, sample_count)?;
        let step = (t_end - t_start) / (sample_count - 1) as f64;
        let times: Vec<f64> = (0..sample_count)
            .map(|i| {
                if i == sample_count - 1 {
                    t_end
                } else {
                    t_start + i as f64 * step
                }
            })
            .collect();
        let displacements = Self::evaluate_many(compiled, &times, "displacement")?;
        Ok(ResponseCurve {
            times,
            displacements,
        })
    }

    fn display(&self, rounded: Equation) -> SolutionImage {
        render::render_solution(&rounded, &self.settings.image)
    }
}

/// `m x'' + k x = f(t)`.
#[derive(Debug, Clone)]
pub struct UndampedOscillator {
    model: SolvedModel,
}

impl UndampedOscillator {
    pub fn new(spec: &OscillatorSpec, settings: &OscillatorSettings) -> OscillatorResult<Self> {
        let model = SolvedModel::solve(spec, OscillatorVariant::Undamped, settings)?;
        Ok(Self { model })
    }

    pub fn velocity_expression(&self) -> &Expr {
        &self.model.velocity
    }
}

/// `m x'' + c x' + k x = f(t)`.
#[derive(Debug, Clone)]
pub struct DampedOscillator {
    model: SolvedModel,
    damping_ratio: f64,
}

impl DampedOscillator {
    pub fn new(spec: &OscillatorSpec, settings: &OscillatorSettings) -> OscillatorResult<Self> {
        let model = SolvedModel::solve(spec, OscillatorVariant::Damped, settings)?;
        let ode = &model.ode;
        let damping_ratio = rational::to_f64(&ode.damping)
            / (2.0 * (rational::to_f64(&ode.mass) * rational::to_f64(&ode.stiffness)).sqrt());
        Ok(Self {
            model,
            damping_ratio,
        })
    }

    pub fn velocity_expression(&self) -> &Expr {
        &self.model.velocity
    }

    /// `c / (2 sqrt(m k))`.
    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    /// Classifies by comparing `c^2` with `4 m k` exactly.
    pub fn regime(&self) -> DampingRegime {
        let ode = &self.model.ode;
        if !rational::is_positive(&ode.damping) {
            return DampingRegime::Underdamped;
        }
        let exact = ode.damping.checked_mul(&ode.damping).zip(
            Rational::from_integer(4)
                .checked_mul(&ode.mass)
                .and_then(|four_m| four_m.checked_mul(&ode.stiffness)),
        );
        let ordering = match exact {
            Some((c_squared, four_mk)) => c_squared.cmp(&four_mk),
            None => {
                warn!("damping comparison overflowed exact arithmetic; using floating point");
                self.damping_ratio.total_cmp(&1.0)
            }
        };
        match ordering {
            Ordering::Greater => DampingRegime::Overdamped,
            Ordering::Equal => DampingRegime::CriticallyDamped,
            Ordering::Less => DampingRegime::Underdamped,
        }
    }
}

impl HarmonicOscillator for UndampedOscillator {
    fn variant(&self) -> OscillatorVariant {
        OscillatorVariant::Undamped
    }

    fn equation(&self) -> &Equation {
        &self.model.equation
    }

    fn solution(&self) -> &Equation {
        &self.model.solution
    }

    fn natural_frequency(&self) -> f64 {
        self.model.natural_frequency()
    }

    fn characteristic_roots(&self) -> CharacteristicRoots {
        self.model.ode.characteristic_roots()
    }

    fn solution_display(&self) -> OscillatorResult<SolutionImage> {
        let digits = self.model.settings.display_digits;
        Ok(self.model.display(self.model.solution.round_rhs(digits)))
    }

    fn displacement_at(&self, time: f64) -> OscillatorResult<f64> {
        SolvedModel::evaluate(&self.model.displacement_fn, time, "displacement")
    }

    fn displacements_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>> {
        SolvedModel::evaluate_many(&self.model.displacement_fn, times, "displacement")
    }

    fn velocity_at(&self, time: f64) -> OscillatorResult<f64> {
        SolvedModel::evaluate(&self.model.velocity_fn, time, "velocity")
    }

    fn velocities_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>> {
        SolvedModel::evaluate_many(&self.model.velocity_fn, times, "velocity")
    }

    fn times_at_displacement(&self, displacement: f64) -> OscillatorResult<Vec<f64>> {
        self.model.times_at_displacement(displacement)
    }

    fn response_curve(
        &self,
        t_start: f64,
        t_end: f64,
        sample_count: usize,
    ) -> OscillatorResult<ResponseCurve> {
        SolvedModel::sample(&self.model.displacement_fn, t_start, t_end, sample_count)
    }

    fn render_plot(&self, curve: &ResponseCurve) -> OscillatorResult<PlotImage> {
        render::render_plot(curve, self.variant().plot_title(), &self.model.settings.image)
    }
}

impl HarmonicOscillator for DampedOscillator {
    fn variant(&self) -> OscillatorVariant {
        OscillatorVariant::Damped
    }

    fn equation(&self) -> &Equation {
        &self.model.equation
    }

    fn solution(&self) -> &Equation {
        &self.model.solution
    }

    fn natural_frequency(&self) -> f64 {
        self.model.natural_frequency()
    }

    fn characteristic_roots(&self) -> CharacteristicRoots {
        self.model.ode.characteristic_roots()
    }

    fn solution_display(&self) -> OscillatorResult<SolutionImage> {
        let digits = self.model.settings.display_digits;
        Ok(self.model.display(self.model.solution.round_numbers(digits)))
    }

    fn displacement_at(&self, time: f64) -> OscillatorResult<f64> {
        SolvedModel::evaluate(&self.model.displacement_fn, time, "displacement")
    }

    fn displacements_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>> {
        SolvedModel::evaluate_many(&self.model.displacement_fn, times, "displacement")
    }

    fn velocity_at(&self, time: f64) -> OscillatorResult<f64> {
        SolvedModel::evaluate(&self.model.velocity_fn, time, "velocity")
    }

    fn velocities_at(&self, times: &[f64]) -> OscillatorResult<Vec<f64>> {
        SolvedModel::evaluate_many(&self.model.velocity_fn, times, "velocity")
    }

    fn times_at_displacement(&self, displacement: f64) -> OscillatorResult<Vec<f64>> {
        self.model.times_at_displacement(displacement)
    }

    /// Simplifies the closed form and evaluates the simplified expression.
    fn response_curve(
        &self,
        t_start: f64,
        t_end: f64,
        sample_count: usize,
    ) -> OscillatorResult<ResponseCurve> {
        let simplified = self.model.solution.rhs.simplify();
        let compiled = CompiledExpr::new(&simplified, TIME).map_err(internal)?;
        SolvedModel::sample(&compiled, t_start, t_end, sample_count)
    }

    fn render_plot(&self, curve: &ResponseCurve) -> OscillatorResult<PlotImage> {
        render::render_plot(curve, self.variant().plot_title(), &self.model.settings.image)
    }
}

/// Either variant, chosen at run time.
#[derive(Debug, Clone)]
pub enum OscillatorModel {
    Undamped(UndampedOscillator),
    Damped(DampedOscillator),
}

impl OscillatorModel {
    pub fn new(
        variant: OscillatorVariant,
        spec: &OscillatorSpec,
        settings: &OscillatorSettings,
    ) -> OscillatorResult<Self> {
        Ok(match variant {
            OscillatorVariant::Undamped => Self::Undamped(UndampedOscillator::new(spec, settings)?),
            OscillatorVariant::Damped => Self::Damped(DampedOscillator::new(spec, settings)?),
        })
    }

    pub fn oscillator(&self) -> &dyn HarmonicOscillator {
        match self {
            Self::Undamped(model) => model as &dyn HarmonicOscillator,
            Self::Damped(model) => model as &dyn HarmonicOscillator,
        }
    }

    pub fn damping_ratio(&self) -> Option<f64> {
        match self {
            Self::Undamped(_) => None,
            Self::Damped(model) => Some(model.damping_ratio()),
        }
    }

    pub fn regime(&self) -> Option<DampingRegime> {
        match self {
            Self::Undamped(_) => None,
            Self::Damped(model) => Some(model.regime()),
        }
    }
}
