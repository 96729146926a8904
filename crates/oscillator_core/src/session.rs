//! One solve from form-like text input to every output a UI shows.

use crate::equation_engine::evaluate_constant;
use crate::error::{OscillatorError, OscillatorResult};
use crate::expression::parse;
use crate::oscillator::{
    DampingRegime, OscillatorModel, OscillatorSpec, OscillatorVariant, ResponseCurve,
};
use crate::render::{PlotImage, SolutionImage};
use crate::settings::OscillatorSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The text fields of a solve form. Blank optional fields are not requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveRequest {
    pub variant: OscillatorVariant,
    pub mass: String,
    pub stiffness: String,
    /// Read only for the damped variant.
    pub damping: String,
    pub initial_displacement: String,
    pub initial_velocity: String,
    pub forcing: String,
    pub time_query: String,
    pub displacement_query: String,
}

impl Default for SolveRequest {
    fn default() -> Self {
        Self {
            variant: OscillatorVariant::Undamped,
            mass: String::new(),
            stiffness: String::new(),
            damping: String::new(),
            initial_displacement: String::new(),
            initial_velocity: String::new(),
            forcing: "0".to_string(),
            time_query: String::new(),
            displacement_query: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub variant: OscillatorVariant,
    pub equation_latex: String,
    pub equation_text: String,
    pub solution_latex: String,
    pub solution_text: String,
    pub solution_image: SolutionImage,
    pub natural_frequency: f64,
    pub damping_ratio: Option<f64>,
    pub regime: Option<DampingRegime>,
    pub displacement: Option<f64>,
    pub velocity: Option<f64>,
    pub times: Option<Vec<f64>>,
    pub curve: ResponseCurve,
    pub plot: PlotImage,
}

/// Evaluates a numeric form field: a literal or a closed arithmetic
/// expression such as `2*pi` or `sqrt(2)/2`.
pub fn parse_numeric_field(name: &str, text: &str) -> OscillatorResult<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OscillatorError::invalid_input(format!("{name} is required")));
    }
    let invalid = |reason: String| OscillatorError::invalid_input(format!("{name}: {reason}"));
    let expr = parse(text).map_err(|e| invalid(e.to_string()))?;
    if let Some(symbol) = expr.free_symbols().into_iter().next() {
        return Err(invalid(format!("`{symbol}` is not a number")));
    }
    let value = evaluate_constant(&expr).map_err(|e| invalid(e.to_string()))?;
    if !value.is_finite() {
        return Err(invalid(format!("`{text}` does not evaluate to a finite number")));
    }
    Ok(value)
}

/// Like [`parse_numeric_field`], but a blank field is `None`.
pub fn parse_optional_field(name: &str, text: &str) -> OscillatorResult<Option<f64>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    parse_numeric_field(name, text).map(Some)
}

pub fn build_model(
    request: &SolveRequest,
    settings: &OscillatorSettings,
) -> OscillatorResult<OscillatorModel> {
    let damping = match request.variant {
        OscillatorVariant::Undamped => 0.0,
        OscillatorVariant::Damped => parse_numeric_field("damping", &request.damping)?,
    };
    let spec = OscillatorSpec {
        mass: parse_numeric_field("mass", &request.mass)?,
        stiffness: parse_numeric_field("stiffness", &request.stiffness)?,
        damping,
        initial_displacement: parse_numeric_field(
            "initial displacement",
            &request.initial_displacement,
        )?,
        initial_velocity: parse_numeric_field("initial velocity", &request.initial_velocity)?,
        forcing: request.forcing.clone(),
    };
    OscillatorModel::new(request.variant, &spec, settings)
}

/// Builds the model, answers the optional queries, and renders the default
/// curve. Any failure aborts the whole solve.
pub fn solve(request: &SolveRequest, settings: &OscillatorSettings) -> OscillatorResult<SolveResponse> {
    let time_query = parse_optional_field("time", &request.time_query)?;
    let displacement_query = parse_optional_field("displacement", &request.displacement_query)?;

    let model = build_model(request, settings)?;
    let oscillator = model.oscillator();

    let (displacement, velocity) = match time_query {
        Some(t) => (
            Some(oscillator.displacement_at(t)?),
            Some(oscillator.velocity_at(t)?),
        ),
        None => (None, None),
    };
    let times = displacement_query
        .map(|x| oscillator.times_at_displacement(x))
        .transpose()?;

    let window = settings.curve;
    let curve = oscillator.response_curve(window.t_start, window.t_end, window.samples)?;
    let plot = oscillator.render_plot(&curve)?;
    let solution_image = oscillator.solution_display()?;
    debug!(variant = ?request.variant, samples = curve.len(), "solve complete");

    Ok(SolveResponse {
        variant: oscillator.variant(),
        equation_latex: oscillator.equation().to_latex(),
        equation_text: oscillator.equation().to_string(),
        solution_latex: solution_image.latex.clone(),
        solution_text: solution_image.text.clone(),
        solution_image,
        natural_frequency: oscillator.natural_frequency(),
        damping_ratio: model.damping_ratio(),
        regime: model.regime(),
        displacement,
        velocity,
        times,
        curve,
        plot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::render::live_surfaces;

    fn request(variant: OscillatorVariant) -> SolveRequest {
        SolveRequest {
            variant,
            mass: "1".into(),
            stiffness: "4".into(),
            damping: "1".into(),
            initial_displacement: "1".into(),
            initial_velocity: "0".into(),
            ..SolveRequest::default()
        }
    }

    #[test]
    fn numeric_fields_accept_closed_arithmetic() {
        assert_eq!(parse_numeric_field("mass", " 2.5 ").unwrap(), 2.5);
        assert_eq!(parse_numeric_field("mass", "1e-3").unwrap(), 0.001);
        let two_pi = parse_numeric_field("time", "2*pi").unwrap();
        assert!((two_pi - std::f64::consts::TAU).abs() < 1e-15);
        assert_eq!(parse_optional_field("time", "  ").unwrap(), None);
    }

    #[test]
    fn numeric_fields_name_the_offender() {
        for text in ["", "abc", "2 +", "1/0", "t"] {
            let err = parse_numeric_field("stiffness", text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
            assert!(err.to_string().contains("stiffness"), "{err}");
        }
    }

    #[test]
    fn undamped_solve_fills_the_response() {
        let mut req = request(OscillatorVariant::Undamped);
        req.time_query = "pi/2".into();
        req.displacement_query = "0".into();
        let response = solve(&req, &OscillatorSettings::default()).unwrap();

        assert_eq!(response.variant, OscillatorVariant::Undamped);
        assert!(response.solution_text.starts_with("x(t) = cos(2.0"), "{}", response.solution_text);
        assert_eq!(response.equation_text, "Derivative(x(t), (t, 2)) + 4*x(t) = 0");
        assert_eq!(response.natural_frequency, 2.0);
        assert_eq!(response.damping_ratio, None);
        assert_eq!(response.regime, None);
        assert!((response.displacement.unwrap() + 1.0).abs() < 1e-12);
        assert!(response.velocity.unwrap().abs() < 1e-12);
        let times = response.times.unwrap();
        assert!((times[0] - std::f64::consts::FRAC_PI_4).abs() < 1e-8);
        assert_eq!(response.curve.len(), 100);
        assert_eq!(response.curve.times[99], 5.0);
        assert!(response.plot.svg.contains("Simple Harmonic Oscillator"));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn damped_solve_reports_the_regime() {
        let response = solve(&request(OscillatorVariant::Damped), &OscillatorSettings::default())
            .unwrap();
        assert_eq!(response.regime, Some(DampingRegime::Underdamped));
        assert_eq!(response.damping_ratio, Some(0.25));
        assert_eq!(response.displacement, None);
        assert_eq!(response.times, None);
    }

    #[test]
    fn damping_is_only_required_when_damped() {
        let mut req = request(OscillatorVariant::Undamped);
        req.damping.clear();
        assert!(solve(&req, &OscillatorSettings::default()).is_ok());
        req.variant = OscillatorVariant::Damped;
        let err = solve(&req, &OscillatorSettings::default()).unwrap_err();
        assert!(err.to_string().contains("damping is required"));
    }

    #[test]
    fn failures_return_no_partial_response() {
        let mut req = request(OscillatorVariant::Undamped);
        req.forcing = "1/(1+t)".into();
        let err = solve(&req, &OscillatorSettings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsolvableEquation);

        let mut req = request(OscillatorVariant::Undamped);
        req.displacement_query = "5".into();
        let err = solve(&req, &OscillatorSettings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationDomainError);
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn forcing_defaults_to_free_motion() {
        let req = SolveRequest {
            variant: OscillatorVariant::Damped,
            mass: "2".into(),
            stiffness: "8".into(),
            damping: "8".into(),
            initial_displacement: "0".into(),
            initial_velocity: "1".into(),
            ..SolveRequest::default()
        };
        assert_eq!(req.forcing, "0");
        let response = solve(&req, &OscillatorSettings::default()).unwrap();
        assert_eq!(response.regime, Some(DampingRegime::CriticallyDamped));
        assert!(response.equation_text.ends_with("= 0"));
    }
}
