//! A solved model held on the JS side for repeated queries.

use crate::{read_request, read_settings, to_js_error};
use js_sys::{Array, Float64Array};
use oscillator_core::session::build_model;
use oscillator_core::{HarmonicOscillator, OscillatorModel};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmOscillator {
    model: OscillatorModel,
}

impl WasmOscillator {
    fn oscillator(&self) -> &dyn HarmonicOscillator {
        self.model.oscillator()
    }
}

#[wasm_bindgen]
impl WasmOscillator {
    /// Solves the model described by a `SolveRequest`; the query fields of the
    /// request are ignored.
    #[wasm_bindgen(constructor)]
    pub fn new(request: JsValue, settings: JsValue) -> Result<WasmOscillator, JsValue> {
        console_error_panic_hook::set_once();
        let request = read_request(request)?;
        let settings = read_settings(settings)?;
        let model = build_model(&request, &settings).map_err(to_js_error)?;
        Ok(WasmOscillator { model })
    }

    pub fn variant(&self) -> String {
        format!("{:?}", self.oscillator().variant()).to_lowercase()
    }

    pub fn equation_latex(&self) -> String {
        self.oscillator().equation().to_latex()
    }

    pub fn solution_latex(&self) -> String {
        self.oscillator().solution().to_latex()
    }

    /// The serialized `SolutionImage` of the rounded solution.
    pub fn solution_image(&self) -> Result<JsValue, JsValue> {
        let image = self.oscillator().solution_display().map_err(to_js_error)?;
        to_value(&image).map_err(|e| JsValue::from_str(&format!("Failed to serialize image: {}", e)))
    }

    pub fn natural_frequency(&self) -> f64 {
        self.oscillator().natural_frequency()
    }

    pub fn damping_ratio(&self) -> Option<f64> {
        self.model.damping_ratio()
    }

    pub fn regime(&self) -> Option<String> {
        self.model.regime().map(|regime| format!("{:?}", regime))
    }

    pub fn displacement_at(&self, time: f64) -> Result<f64, JsValue> {
        self.oscillator().displacement_at(time).map_err(to_js_error)
    }

    pub fn velocity_at(&self, time: f64) -> Result<f64, JsValue> {
        self.oscillator().velocity_at(time).map_err(to_js_error)
    }

    pub fn displacements_at(&self, times: Vec<f64>) -> Result<Float64Array, JsValue> {
        let values = self
            .oscillator()
            .displacements_at(&times)
            .map_err(to_js_error)?;
        Ok(Float64Array::from(values.as_slice()))
    }

    pub fn velocities_at(&self, times: Vec<f64>) -> Result<Float64Array, JsValue> {
        let values = self.oscillator().velocities_at(&times).map_err(to_js_error)?;
        Ok(Float64Array::from(values.as_slice()))
    }

    pub fn times_at_displacement(&self, displacement: f64) -> Result<Float64Array, JsValue> {
        let times = self
            .oscillator()
            .times_at_displacement(displacement)
            .map_err(to_js_error)?;
        Ok(Float64Array::from(times.as_slice()))
    }

    /// `[times, displacements]` as two `Float64Array`s.
    pub fn response_curve(&self, t_start: f64, t_end: f64, samples: u32) -> Result<Array, JsValue> {
        let curve = self
            .oscillator()
            .response_curve(t_start, t_end, samples as usize)
            .map_err(to_js_error)?;
        let result = Array::new();
        result.push(&Float64Array::from(curve.times.as_slice()));
        result.push(&Float64Array::from(curve.displacements.as_slice()));
        Ok(result)
    }

    /// SVG plot of the response over `[t_start, t_end]`.
    pub fn plot_svg(&self, t_start: f64, t_end: f64, samples: u32) -> Result<String, JsValue> {
        let oscillator = self.oscillator();
        let curve = oscillator
            .response_curve(t_start, t_end, samples as usize)
            .map_err(to_js_error)?;
        let plot = oscillator.render_plot(&curve).map_err(to_js_error)?;
        Ok(plot.svg)
    }
}

#[cfg(test)]
mod tests {
    use super::WasmOscillator;
    use crate::tests::request_value;
    use oscillator_core::OscillatorVariant;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn oscillator_answers_queries() {
        let oscillator = WasmOscillator::new(
            request_value(OscillatorVariant::Undamped, "0"),
            JsValue::UNDEFINED,
        )
        .expect("oscillator");
        assert_eq!(oscillator.variant(), "undamped");
        assert_eq!(oscillator.damping_ratio(), None);
        let x = oscillator.displacement_at(std::f64::consts::PI).expect("x");
        assert!((x + 1.0).abs() < 1e-12);

        let times = oscillator.times_at_displacement(0.0).expect("times").to_vec();
        assert!((times[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-8);

        let curve = oscillator.response_curve(0.0, 5.0, 100).expect("curve");
        assert_eq!(curve.length(), 2);
        assert!(oscillator
            .plot_svg(0.0, 5.0, 100)
            .expect("plot")
            .contains("Simple Harmonic Oscillator"));
    }

    #[wasm_bindgen_test]
    fn damped_oscillator_reports_regime() {
        let oscillator = WasmOscillator::new(
            request_value(OscillatorVariant::Damped, "0"),
            JsValue::UNDEFINED,
        )
        .expect("oscillator");
        assert_eq!(oscillator.regime().as_deref(), Some("CriticallyDamped"));
        let message = oscillator
            .displacement_at(f64::NAN)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.starts_with("InvalidInput: "));
    }
}
