//! WebAssembly bindings: a one-shot `solve_form` and a `WasmOscillator` class
//! for repeated queries against one solved model.

mod oscillator;

pub use oscillator::WasmOscillator;

use oscillator_core::{OscillatorError, OscillatorSettings, SolveRequest};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// `"<Kind>: <message>"`, so a front end can branch on the prefix.
pub(crate) fn to_js_error(err: OscillatorError) -> JsValue {
    JsValue::from_str(&format!("{:?}: {}", err.kind(), err.message()))
}

pub(crate) fn read_request(request: JsValue) -> Result<SolveRequest, JsValue> {
    from_value(request).map_err(|e| JsValue::from_str(&format!("Invalid solve request: {}", e)))
}

/// Missing settings fall back to the defaults.
pub(crate) fn read_settings(settings: JsValue) -> Result<OscillatorSettings, JsValue> {
    if settings.is_undefined() || settings.is_null() {
        return Ok(OscillatorSettings::default());
    }
    from_value(settings).map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e)))
}

/// Solves one form submission and returns the serialized `SolveResponse`.
#[wasm_bindgen]
pub fn solve_form(request: JsValue, settings: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let request = read_request(request)?;
    let settings = read_settings(settings)?;
    let response = oscillator_core::solve(&request, &settings).map_err(to_js_error)?;
    to_value(&response).map_err(|e| JsValue::from_str(&format!("Failed to serialize response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscillator_core::{DampingRegime, OscillatorVariant, SolveResponse};
    use wasm_bindgen_test::wasm_bindgen_test;

    pub(crate) fn request_value(variant: OscillatorVariant, forcing: &str) -> JsValue {
        let request = SolveRequest {
            variant,
            mass: "1".to_string(),
            stiffness: "1".to_string(),
            damping: "2".to_string(),
            initial_displacement: "1".to_string(),
            initial_velocity: "0".to_string(),
            forcing: forcing.to_string(),
            ..SolveRequest::default()
        };
        to_value(&request).expect("request")
    }

    #[wasm_bindgen_test]
    fn solve_form_returns_a_response() {
        let value = solve_form(
            request_value(OscillatorVariant::Damped, "0"),
            JsValue::UNDEFINED,
        )
        .expect("solve");
        let response: SolveResponse = from_value(value).expect("response");
        assert_eq!(response.regime, Some(DampingRegime::CriticallyDamped));
        assert_eq!(response.curve.times.len(), 100);
        assert!(response.plot.svg.contains("Displacement [m]"));
    }

    #[wasm_bindgen_test]
    fn solve_form_prefixes_errors_with_their_kind() {
        let message = solve_form(
            request_value(OscillatorVariant::Undamped, "1/(1+t)"),
            JsValue::NULL,
        )
        .err()
        .and_then(|err| err.as_string())
        .unwrap_or_default();
        assert!(message.starts_with("UnsolvableEquation: "), "{message}");
    }

    #[wasm_bindgen_test]
    fn malformed_settings_are_rejected() {
        let message = solve_form(
            request_value(OscillatorVariant::Undamped, "0"),
            JsValue::from_str("fast"),
        )
        .err()
        .and_then(|err| err.as_string())
        .unwrap_or_default();
        assert!(message.contains("Invalid settings"));
    }
}
