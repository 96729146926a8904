use crate::error::{OscillatorError, OscillatorResult};
use serde::{Deserialize, Serialize};

/// Tunables for constructing, querying and rendering an oscillator model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorSettings {
    /// Denominator bound for the rational approximation of physical inputs.
    pub max_denominator: u32,
    /// Significant digits kept when rounding the solution for display.
    pub display_digits: usize,
    /// Largest integer power of `t` the closed-form solver accepts in a forcing term.
    pub max_power: u32,
    pub inversion: InversionSettings,
    pub curve: CurveSettings,
    pub image: ImageSettings,
}

impl Default for OscillatorSettings {
    fn default() -> Self {
        Self {
            max_denominator: 1_000_000,
            display_digits: 4,
            max_power: 64,
            inversion: InversionSettings::default(),
            curve: CurveSettings::default(),
            image: ImageSettings::default(),
        }
    }
}

impl OscillatorSettings {
    pub fn validate(&self) -> OscillatorResult<()> {
        if self.max_denominator == 0 {
            return Err(OscillatorError::invalid_input(
                "max_denominator must be at least 1",
            ));
        }
        if self.display_digits == 0 || self.display_digits > 17 {
            return Err(OscillatorError::invalid_input(
                "display_digits must be between 1 and 17",
            ));
        }
        self.inversion.validate()?;
        self.curve.validate()?;
        self.image.validate()
    }
}

/// Search window and root-polishing controls for time-at-displacement queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionSettings {
    pub t_min: f64,
    pub t_max: f64,
    /// Number of uniform bracketing intervals across the window.
    pub intervals: usize,
    /// Residual tolerance, relative to the displacement scale.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            t_min: 0.0,
            t_max: 10.0,
            intervals: 2000,
            tolerance: 1e-9,
            max_iterations: 60,
        }
    }
}

impl InversionSettings {
    pub fn validate(&self) -> OscillatorResult<()> {
        if !self.t_min.is_finite() || !self.t_max.is_finite() || self.t_max <= self.t_min {
            return Err(OscillatorError::invalid_input(
                "inversion window must be finite with t_max > t_min",
            ));
        }
        if self.intervals == 0 {
            return Err(OscillatorError::invalid_input(
                "inversion needs at least one interval",
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(OscillatorError::invalid_input(
                "inversion tolerance must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(OscillatorError::invalid_input(
                "inversion max_iterations must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Default window of the response curve returned with every solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSettings {
    pub t_start: f64,
    pub t_end: f64,
    pub samples: usize,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 5.0,
            samples: 100,
        }
    }
}

impl CurveSettings {
    pub fn validate(&self) -> OscillatorResult<()> {
        validate_window(self.t_start, self.t_end, self.samples)
    }
}

pub(crate) fn validate_window(t_start: f64, t_end: f64, samples: usize) -> OscillatorResult<()> {
    if !t_start.is_finite() || !t_end.is_finite() {
        return Err(OscillatorError::invalid_input(
            "curve bounds must be finite",
        ));
    }
    if t_end <= t_start {
        return Err(OscillatorError::invalid_input(format!(
            "curve end ({t_end}) must be greater than start ({t_start})"
        )));
    }
    if samples < 2 {
        return Err(OscillatorError::invalid_input(
            "a response curve needs at least 2 samples",
        ));
    }
    Ok(())
}

/// Pixel sizes of the rendered artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub solution_width: u32,
    pub solution_height: u32,
    pub font_size: f64,
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            solution_width: 400,
            solution_height: 100,
            font_size: 16.0,
            plot_width: 640,
            plot_height: 480,
        }
    }
}

impl ImageSettings {
    pub fn validate(&self) -> OscillatorResult<()> {
        if self.solution_width == 0
            || self.solution_height == 0
            || self.plot_width == 0
            || self.plot_height == 0
        {
            return Err(OscillatorError::invalid_input(
                "image dimensions must be positive",
            ));
        }
        if !(self.font_size > 0.0) || !self.font_size.is_finite() {
            return Err(OscillatorError::invalid_input("font_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = OscillatorSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.curve.samples, 100);
        assert_eq!(settings.curve.t_end, 5.0);
        assert_eq!(settings.display_digits, 4);
    }

    #[test]
    fn rejects_inverted_windows() {
        let mut settings = OscillatorSettings::default();
        settings.inversion.t_max = -1.0;
        assert!(settings.validate().is_err());

        let err = validate_window(1.0, 1.0, 10).unwrap_err();
        assert!(err.to_string().contains("must be greater than start"));
        assert!(validate_window(0.0, 1.0, 1).is_err());
    }
}
