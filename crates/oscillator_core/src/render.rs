//! SVG rendering of the typeset solution and of the response plot.
//!
//! All drawing goes through a [`Surface`], an offscreen canvas that is
//! released when it is dropped, on success and on every error path alike.

use crate::error::{OscillatorError, OscillatorResult};
use crate::expression::{round_significant, Equation};
use crate::oscillator::ResponseCurve;
use crate::settings::ImageSettings;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt::Write as _;
use tracing::trace;

thread_local! {
    static LIVE_SURFACES: Cell<usize> = const { Cell::new(0) };
}

/// Number of surfaces currently held on this thread.
pub fn live_surfaces() -> usize {
    LIVE_SURFACES.with(Cell::get)
}

/// Glyph advance as a fraction of the font size, for layout estimates.
const GLYPH_WIDTH: f64 = 0.6;
const MIN_FONT_SIZE: f64 = 8.0;
const TEXT_MARGIN: f64 = 8.0;

/// Offscreen drawing surface.
pub(crate) struct Surface {
    width: u32,
    height: u32,
    elements: Vec<String>,
}

impl Surface {
    pub(crate) fn acquire(width: u32, height: u32) -> Self {
        let live = LIVE_SURFACES.with(|count| {
            count.set(count.get() + 1);
            count.get()
        });
        trace!(width, height, live, "surface acquired");
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }

    fn draw(&mut self, element: String) {
        self.elements.push(element);
    }

    /// Serialises the surface into a standalone SVG document.
    pub(crate) fn finish(mut self, view_box: (f64, f64, f64, f64)) -> String {
        let (x, y, w, h) = view_box;
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"{x} {y} {w} {h}\">",
            self.width, self.height
        );
        for element in std::mem::take(&mut self.elements) {
            svg.push_str(&element);
        }
        svg.push_str("</svg>");
        svg
    }

    fn full_view(&self) -> (f64, f64, f64, f64) {
        (0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        let live = LIVE_SURFACES.with(|count| {
            let remaining = count.get().saturating_sub(1);
            count.set(remaining);
            remaining
        });
        trace!(live, "surface released");
    }
}

/// A typeset solution: the SVG image plus its LaTeX and Unicode sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionImage {
    pub width: u32,
    pub height: u32,
    pub latex: String,
    pub text: String,
    pub svg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotImage {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub svg: String,
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Typesets `equation` centred in the configured solution region.
///
/// The font shrinks to fit the width down to a minimum size; past that the
/// view box widens so nothing is clipped.
pub fn render_solution(equation: &Equation, settings: &ImageSettings) -> SolutionImage {
    let text = equation.to_pretty();
    let mut surface = Surface::acquire(settings.solution_width, settings.solution_height);
    let (width, height) = (
        f64::from(settings.solution_width),
        f64::from(settings.solution_height),
    );

    let glyphs = text.chars().count().max(1) as f64;
    let available = width - 2.0 * TEXT_MARGIN;
    let font_size = if glyphs * GLYPH_WIDTH * settings.font_size > available {
        (available / (glyphs * GLYPH_WIDTH)).max(MIN_FONT_SIZE)
    } else {
        settings.font_size
    };
    let text_width = glyphs * GLYPH_WIDTH * font_size;
    let view_box = if text_width > available {
        let view_width = text_width + 2.0 * TEXT_MARGIN;
        (-(view_width - width) / 2.0, 0.0, view_width, height)
    } else {
        surface.full_view()
    };

    surface.draw(format!(
        "<rect x=\"{}\" y=\"0\" width=\"{}\" height=\"{height}\" fill=\"white\"/>",
        view_box.0, view_box.2
    ));
    surface.draw(format!(
        "<text x=\"{}\" y=\"{}\" font-family=\"serif\" font-size=\"{font_size:.2}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
        width / 2.0,
        height / 2.0,
        escape(&text)
    ));

    SolutionImage {
        width: settings.solution_width,
        height: settings.solution_height,
        latex: equation.to_latex(),
        text,
        svg: surface.finish(view_box),
    }
}

/// Axis range padded by 5%, or by one unit around a flat signal.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = hi - lo;
    if span <= 1e-12 * hi.abs().max(1.0) {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo - 0.05 * span, hi + 0.05 * span)
    }
}

fn tick_label(value: f64) -> String {
    let rounded = round_significant(value, 3);
    if rounded.abs() < 1e-12 {
        "0".to_string()
    } else {
        format!("{rounded}")
    }
}

const PLOT_MARGIN_LEFT: f64 = 70.0;
const PLOT_MARGIN_RIGHT: f64 = 20.0;
const PLOT_MARGIN_TOP: f64 = 40.0;
const PLOT_MARGIN_BOTTOM: f64 = 55.0;
const TICKS: usize = 5;

/// Line plot of displacement against time with grid, ticks and axis labels.
pub fn render_plot(
    curve: &ResponseCurve,
    title: &str,
    settings: &ImageSettings,
) -> OscillatorResult<PlotImage> {
    let mut surface = Surface::acquire(settings.plot_width, settings.plot_height);

    if curve.times.len() != curve.displacements.len() || curve.times.len() < 2 {
        return Err(OscillatorError::invalid_input(
            "a plot needs at least two (time, displacement) pairs",
        ));
    }
    if let Some(i) = curve
        .times
        .iter()
        .zip(&curve.displacements)
        .position(|(t, x)| !t.is_finite() || !x.is_finite())
    {
        return Err(OscillatorError::evaluation_domain(format!(
            "sample {i} of the response curve is not finite"
        )));
    }

    let width = f64::from(settings.plot_width);
    let height = f64::from(settings.plot_height);
    let left = PLOT_MARGIN_LEFT;
    let right = width - PLOT_MARGIN_RIGHT;
    let top = PLOT_MARGIN_TOP;
    let bottom = height - PLOT_MARGIN_BOTTOM;

    let (t_lo, t_hi) = (curve.times[0], curve.times[curve.times.len() - 1]);
    let (t_lo, t_hi) = if t_hi > t_lo { (t_lo, t_hi) } else { (t_lo - 0.5, t_lo + 0.5) };
    let (x_lo, x_hi) = padded_range(curve.displacements.iter().copied());
    let px = |t: f64| left + (t - t_lo) / (t_hi - t_lo) * (right - left);
    let py = |x: f64| bottom - (x - x_lo) / (x_hi - x_lo) * (bottom - top);

    surface.draw(format!(
        "<rect x=\"0\" y=\"0\" width=\"{width}\" height=\"{height}\" fill=\"white\"/>"
    ));

    for k in 0..=TICKS {
        let fraction = k as f64 / TICKS as f64;
        let t = t_lo + fraction * (t_hi - t_lo);
        let x = x_lo + fraction * (x_hi - x_lo);
        let (gx, gy) = (px(t), py(x));
        surface.draw(format!(
            "<line x1=\"{gx:.2}\" y1=\"{top:.2}\" x2=\"{gx:.2}\" y2=\"{bottom:.2}\" stroke=\"#dddddd\"/>"
        ));
        surface.draw(format!(
            "<line x1=\"{left:.2}\" y1=\"{gy:.2}\" x2=\"{right:.2}\" y2=\"{gy:.2}\" stroke=\"#dddddd\"/>"
        ));
        surface.draw(format!(
            "<text x=\"{gx:.2}\" y=\"{:.2}\" font-size=\"11\" text-anchor=\"middle\">{}</text>",
            bottom + 16.0,
            tick_label(t)
        ));
        surface.draw(format!(
            "<text x=\"{:.2}\" y=\"{gy:.2}\" font-size=\"11\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>",
            left - 6.0,
            tick_label(x)
        ));
    }

    surface.draw(format!(
        "<path d=\"M{left:.2},{top:.2} L{left:.2},{bottom:.2} L{right:.2},{bottom:.2}\" fill=\"none\" stroke=\"black\"/>"
    ));

    let mut points = String::new();
    for (&t, &x) in curve.times.iter().zip(&curve.displacements) {
        let _ = write!(points, "{:.2},{:.2} ", px(t), py(x));
    }
    surface.draw(format!(
        "<polyline points=\"{}\" fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"1.5\"/>",
        points.trim_end()
    ));

    surface.draw(format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"16\" text-anchor=\"middle\">{}</text>",
        (left + right) / 2.0,
        top / 2.0 + 6.0,
        escape(title)
    ));
    surface.draw(format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"13\" text-anchor=\"middle\">Time [s]</text>",
        (left + right) / 2.0,
        height - 12.0
    ));
    let label_y = (top + bottom) / 2.0;
    surface.draw(format!(
        "<text x=\"16\" y=\"{label_y:.2}\" font-size=\"13\" text-anchor=\"middle\" transform=\"rotate(-90 16 {label_y:.2})\">Displacement [m]</text>"
    ));

    let view = surface.full_view();
    Ok(PlotImage {
        width: settings.plot_width,
        height: settings.plot_height,
        title: title.to_string(),
        svg: surface.finish(view),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{parse, Expr};

    fn curve() -> ResponseCurve {
        let times: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let displacements = times.iter().map(|t| t.cos()).collect();
        ResponseCurve {
            times,
            displacements,
        }
    }

    #[test]
    fn solution_image_carries_sources() {
        let equation = Equation::new(
            Expr::unknown("x", 0, Expr::symbol("t")),
            parse("cos(t)").unwrap(),
        );
        let image = render_solution(&equation, &ImageSettings::default());
        assert_eq!((image.width, image.height), (400, 100));
        assert_eq!(image.text, "x(t) = cos(t)");
        assert_eq!(image.latex, "x{\\left(t \\right)} = \\cos{\\left(t \\right)}");
        assert!(image.svg.starts_with("<svg"));
        assert!(image.svg.contains("x(t) = cos(t)"));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn long_solutions_shrink_then_widen() {
        let long = (0..40).map(|k| format!("{k}*t^{k}")).collect::<Vec<_>>().join(" + ");
        let equation = Equation::new(Expr::symbol("x"), parse(&long).unwrap());
        let image = render_solution(&equation, &ImageSettings::default());
        assert!(image.svg.contains("font-size=\"8.00\""));
        assert!(!image.svg.contains("viewBox=\"0 0 400 100\""));
    }

    #[test]
    fn plot_has_labels_and_releases_its_surface() {
        let plot = render_plot(&curve(), "Simple Harmonic Oscillator", &ImageSettings::default())
            .unwrap();
        assert!(plot.svg.contains("Time [s]"));
        assert!(plot.svg.contains("Displacement [m]"));
        assert!(plot.svg.contains("Simple Harmonic Oscillator"));
        assert!(plot.svg.contains("<polyline"));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn failed_plot_releases_its_surface() {
        let mut bad = curve();
        bad.displacements[7] = f64::NAN;
        let err = render_plot(&bad, "t", &ImageSettings::default()).unwrap_err();
        assert!(err.to_string().contains("sample 7"));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn surfaces_are_counted_while_alive() {
        let a = Surface::acquire(10, 10);
        let b = Surface::acquire(10, 10);
        assert_eq!(live_surfaces(), 2);
        drop(a);
        assert_eq!(live_surfaces(), 1);
        let _ = b.finish((0.0, 0.0, 10.0, 10.0));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a < b & c"), "a &lt; b &amp; c");
    }
}
