use crate::equation_engine::CompiledExpr;
use crate::error::{OscillatorError, OscillatorResult};
use crate::settings::InversionSettings;
use tracing::debug;

/// Every time in the search window at which `displacement(t) == target`,
/// ascending.
///
/// Roots are bracketed on a uniform grid, by sign changes of
/// `displacement(t) - target` and by extrema of the displacement (sign changes
/// of the velocity) that touch the target. Brackets are polished with a
/// safeguarded Newton iteration on dual-number derivatives.
pub fn times_at_displacement(
    displacement: &CompiledExpr,
    target: f64,
    settings: &InversionSettings,
) -> OscillatorResult<Vec<f64>> {
    if !target.is_finite() {
        return Err(OscillatorError::invalid_input(format!(
            "displacement must be finite (got {target})"
        )));
    }
    let n = settings.intervals;
    let (t_min, t_max) = (settings.t_min, settings.t_max);
    let h = (t_max - t_min) / n as f64;
    let grid: Vec<f64> = (0..=n)
        .map(|i| if i == n { t_max } else { t_min + i as f64 * h })
        .collect();
    let samples: Vec<(f64, f64)> = grid.iter().map(|&t| displacement.eval_with_slope(t)).collect();
    if samples.iter().any(|(x, v)| !x.is_finite() || !v.is_finite()) {
        return Err(OscillatorError::evaluation_domain(format!(
            "the solution is not finite on [{t_min}, {t_max}]"
        )));
    }

    let scale = samples
        .iter()
        .map(|(x, _)| x.abs())
        .fold(target.abs().max(1.0), f64::max);
    let finder = RootFinder {
        displacement,
        target,
        tolerance: settings.tolerance * scale,
        max_iterations: settings.max_iterations,
    };

    let mut roots = Vec::new();
    for i in 0..n {
        let (t0, t1) = (grid[i], grid[i + 1]);
        let (g0, s0) = (samples[i].0 - target, samples[i].1);
        let (g1, s1) = (samples[i + 1].0 - target, samples[i + 1].1);

        if g0 == 0.0 {
            roots.push(t0);
        } else if g0 * g1 < 0.0 {
            roots.push(finder.polish(t0, t1, g0));
        } else if g1 != 0.0 && s0 * s1 < 0.0 {
            // An extremum inside the interval may touch or cross the target twice.
            let t_ext = finder.locate_extremum(t0, t1, s0);
            let g_ext = displacement.eval(t_ext) - target;
            if g_ext.abs() <= finder.tolerance {
                roots.push(t_ext);
            } else if g_ext * g0 < 0.0 {
                roots.push(finder.polish(t0, t_ext, g0));
                roots.push(finder.polish(t_ext, t1, g_ext));
            }
        }
    }
    if samples[n].0 - target == 0.0 {
        roots.push(t_max);
    }

    roots.sort_by(f64::total_cmp);
    let merge_distance = 1e-9 * (t_max - t_min).max(1.0);
    roots.dedup_by(|a, b| (*a - *b).abs() <= merge_distance);
    debug!(target, count = roots.len(), "inverted displacement");

    if roots.is_empty() {
        return Err(OscillatorError::evaluation_domain(format!(
            "the displacement never reaches {target} for t in [{t_min}, {t_max}]"
        )));
    }
    Ok(roots)
}

struct RootFinder<'a> {
    displacement: &'a CompiledExpr,
    target: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl RootFinder<'_> {
    /// Root of `displacement - target` in `[lo, hi]`, given opposite signs at
    /// the ends (`g_lo` at `lo`).
    fn polish(&self, mut lo: f64, mut hi: f64, g_lo: f64) -> f64 {
        let lo_negative = g_lo < 0.0;
        let mut t = 0.5 * (lo + hi);
        for _ in 0..self.max_iterations {
            let (x, slope) = self.displacement.eval_with_slope(t);
            let g = x - self.target;
            if g.abs() <= self.tolerance {
                break;
            }
            if (g < 0.0) == lo_negative {
                lo = t;
            } else {
                hi = t;
            }
            let newton = t - g / slope;
            t = if slope != 0.0 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
            if hi - lo <= f64::EPSILON * t.abs().max(1.0) {
                break;
            }
        }
        t
    }

    /// Bisects on the velocity for the extremum in `[lo, hi]`.
    fn locate_extremum(&self, mut lo: f64, mut hi: f64, slope_lo: f64) -> f64 {
        for _ in 0..self.max_iterations {
            let mid = 0.5 * (lo + hi);
            let (_, slope) = self.displacement.eval_with_slope(mid);
            if (slope < 0.0) == (slope_lo < 0.0) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;
    use std::f64::consts::PI;

    fn compiled(input: &str) -> CompiledExpr {
        CompiledExpr::new(&parse(input).unwrap(), "t").unwrap()
    }

    #[test]
    fn finds_every_crossing_in_the_window() {
        let times = times_at_displacement(
            &compiled("cos(t)"),
            0.0,
            &InversionSettings::default(),
        )
        .unwrap();
        let expected = [PI / 2.0, 3.0 * PI / 2.0, 5.0 * PI / 2.0];
        assert_eq!(times.len(), expected.len());
        for (t, e) in times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-8, "{t} vs {e}");
        }
    }

    #[test]
    fn finds_tangent_roots_at_extrema() {
        let times = times_at_displacement(
            &compiled("cos(t)"),
            1.0,
            &InversionSettings::default(),
        )
        .unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0], 0.0);
        assert!((times[1] - 2.0 * PI).abs() < 1e-6);
    }

    #[test]
    fn unreachable_target_is_a_domain_error() {
        let err = times_at_displacement(
            &compiled("exp(-t)"),
            2.0,
            &InversionSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::EvaluationDomainError);
    }

    #[test]
    fn respects_a_custom_window() {
        let settings = InversionSettings {
            t_min: -1.0,
            t_max: 1.0,
            ..InversionSettings::default()
        };
        let times = times_at_displacement(&compiled("t^3 - t/4"), 0.0, &settings).unwrap();
        assert_eq!(times.len(), 3);
        assert!((times[0] + 0.5).abs() < 1e-6);
        assert!(times[1].abs() < 1e-6);
        assert!((times[2] - 0.5).abs() < 1e-6);
    }
}
