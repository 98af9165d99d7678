//! Curves through hand-placed control points.
//!
//! A curve is evaluated over the coordinates of a spectrum to give a model
//! spectrum, for instance a continuum drawn by eye, which can then be
//! subtracted from or divided into the spectrum like a polynomial fit.
//! Outside the control points the curve holds its end values.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::poly::{derived_spectra, SubtractMode};
use super::FunctionFitter;
use crate::data::model::{is_bad, SpecData, SpecType};
use crate::error::{Result, SplatError};

/// How the control points are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpKind {
    /// Straight segments.
    #[default]
    Linear,
    /// Natural cubic spline, zero curvature at the ends.
    Spline,
}

impl fmt::Display for InterpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterpKind::Linear => "linear",
            InterpKind::Spline => "spline",
        })
    }
}

impl InterpKind {
    pub const ALL: [InterpKind; 2] = [InterpKind::Linear, InterpKind::Spline];
}

/// Interpolating curve through control points sorted by coordinate.
#[derive(Debug, Clone)]
pub struct InterpolatedCurve {
    kind: InterpKind,
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the control points, all zero when linear.
    d2: Vec<f64>,
}

impl InterpolatedCurve {
    /// Build a curve from `[x, y]` points in any order. BAD points are
    /// ignored; at least two points with distinct coordinates must remain.
    pub fn new(kind: InterpKind, points: &[[f64; 2]]) -> Result<Self> {
        let mut points: Vec<[f64; 2]> = points
            .iter()
            .copied()
            .filter(|p| !is_bad(p[0]) && !is_bad(p[1]))
            .collect();
        if points.len() < 2 {
            return Err(SplatError::InvalidParameter(
                "an interpolated line needs at least two points".into(),
            ));
        }
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        if points.windows(2).any(|w| w[0][0] == w[1][0]) {
            return Err(SplatError::InvalidParameter(
                "interpolation points must have distinct coordinates".into(),
            ));
        }

        let x: Vec<f64> = points.iter().map(|p| p[0]).collect();
        let y: Vec<f64> = points.iter().map(|p| p[1]).collect();
        let d2 = match kind {
            InterpKind::Linear => vec![0.0; x.len()],
            InterpKind::Spline => natural_second_derivatives(&x, &y),
        };
        Ok(InterpolatedCurve { kind, x, y, d2 })
    }

    pub fn kind(&self) -> InterpKind {
        self.kind
    }

    /// Control points in coordinate order.
    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.x.iter().zip(&self.y).map(|(&x, &y)| [x, y])
    }
}

/// Tridiagonal solve for the spline second derivatives with zero
/// curvature at both ends.
fn natural_second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut d2 = vec![0.0; n];
    let mut u = vec![0.0; n];
    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * d2[i - 1] + 2.0;
        d2[i] = (sig - 1.0) / p;
        let slope = (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        u[i] = (6.0 * slope / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
    }
    d2[n - 1] = 0.0;
    for k in (0..n - 1).rev() {
        d2[k] = d2[k] * d2[k + 1] + u[k];
    }
    d2
}

impl FunctionFitter for InterpolatedCurve {
    fn eval(&self, x: f64) -> f64 {
        let n = self.x.len();
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let hi = self.x.partition_point(|&v| v <= x).clamp(1, n - 1);
        let lo = hi - 1;
        let h = self.x[hi] - self.x[lo];
        let a = (self.x[hi] - x) / h;
        let b = (x - self.x[lo]) / h;
        a * self.y[lo]
            + b * self.y[hi]
            + ((a * a * a - a) * self.d2[lo] + (b * b * b - b) * self.d2[hi]) * h * h / 6.0
    }
}

/// Spectra produced by [`generate_from_curve`].
#[derive(Debug, Clone)]
pub struct CurveOutput {
    pub line: SpecData,
    pub subtracted: Option<SpecData>,
    pub ratio: Option<SpecData>,
}

/// Evaluate `curve` over the coordinates of `spec` as a spectrum called
/// `name`, with the optional difference and ratio spectra. Differences
/// keep the errors of `spec`.
pub fn generate_from_curve(
    spec: &SpecData,
    curve: &InterpolatedCurve,
    subtract: SubtractMode,
    divide: bool,
    name: &str,
) -> Result<CurveOutput> {
    let values = curve.eval_array(spec.x_data());
    let line = spec.derive(name, values, None)?.with_type(SpecType::Polynomial);
    let (subtracted, ratio) = derived_spectra(spec, line.y_data(), name, subtract, divide, true)?;
    log::info!(
        "Generated {} line '{name}' through {} points over '{}'",
        curve.kind(),
        curve.x.len(),
        spec.short_name
    );
    Ok(CurveOutput {
        line,
        subtracted,
        ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::BAD;

    fn spectrum() -> SpecData {
        let x: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x + 4.0).collect();
        SpecData::new("star", x, y)
            .unwrap()
            .with_errors(vec![0.5; 11])
            .unwrap()
    }

    #[test]
    fn linear_curve_joins_points_and_holds_ends() {
        let curve = InterpolatedCurve::new(InterpKind::Linear, &[[4.0, 2.0], [0.0, 0.0]]).unwrap();
        assert_eq!(curve.points().next(), Some([0.0, 0.0]));
        assert_eq!(curve.eval(1.0), 0.5);
        assert_eq!(curve.eval(4.0), 2.0);
        assert_eq!(curve.eval(-3.0), 0.0);
        assert_eq!(curve.eval(9.0), 2.0);
        assert_eq!(curve.eval_array(&[BAD]), vec![BAD]);
    }

    #[test]
    fn spline_passes_through_points_and_is_exact_for_lines() {
        let pts = [[0.0, 1.0], [2.0, 5.0], [3.0, 7.0], [6.0, 13.0]];
        let curve = InterpolatedCurve::new(InterpKind::Spline, &pts).unwrap();
        for p in pts {
            assert!((curve.eval(p[0]) - p[1]).abs() < 1e-12);
        }
        assert!((curve.eval(4.5) - 10.0).abs() < 1e-12);

        let bumpy = [[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]];
        let spline = InterpolatedCurve::new(InterpKind::Spline, &bumpy).unwrap();
        let linear = InterpolatedCurve::new(InterpKind::Linear, &bumpy).unwrap();
        assert!(spline.eval(0.5) > linear.eval(0.5));
    }

    #[test]
    fn too_few_or_repeated_points_are_errors() {
        assert!(InterpolatedCurve::new(InterpKind::Linear, &[[1.0, 1.0]]).is_err());
        assert!(InterpolatedCurve::new(InterpKind::Linear, &[[1.0, 1.0], [BAD, 2.0]]).is_err());
        assert!(InterpolatedCurve::new(InterpKind::Spline, &[[1.0, 1.0], [1.0, 2.0]]).is_err());
    }

    #[test]
    fn generated_line_with_difference_and_ratio() {
        let spec = spectrum();
        let curve = InterpolatedCurve::new(InterpKind::Linear, &[[0.0, 2.0], [10.0, 2.0]]).unwrap();
        let name = "Interpolated line: 1";
        let out = generate_from_curve(&spec, &curve, SubtractMode::Baseline, true, name).unwrap();

        assert_eq!(out.line.short_name, name);
        assert_eq!(out.line.spec_type, SpecType::Polynomial);
        assert!(!out.line.use_in_auto_ranging);
        assert_eq!(out.line.y_data(), &[2.0; 11][..]);

        let diff = out.subtracted.unwrap();
        assert_eq!(diff.short_name, "Diff: (star) - (Interpolated line: 1)");
        assert_eq!(diff.y_data()[3], 8.0);
        assert_eq!(diff.y_errors().unwrap(), &[0.5; 11][..]);

        let ratio = out.ratio.unwrap();
        assert_eq!(ratio.short_name, "Ratio: (star) by (Interpolated line: 1)");
        assert_eq!(ratio.y_data()[3], 5.0);
        assert_eq!(ratio.y_errors().unwrap()[3], 0.25);
    }

    #[test]
    fn ceiling_difference_runs_the_other_way() {
        let spec = spectrum();
        let curve = InterpolatedCurve::new(InterpKind::Linear, &[[0.0, 30.0], [10.0, 30.0]]).unwrap();
        let out = generate_from_curve(&spec, &curve, SubtractMode::Ceiling, false, "c").unwrap();
        let diff = out.subtracted.unwrap();
        assert_eq!(diff.short_name, "Diff: (c) - (star)");
        assert_eq!(diff.y_data()[0], 26.0);
        assert!(out.ratio.is_none());
    }
}
