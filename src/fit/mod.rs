/// Line and continuum fitting.
///
/// ```text
///   ranges + spectrum
///        │ extract_line_data
///        ▼
///   ┌──────────┐    seeds    ┌───────────────────────────┐
///   │  quick    │ ──────────▶ │ profiles (LevMarq engine) │
///   └──────────┘             └───────────────────────────┘
///        │                              │
///        └──────────┬───────────────────┘
///                   ▼
///            linefit: results + model spectra
/// ```
///
/// `deblend` fits several profiles at once, `poly` fits continua and
/// `interp` draws them through control points.

pub mod deblend;
pub mod interp;
pub mod levmarq;
pub mod linefit;
pub mod poly;
pub mod profiles;
pub mod quick;

use crate::data::model::{is_bad, BAD};

/// A fitted function that can be evaluated at any coordinate.
pub trait FunctionFitter {
    fn eval(&self, x: f64) -> f64;

    /// Evaluate at many coordinates. BAD coordinates give BAD values.
    fn eval_array(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter()
            .map(|&x| if is_bad(x) { BAD } else { self.eval(x) })
            .collect()
    }

    /// Root mean square residual of the fit to `y(x)`.
    fn calc_rms(&self, x: &[f64], y: &[f64]) -> f64 {
        let n = x.len().min(y.len());
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = x
            .iter()
            .zip(y)
            .map(|(&x, &y)| {
                let d = y - self.eval(x);
                d * d
            })
            .sum();
        (sum / n as f64).sqrt()
    }
}

pub use deblend::{deblend, Component, DeblendBackground, DeblendResult};
pub use interp::{generate_from_curve, CurveOutput, InterpKind, InterpolatedCurve};
pub use linefit::{fit_lines, LineFitOptions, LineFitResult, ProfileResult};
pub use poly::{fit_polynomial, PolyFitOutput, PolynomialFitter, SubtractMode};
pub use profiles::{ProfileFitter, ProfileKind};
pub use quick::QuickLineFitter;
