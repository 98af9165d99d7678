//! Polynomial continuum fitting.
//!
//! Weighted linear least squares: rows of the Vandermonde matrix are scaled
//! by `sqrt(w)` and the system is solved by SVD. Coordinates are shifted and
//! scaled onto roughly `[-1, 1]` before the matrix is built, which keeps
//! wavelength-sized coordinates well conditioned.

use std::fmt::Write as _;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::FunctionFitter;
use crate::data::model::{divide_data, subtract_data, SpecData, SpecType};
use crate::data::ranges::{extract_ranges_data, Background};
use crate::error::{Result, SplatError};

/// Fitted polynomial `Σ c_k x^k`.
#[derive(Debug, Clone)]
pub struct PolynomialFitter {
    degree: usize,
    /// Coefficients in the scaled variable `(x - offset) / scale`.
    scaled: Vec<f64>,
    offset: f64,
    scale: f64,
    chisq: f64,
    nfree: isize,
    weighted: bool,
}

fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(b, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}

impl PolynomialFitter {
    pub fn new(degree: usize, x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Result<Self> {
        let n = x.len();
        if y.len() != n {
            return Err(SplatError::LengthMismatch {
                what: "polynomial data values",
                expected: n,
                got: y.len(),
            });
        }
        if let Some(w) = weights {
            if w.len() != n {
                return Err(SplatError::LengthMismatch {
                    what: "polynomial weights",
                    expected: n,
                    got: w.len(),
                });
            }
        }
        let ncoeff = degree + 1;
        if n < ncoeff {
            return Err(SplatError::InvalidParameter(format!(
                "a degree {degree} polynomial needs at least {ncoeff} points, have {n}"
            )));
        }

        let lo = x.iter().copied().fold(f64::MAX, f64::min);
        let hi = x.iter().copied().fold(f64::MIN, f64::max);
        let offset = 0.5 * (lo + hi);
        let scale = if hi > lo { 0.5 * (hi - lo) } else { 1.0 };

        let mut a = DMatrix::zeros(n, ncoeff);
        let mut b = DVector::zeros(n);
        for i in 0..n {
            let sw = weights.map_or(1.0, |w| w[i].sqrt());
            let t = (x[i] - offset) / scale;
            let mut p = 1.0;
            for k in 0..ncoeff {
                a[(i, k)] = p * sw;
                p *= t;
            }
            b[i] = y[i] * sw;
        }
        let beta = solve_least_squares(&a, &b).ok_or(SplatError::SingularMatrix)?;

        let mut fitter = PolynomialFitter {
            degree,
            scaled: beta.iter().copied().collect(),
            offset,
            scale,
            chisq: 0.0,
            nfree: n as isize - ncoeff as isize,
            weighted: weights.is_some(),
        };
        fitter.chisq = (0..n)
            .map(|i| {
                let d = y[i] - fitter.eval(x[i]);
                d * d * weights.map_or(1.0, |w| w[i])
            })
            .sum();
        Ok(fitter)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Coefficients in ascending powers of `x`.
    pub fn coeffs(&self) -> Vec<f64> {
        // Expand Σ b_k ((x - o)/s)^k into powers of x.
        let n = self.scaled.len();
        let mut out = vec![0.0; n];
        let mut binom = vec![0.0; n];
        for (k, &b) in self.scaled.iter().enumerate() {
            // binom holds C(k, j) for j <= k
            binom[k] = 1.0;
            for j in (1..k).rev() {
                binom[j] += binom[j - 1];
            }
            binom[0] = 1.0;
            let sk = b / self.scale.powi(k as i32);
            for j in 0..=k {
                out[j] += sk * binom[j] * (-self.offset).powi((k - j) as i32);
            }
        }
        out
    }

    /// `[χ², Q]` where `Q` is the probability of a χ² this large by chance.
    /// Only meaningful for weighted fits.
    pub fn chi(&self) -> [f64; 2] {
        let prob = if self.nfree > 0 {
            gammq(0.5 * self.nfree as f64, 0.5 * self.chisq)
        } else {
            1.0
        };
        [self.chisq, prob]
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }
}

impl FunctionFitter for PolynomialFitter {
    fn eval(&self, x: f64) -> f64 {
        let t = (x - self.offset) / self.scale;
        self.scaled.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }
}

// ---------------------------------------------------------------------------
// Incomplete gamma function
// ---------------------------------------------------------------------------

fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

/// Regularised upper incomplete gamma function `Q(a, x)`.
pub fn gammq(a: f64, x: f64) -> f64 {
    if x < 0.0 || a <= 0.0 {
        return f64::NAN;
    }
    if x < a + 1.0 {
        1.0 - gser(a, x)
    } else {
        gcf(a, x)
    }
}

const ITMAX: usize = 200;
const EPS: f64 = 3.0e-12;
const FPMIN: f64 = 1.0e-300;

fn gser(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..ITMAX {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gcf(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=ITMAX {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

// ---------------------------------------------------------------------------
// Fitting a spectrum
// ---------------------------------------------------------------------------

/// Whether, and which way round, to subtract the fit from the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubtractMode {
    #[default]
    None,
    /// Spectrum minus fit, the fit acting as a base line.
    Baseline,
    /// Fit minus spectrum, the fit acting as a ceiling.
    Ceiling,
}

/// The difference and ratio spectra of `spec` against model values
/// `model_y` named `name`. Difference errors are the spectrum errors when
/// `keep_errors` is set.
pub(crate) fn derived_spectra(
    spec: &SpecData,
    model_y: &[f64],
    name: &str,
    subtract: SubtractMode,
    divide: bool,
    keep_errors: bool,
) -> Result<(Option<SpecData>, Option<SpecData>)> {
    let spec_name = &spec.short_name;
    let errors = || if keep_errors { spec.y_errors().map(<[f64]>::to_vec) } else { None };
    let subtracted = match subtract {
        SubtractMode::None => None,
        SubtractMode::Baseline => Some(spec.derive(
            format!("Diff: ({spec_name}) - ({name})"),
            subtract_data(spec.y_data(), model_y),
            errors(),
        )?),
        SubtractMode::Ceiling => Some(spec.derive(
            format!("Diff: ({name}) - ({spec_name})"),
            subtract_data(model_y, spec.y_data()),
            errors(),
        )?),
    };

    let ratio = if divide {
        let (values, errs) = divide_data(spec.y_data(), spec.y_errors(), model_y);
        Some(spec.derive(format!("Ratio: ({spec_name}) by ({name})"), values, errs)?)
    } else {
        None
    };
    Ok((subtracted, ratio))
}

/// Spectra and report produced by [`fit_polynomial`].
#[derive(Debug, Clone)]
pub struct PolyFitOutput {
    pub fitter: PolynomialFitter,
    pub fit: SpecData,
    pub subtracted: Option<SpecData>,
    pub ratio: Option<SpecData>,
    pub report: String,
}

/// Fit a polynomial to the samples of `spec` inside the index `pairs` (the
/// whole spectrum when empty) and evaluate it over the full coordinate grid.
/// `name` is used for the fit spectrum.
pub fn fit_polynomial(
    spec: &SpecData,
    pairs: &[(usize, usize)],
    degree: usize,
    use_errors: bool,
    subtract: SubtractMode,
    divide: bool,
    name: &str,
) -> Result<PolyFitOutput> {
    let whole = [(0, spec.len() - 1)];
    let pairs = if pairs.is_empty() { &whole[..] } else { pairs };
    let errors = if use_errors { spec.y_errors() } else { None };

    let ex = extract_ranges_data(pairs, spec.x_data(), spec.y_data(), errors, Background::None);
    if ex.is_empty() {
        return Err(SplatError::NoValidData { line: 0 });
    }
    let fitter = PolynomialFitter::new(degree, &ex.x, &ex.y, ex.weights.as_deref())?;

    let fit_y = fitter.eval_array(spec.x_data());
    let mut fit = spec.derive(name, fit_y.clone(), None)?.with_type(SpecType::Polynomial);
    fit.metadata = spec.metadata.clone();

    let (subtracted, ratio) = derived_spectra(spec, &fit_y, name, subtract, divide, false)?;
    let spec_name = &spec.short_name;

    let mut report = String::new();
    let _ = writeln!(report, "Results of fit\t: \"{spec_name}\"");
    let _ = writeln!(report, "Fit short name\t: \"{name}\"");
    let _ = writeln!(report, "Degree\t: {degree}");
    if fitter.is_weighted() {
        let [chisq, prob] = fitter.chi();
        let _ = writeln!(report, "Chi square\t: {chisq}");
        let _ = writeln!(report, "Chi probability\t: {prob}");
    }
    let _ = writeln!(report, "RMS\t: {}", fitter.calc_rms(&ex.x, &ex.y));
    let _ = writeln!(report, "Coefficients");
    for c in fitter.coeffs() {
        let _ = writeln!(report, "\t: {c}");
    }

    log::info!("Fitted degree {degree} polynomial to '{spec_name}' using {} points", ex.len());
    Ok(PolyFitOutput {
        fitter,
        fit,
        subtracted,
        ratio,
        report,
    })
}
