//! Gaussian, Lorentzian and Voigt line profiles and their fitters.

use std::f64::consts::{PI, SQRT_2};
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::levmarq::{numeric_derivatives, LevMarq, LevMarqFunc};
use super::FunctionFitter;
use crate::error::{Result, SplatError};

const SQRT_2PI: f64 = 2.506_628_274_631_000_2;
/// FWHM of a Gaussian in units of sigma, `2 sqrt(2 ln 2)`.
pub const GAUSS_FWHM: f64 = 2.354_820_045_030_949_3;

/// Shape of a line profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKind {
    /// Parameters: scale, centre, sigma.
    Gaussian,
    /// Parameters: scale, centre, half width at half maximum.
    Lorentzian,
    /// Parameters: scale, centre, Gaussian sigma, Lorentzian HWHM.
    Voigt,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileKind::Gaussian => "Gaussian",
            ProfileKind::Lorentzian => "Lorentz",
            ProfileKind::Voigt => "Voigt",
        })
    }
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 3] = [
        ProfileKind::Gaussian,
        ProfileKind::Lorentzian,
        ProfileKind::Voigt,
    ];

    pub fn nparams(self) -> usize {
        match self {
            ProfileKind::Voigt => 4,
            _ => 3,
        }
    }

    /// Names of the parameters in order.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ProfileKind::Gaussian => &["scale", "centre", "sigma"],
            ProfileKind::Lorentzian => &["scale", "centre", "width"],
            ProfileKind::Voigt => &["scale", "centre", "gwidth", "lwidth"],
        }
    }

    /// Parameters seeded from a peak, centre and half width estimate.
    pub fn initial_params(self, peak: f64, centre: f64, width: f64) -> Vec<f64> {
        match self {
            ProfileKind::Gaussian | ProfileKind::Lorentzian => vec![peak, centre, width],
            ProfileKind::Voigt => vec![peak, centre, 0.25 * width, 0.75 * width],
        }
    }

    /// Profile value at `x`.
    pub fn value(self, x: f64, p: &[f64]) -> f64 {
        let dx = x - p[1];
        match self {
            ProfileKind::Gaussian => p[0] * (-0.5 * (dx / p[2]).powi(2)).exp(),
            ProfileKind::Lorentzian => p[0] / (1.0 + (dx / p[2]).powi(2)),
            ProfileKind::Voigt => p[0] * voigt_shape(dx, p[2], p[3]),
        }
    }

    /// Profile value and partial derivatives with respect to `p`.
    pub fn eval(self, x: f64, p: &[f64], dyda: &mut [f64]) -> f64 {
        match self {
            ProfileKind::Gaussian => {
                let dx = x - p[1];
                let s2 = p[2] * p[2];
                let e = (-0.5 * dx * dx / s2).exp();
                dyda[0] = e;
                dyda[1] = p[0] * e * dx / s2;
                dyda[2] = p[0] * e * dx * dx / (s2 * p[2]);
                p[0] * e
            }
            ProfileKind::Lorentzian => {
                let dx = x - p[1];
                let w2 = p[2] * p[2];
                let d = 1.0 / (1.0 + dx * dx / w2);
                dyda[0] = d;
                dyda[1] = 2.0 * p[0] * d * d * dx / w2;
                dyda[2] = 2.0 * p[0] * d * d * dx * dx / (w2 * p[2]);
                p[0] * d
            }
            ProfileKind::Voigt => {
                numeric_derivatives(|x, p| ProfileKind::Voigt.value(x, p), x, p, dyda)
            }
        }
    }

    /// Integrated flux of the profile.
    pub fn flux(self, p: &[f64]) -> f64 {
        match self {
            ProfileKind::Gaussian => p[0] * p[2].abs() * SQRT_2PI,
            ProfileKind::Lorentzian => PI * p[0] * p[2].abs(),
            ProfileKind::Voigt => {
                let sigma = voigt_sigma(p[2]);
                let y0 = p[3].abs() / (sigma * SQRT_2);
                p[0] * sigma * SQRT_2PI / faddeeva(0.0, y0).re
            }
        }
    }

    /// Full width at half maximum. The Voigt value uses the Olivero and
    /// Longbothum approximation.
    pub fn fwhm(self, p: &[f64]) -> f64 {
        match self {
            ProfileKind::Gaussian => GAUSS_FWHM * p[2].abs(),
            ProfileKind::Lorentzian => 2.0 * p[2].abs(),
            ProfileKind::Voigt => {
                let fg = GAUSS_FWHM * p[2].abs();
                let fl = 2.0 * p[3].abs();
                0.5346 * fl + (0.2166 * fl * fl + fg * fg).sqrt()
            }
        }
    }

    /// First order error on the flux from independent parameter errors.
    pub fn flux_error(self, p: &[f64], errors: &[f64]) -> f64 {
        let mut q = p.to_vec();
        let mut sum = 0.0;
        for i in 0..p.len() {
            if errors[i] == 0.0 {
                continue;
            }
            let h = 1e-6 * p[i].abs().max(1e-6);
            q[i] = p[i] + h;
            let up = self.flux(&q);
            q[i] = p[i] - h;
            let down = self.flux(&q);
            q[i] = p[i];
            let d = (up - down) / (2.0 * h) * errors[i];
            sum += d * d;
        }
        sum.sqrt()
    }
}

fn voigt_sigma(sigma: f64) -> f64 {
    sigma.abs().max(1e-10)
}

/// Peak-normalised Voigt shape at offset `dx` from the centre.
pub fn voigt_shape(dx: f64, sigma: f64, gamma: f64) -> f64 {
    let k = 1.0 / (voigt_sigma(sigma) * SQRT_2);
    let y = gamma.abs() * k;
    faddeeva(dx * k, y).re / faddeeva(0.0, y).re
}

/// Faddeeva function `w(x + iy)` for `y >= 0`, Humlicek's W4 rational
/// approximation (relative accuracy about 1e-4).
pub fn faddeeva(x: f64, y: f64) -> Complex64 {
    let t = Complex64::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        t * 0.5641896 / (0.5 + t * t)
    } else if s >= 5.5 {
        let u = t * t;
        t * (1.410474 + u * 0.5641896) / (0.75 + u * (3.0 + u))
    } else if y >= 0.195 * x.abs() - 0.176 {
        (16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236))))
            / (16.4955 + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t)))))
    } else {
        let u = t * t;
        let num = t
            * (36183.31
                - u * (3321.9905
                    - u * (1540.787 - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
        let den = 32066.6
            - u * (24322.84
                - u * (9022.228
                    - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
        u.exp() - num / den
    }
}

// ---------------------------------------------------------------------------
// Sum of profiles as a LevMarq model
// ---------------------------------------------------------------------------

/// Sum of several profiles with their parameters concatenated in order.
#[derive(Debug, Clone)]
pub struct ProfileModel {
    components: Vec<ProfileKind>,
    offsets: Vec<usize>,
}

impl ProfileModel {
    pub fn new(components: Vec<ProfileKind>) -> Self {
        let mut offsets = Vec::with_capacity(components.len());
        let mut at = 0;
        for c in &components {
            offsets.push(at);
            at += c.nparams();
        }
        ProfileModel {
            components,
            offsets,
        }
    }

    pub fn single(kind: ProfileKind) -> Self {
        Self::new(vec![kind])
    }

    pub fn nparams(&self) -> usize {
        self.components.iter().map(|c| c.nparams()).sum()
    }

    /// Parameter slice of component `i` within the concatenated vector.
    pub fn component_params<'p>(&self, i: usize, params: &'p [f64]) -> &'p [f64] {
        let start = self.offsets[i];
        &params[start..start + self.components[i].nparams()]
    }

    pub fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }

    pub fn components(&self) -> &[ProfileKind] {
        &self.components
    }

    pub fn value(&self, x: f64, params: &[f64]) -> f64 {
        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| c.value(x, self.component_params(i, params)))
            .sum()
    }
}

impl LevMarqFunc for ProfileModel {
    fn eval(&self, x: f64, params: &[f64], dyda: &mut [f64]) -> f64 {
        let mut sum = 0.0;
        for (i, c) in self.components.iter().enumerate() {
            let start = self.offsets[i];
            let end = start + c.nparams();
            sum += c.eval(x, &params[start..end], &mut dyda[start..end]);
        }
        sum
    }
}

// ---------------------------------------------------------------------------
// Single profile fitter
// ---------------------------------------------------------------------------

/// Fit of one profile to extracted line data.
#[derive(Debug, Clone)]
pub struct ProfileFitter {
    kind: ProfileKind,
    params: Vec<f64>,
    errors: Vec<f64>,
    chisq: f64,
    converged: bool,
}

impl ProfileFitter {
    /// Fit `kind` to `y(x)` starting from `params`. Without weights unit
    /// sigmas are used and errors are rebased on the final χ².
    pub fn fit(
        kind: ProfileKind,
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        params: Vec<f64>,
        iterations: usize,
    ) -> Result<Self> {
        if params.len() != kind.nparams() {
            return Err(SplatError::LengthMismatch {
                what: "profile parameters",
                expected: kind.nparams(),
                got: params.len(),
            });
        }
        let model = ProfileModel::single(kind);
        let mut lm = LevMarq::new(&model, x, y, weights, params)?;
        lm.set_iterations(iterations);
        lm.fit()?;

        let rebase = weights.is_none();
        let mut params = lm.params().to_vec();
        // Widths only enter squared, report them positive.
        for w in params.iter_mut().skip(2) {
            *w = w.abs();
        }
        let errors = (0..params.len()).map(|i| lm.error(i, rebase)).collect();
        Ok(ProfileFitter {
            kind,
            params,
            errors,
            chisq: lm.chisq(),
            converged: lm.is_converged(),
        })
    }

    pub fn gaussian(
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        scale: f64,
        centre: f64,
        sigma: f64,
    ) -> Result<Self> {
        Self::fit(ProfileKind::Gaussian, x, y, weights, vec![scale, centre, sigma], 20)
    }

    pub fn lorentzian(
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        scale: f64,
        centre: f64,
        width: f64,
    ) -> Result<Self> {
        Self::fit(ProfileKind::Lorentzian, x, y, weights, vec![scale, centre, width], 20)
    }

    pub fn voigt(
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        scale: f64,
        centre: f64,
        gwidth: f64,
        lwidth: f64,
    ) -> Result<Self> {
        Self::fit(ProfileKind::Voigt, x, y, weights, vec![scale, centre, gwidth, lwidth], 20)
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn scale(&self) -> f64 {
        self.params[0]
    }

    pub fn centre(&self) -> f64 {
        self.params[1]
    }

    /// Gaussian sigma or Lorentzian HWHM; the Gaussian part for a Voigt.
    pub fn width(&self) -> f64 {
        self.params[2]
    }

    /// Lorentzian HWHM of a Voigt.
    pub fn lwidth(&self) -> Option<f64> {
        self.params.get(3).copied()
    }

    pub fn fwhm(&self) -> f64 {
        self.kind.fwhm(&self.params)
    }

    pub fn flux(&self) -> f64 {
        self.kind.flux(&self.params)
    }

    pub fn flux_error(&self) -> f64 {
        self.kind.flux_error(&self.params, &self.errors)
    }

    pub fn chisq(&self) -> f64 {
        self.chisq
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }
}

impl FunctionFitter for ProfileFitter {
    fn eval(&self, x: f64) -> f64 {
        self.kind.value(x, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, lo: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| lo + i as f64 * step).collect()
    }

    /// Deterministic +-amp jitter.
    fn jitter(i: usize, amp: f64) -> f64 {
        let v = ((i * 7919) % 13) as f64 / 6.0 - 1.0;
        v * amp
    }

    #[test]
    fn faddeeva_reference_values() {
        assert!((faddeeva(0.0, 0.0).re - 1.0).abs() < 1e-6);
        // w(iy) = exp(y²) erfc(y); w(i) = 0.4275836
        assert!((faddeeva(0.0, 1.0).re - 0.427_583_6).abs() < 5e-4);
        // Pure Gaussian on the real axis.
        for x in [0.5_f64, 1.0, 2.0, 3.0] {
            let expected = (-x * x).exp();
            assert!((faddeeva(x, 0.0).re - expected).abs() < 5e-4, "x = {x}");
        }
    }

    #[test]
    fn voigt_reduces_to_gaussian() {
        let p = [2.0, 10.0, 1.5, 0.0];
        for dx in [-3.0, -1.0, 0.0, 0.7, 2.5] {
            let g = ProfileKind::Gaussian.value(10.0 + dx, &[2.0, 10.0, 1.5]);
            let v = ProfileKind::Voigt.value(10.0 + dx, &p);
            assert!((g - v).abs() < 1e-3, "dx = {dx}: {g} vs {v}");
        }
        let gf = ProfileKind::Gaussian.flux(&[2.0, 10.0, 1.5]);
        assert!((ProfileKind::Voigt.flux(&p) - gf).abs() / gf < 1e-4);
    }

    #[test]
    fn analytic_fluxes() {
        let g = ProfileKind::Gaussian.flux(&[1.0, 0.0, 1.0]);
        assert!((g - (2.0 * PI).sqrt()).abs() < 1e-12);
        let l = ProfileKind::Lorentzian.flux(&[2.0, 0.0, 3.0]);
        assert!((l - 6.0 * PI).abs() < 1e-12);
        assert!((ProfileKind::Lorentzian.fwhm(&[1.0, 0.0, 3.0]) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn fits_noisy_gaussian() {
        let x = grid(81, 4000.0, 0.5);
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &x)| ProfileKind::Gaussian.value(x, &[10.0, 4020.0, 2.0]) + jitter(i, 0.1))
            .collect();
        let fit = ProfileFitter::gaussian(&x, &y, None, 8.0, 4019.0, 3.0).unwrap();
        assert!((fit.scale() - 10.0).abs() < 0.2);
        assert!((fit.centre() - 4020.0).abs() < 0.05);
        assert!((fit.width() - 2.0).abs() < 0.05);
        assert!(fit.errors().iter().all(|e| *e > 0.0));
        assert!(fit.flux_error() > 0.0);
        assert!(fit.calc_rms(&x, &y) < 0.15);
    }

    #[test]
    fn fits_absorption_lorentzian() {
        let x = grid(101, -10.0, 0.2);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| ProfileKind::Lorentzian.value(x, &[-5.0, 0.3, 1.2]))
            .collect();
        let fit = ProfileFitter::lorentzian(&x, &y, None, -4.0, 0.0, 1.0).unwrap();
        assert!((fit.scale() + 5.0).abs() < 1e-3);
        assert!((fit.centre() - 0.3).abs() < 1e-3);
        assert!((fit.width() - 1.2).abs() < 1e-3);
        assert!(fit.flux() < 0.0);
    }

    #[test]
    fn fits_voigt() {
        let truth = [3.0, 50.0, 1.0, 0.8];
        let x = grid(121, 35.0, 0.25);
        let y: Vec<f64> = x.iter().map(|&x| ProfileKind::Voigt.value(x, &truth)).collect();
        let init = ProfileKind::Voigt.initial_params(2.5, 49.8, 2.5);
        let fit = ProfileFitter::fit(ProfileKind::Voigt, &x, &y, None, init, 20).unwrap();
        assert!((fit.scale() - 3.0).abs() < 0.02);
        assert!((fit.centre() - 50.0).abs() < 0.01);
        assert!((fit.width() - 1.0).abs() < 0.05);
        assert!((fit.lwidth().unwrap() - 0.8).abs() < 0.05);
    }

    #[test]
    fn model_sums_components() {
        let model = ProfileModel::new(vec![ProfileKind::Gaussian, ProfileKind::Voigt]);
        assert_eq!(model.nparams(), 7);
        let p = [1.0, 0.0, 1.0, 2.0, 5.0, 1.0, 0.5];
        let v = model.value(0.0, &p);
        let expected = 1.0 + ProfileKind::Voigt.value(0.0, &p[3..]);
        assert!((v - expected).abs() < 1e-12);
        assert_eq!(model.component_params(1, &p), &p[3..]);
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let x = grid(10, 0.0, 1.0);
        let y = vec![0.0; 10];
        assert!(ProfileFitter::fit(ProfileKind::Voigt, &x, &y, None, vec![1.0, 0.0, 1.0], 20).is_err());
    }
}
