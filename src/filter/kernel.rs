//! Convolution kernels sampled in pixel units.

use super::window::Filtered;
use crate::data::model::{is_bad, BAD};
use crate::fit::profiles::{voigt_shape, GAUSS_FWHM};

/// A unit-sum kernel and the index of its centre.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub weights: Vec<f64>,
    pub centre: usize,
}

impl Kernel {
    fn sampled(width: usize, shape: impl Fn(f64) -> f64) -> Kernel {
        let centre = width / 2;
        let weights = (0..width).map(|j| shape(j as f64 - centre as f64)).collect();
        Kernel::normalised(weights, centre)
    }

    fn normalised(mut weights: Vec<f64>, centre: usize) -> Kernel {
        let sum: f64 = weights.iter().sum();
        if sum != 0.0 {
            for w in &mut weights {
                *w /= sum;
            }
        }
        Kernel { weights, centre }
    }

    /// Gaussian with the given full width at half maximum.
    pub fn gaussian(width: usize, fwhm: f64) -> Kernel {
        let sigma = fwhm / GAUSS_FWHM;
        Kernel::sampled(width, |d| (-0.5 * (d / sigma).powi(2)).exp())
    }

    /// Lorentzian with the given half width at half maximum.
    pub fn lorentz(width: usize, hwhm: f64) -> Kernel {
        Kernel::sampled(width, |d| 1.0 / (1.0 + (d / hwhm).powi(2)))
    }

    /// Voigt with a Gaussian FWHM and a Lorentzian HWHM.
    pub fn voigt(width: usize, gfwhm: f64, lhwhm: f64) -> Kernel {
        let sigma = gfwhm / GAUSS_FWHM;
        Kernel::sampled(width, |d| voigt_shape(d, sigma, lhwhm))
    }

    /// Kernel taken from the valid values of another spectrum, centred on
    /// the value of largest magnitude. `None` when nothing usable remains.
    pub fn from_values(values: &[f64]) -> Option<Kernel> {
        let weights: Vec<f64> = values.iter().copied().filter(|v| !is_bad(*v)).collect();
        let sum: f64 = weights.iter().sum();
        if weights.is_empty() || sum == 0.0 {
            return None;
        }
        let centre = weights
            .iter()
            .enumerate()
            .fold((0, 0.0_f64), |best, (i, w)| if w.abs() > best.1 { (i, w.abs()) } else { best })
            .0;
        Some(Kernel::normalised(weights, centre))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Convolve `y` with `kernel`. BAD samples and the ends of the data are
/// left out and the remaining kernel weight renormalised; BAD samples stay
/// BAD.
pub fn convolve(y: &[f64], errors: Option<&[f64]>, kernel: &Kernel) -> Filtered {
    let n = y.len();
    let mut out = Vec::with_capacity(n);
    let mut out_err = errors.map(|_| Vec::with_capacity(n));

    for i in 0..n {
        if is_bad(y[i]) {
            out.push(BAD);
            if let Some(oe) = out_err.as_mut() {
                oe.push(BAD);
            }
            continue;
        }
        let mut sum = 0.0;
        let mut wsum = 0.0;
        let mut esum = 0.0;
        for (j, &w) in kernel.weights.iter().enumerate() {
            let Some(k) = (i + j).checked_sub(kernel.centre) else {
                continue;
            };
            if k >= n || is_bad(y[k]) {
                continue;
            }
            sum += w * y[k];
            wsum += w;
            if let Some(e) = errors {
                if !is_bad(e[k]) {
                    esum += w * w * e[k] * e[k];
                }
            }
        }
        if wsum == 0.0 {
            out.push(BAD);
            if let Some(oe) = out_err.as_mut() {
                oe.push(BAD);
            }
        } else {
            out.push(sum / wsum);
            if let Some(oe) = out_err.as_mut() {
                oe.push(esum.sqrt() / wsum.abs());
            }
        }
    }
    (out, out_err)
}
