/// The filter bank.
///
/// Every filter works on a copy of a spectrum restricted by an optional set
/// of coordinate ranges:
///
/// ```text
///   ranges empty      → whole spectrum
///   include = true    → spec.sect(ranges)    (only inside the ranges)
///   include = false   → spec.subset(ranges)  (ranges cut out)
/// ```
///
/// and produces a new, named spectrum. BAD samples are never invented: a
/// BAD input sample stays BAD except where rebinning merges it away.

pub mod kernel;
pub mod wavelet;
pub mod window;

use serde::{Deserialize, Serialize};

use crate::data::model::SpecData;
use crate::error::{Result, SplatError};
use kernel::Kernel;
pub use wavelet::Wavelet;

/// Filter and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterKind {
    Average { width: usize },
    Median { width: usize },
    Rebin { width: usize },
    Wavelet { wavelet: Wavelet, percent: f64 },
    Gaussian { kernel_width: usize, fwhm: f64 },
    Lorentz { kernel_width: usize, width: f64 },
    Voigt { kernel_width: usize, gwidth: f64, lwidth: f64 },
    /// Convolution by another spectrum's values.
    SpectrumKernel,
}

impl FilterKind {
    /// Short label used in the names of filtered spectra.
    pub fn label(&self) -> String {
        match self {
            FilterKind::Average { width } => format!("Average ({width})"),
            FilterKind::Median { width } => format!("Median ({width})"),
            FilterKind::Rebin { width } => format!("Rebin ({width})"),
            FilterKind::Wavelet { wavelet, percent } => format!("Wavelet ({wavelet} {percent}%)"),
            FilterKind::Gaussian { fwhm, .. } => format!("Gaussian ({fwhm})"),
            FilterKind::Lorentz { width, .. } => format!("Lorentz ({width})"),
            FilterKind::Voigt { gwidth, lwidth, .. } => format!("Voigt ({gwidth},{lwidth})"),
            FilterKind::SpectrumKernel => "Kernel".to_string(),
        }
    }
}

fn odd_width(width: usize, what: &str) -> Result<usize> {
    if width == 0 {
        return Err(SplatError::InvalidParameter(format!("{what} must be at least 1")));
    }
    Ok(if width % 2 == 0 { width + 1 } else { width })
}

fn positive(value: f64, what: &str) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(SplatError::InvalidParameter(format!("{what} must be positive, got {value}")))
    }
}

/// The part of `spec` a filter works on.
fn region(spec: &SpecData, ranges: &[[f64; 2]], include: bool) -> Result<SpecData> {
    if ranges.is_empty() {
        return Ok(spec.clone());
    }
    let part = if include {
        spec.sect(&spec.short_name, ranges)
    } else {
        spec.subset(&spec.short_name, ranges)
    };
    part.ok_or_else(|| {
        SplatError::InvalidParameter(format!(
            "no data of '{}' is left to filter with these ranges",
            spec.short_name
        ))
    })
}

/// Apply a filter. `kernel_spec` supplies the kernel for
/// [`FilterKind::SpectrumKernel`] and is ignored otherwise.
pub fn apply(
    spec: &SpecData,
    kind: &FilterKind,
    kernel_spec: Option<&SpecData>,
    ranges: &[[f64; 2]],
    include: bool,
) -> Result<SpecData> {
    let src = region(spec, ranges, include)?;
    let y = src.y_data();
    let errors = src.y_errors();
    let name = format!("{}: {}", kind.label(), spec.short_name);

    let (values, errs) = match kind {
        FilterKind::Average { width } => window::average(y, errors, odd_width(*width, "average width")?),
        FilterKind::Median { width } => window::median(y, errors, odd_width(*width, "median width")?),
        FilterKind::Rebin { width } => {
            if *width == 0 {
                return Err(SplatError::InvalidParameter("rebin width must be at least 1".into()));
            }
            let r = window::rebin(src.x_data(), y, errors, *width);
            let out = SpecData::new(name, r.x, r.y)?;
            let mut out = match r.errors {
                Some(e) => out.with_errors(e)?,
                None => out,
            };
            out.metadata = spec.metadata.clone();
            log::info!("Applied {} to '{}'", kind.label(), spec.short_name);
            return Ok(out);
        }
        FilterKind::Wavelet { wavelet, percent } => {
            if !(0.0..=100.0).contains(percent) {
                return Err(SplatError::InvalidParameter(format!(
                    "wavelet percentage must be between 0 and 100, got {percent}"
                )));
            }
            (wavelet::denoise(y, *wavelet, *percent), errors.map(<[f64]>::to_vec))
        }
        FilterKind::Gaussian { kernel_width, fwhm } => {
            let k = Kernel::gaussian(odd_width(*kernel_width, "kernel width")?, positive(*fwhm, "FWHM")?);
            kernel::convolve(y, errors, &k)
        }
        FilterKind::Lorentz { kernel_width, width } => {
            let k = Kernel::lorentz(odd_width(*kernel_width, "kernel width")?, positive(*width, "width")?);
            kernel::convolve(y, errors, &k)
        }
        FilterKind::Voigt {
            kernel_width,
            gwidth,
            lwidth,
        } => {
            let k = Kernel::voigt(
                odd_width(*kernel_width, "kernel width")?,
                positive(*gwidth, "Gaussian width")?,
                positive(*lwidth, "Lorentzian width")?,
            );
            kernel::convolve(y, errors, &k)
        }
        FilterKind::SpectrumKernel => {
            let ks = kernel_spec.ok_or_else(|| {
                SplatError::InvalidParameter("no spectrum selected as the kernel".into())
            })?;
            let k = Kernel::from_values(ks.y_data()).ok_or_else(|| {
                SplatError::InvalidParameter(format!(
                    "spectrum '{}' cannot be used as a kernel",
                    ks.short_name
                ))
            })?;
            kernel::convolve(y, errors, &k)
        }
    };

    let mut out = src.derive(name, values, errs)?;
    out.metadata = spec.metadata.clone();
    log::info!("Applied {} to '{}'", kind.label(), spec.short_name);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::BAD;

    fn ramp() -> SpecData {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| x * 2.0).collect();
        SpecData::new("ramp", x, y).unwrap()
    }

    #[test]
    fn average_of_linear_data_is_unchanged_inside() {
        let out = apply(&ramp(), &FilterKind::Average { width: 4 }, None, &[], true).unwrap();
        assert_eq!(out.short_name, "Average (4): ramp");
        assert_eq!(out.len(), 20);
        assert!((out.y_data()[10] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn include_ranges_filters_a_section() {
        let out = apply(
            &ramp(),
            &FilterKind::Median { width: 3 },
            None,
            &[[2.0, 5.0], [10.0, 12.0]],
            true,
        )
        .unwrap();
        // Four plus three samples and one BAD separator.
        assert_eq!(out.len(), 8);
        assert_eq!(out.y_data()[4], BAD);
    }

    #[test]
    fn exclude_ranges_cuts_them_out() {
        let out = apply(&ramp(), &FilterKind::Rebin { width: 1 }, None, &[[0.0, 9.0]], false).unwrap();
        assert_eq!(out.len(), 11);
        assert_eq!(out.y_data()[0], BAD);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let spec = ramp();
        assert!(apply(&spec, &FilterKind::Average { width: 0 }, None, &[], true).is_err());
        let wav = FilterKind::Wavelet {
            wavelet: Wavelet::Haar,
            percent: 120.0,
        };
        assert!(apply(&spec, &wav, None, &[], true).is_err());
        let gauss = FilterKind::Gaussian {
            kernel_width: 5,
            fwhm: -1.0,
        };
        assert!(apply(&spec, &gauss, None, &[], true).is_err());
        assert!(apply(&spec, &FilterKind::SpectrumKernel, None, &[], true).is_err());
    }

    #[test]
    fn spectrum_kernel_smooths() {
        let mut y = vec![0.0; 21];
        y[10] = 10.0;
        let x: Vec<f64> = (0..21).map(|i| i as f64).collect();
        let spec = SpecData::new("spike", x, y).unwrap();
        let k = SpecData::new("k", vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 1.0]).unwrap();
        let out = apply(&spec, &FilterKind::SpectrumKernel, Some(&k), &[], true).unwrap();
        assert!((out.y_data()[10] - 5.0).abs() < 1e-12);
        assert!((out.y_data()[9] - 2.5).abs() < 1e-12);
    }
}
