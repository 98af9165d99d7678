//! Tool settings shared by the viewer and the command line.

use serde::{Deserialize, Serialize};

use crate::filter::{FilterKind, Wavelet};
use crate::fit::{InterpKind, LineFitOptions, SubtractMode};

/// Filters offered in the filter panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterChoice {
    #[default]
    Average,
    Median,
    Rebin,
    Wavelet,
    Gaussian,
    Lorentz,
    Voigt,
    SpectrumKernel,
}

impl FilterChoice {
    pub const ALL: [FilterChoice; 8] = [
        FilterChoice::Average,
        FilterChoice::Median,
        FilterChoice::Rebin,
        FilterChoice::Wavelet,
        FilterChoice::Gaussian,
        FilterChoice::Lorentz,
        FilterChoice::Voigt,
        FilterChoice::SpectrumKernel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FilterChoice::Average => "Average",
            FilterChoice::Median => "Median",
            FilterChoice::Rebin => "Rebin",
            FilterChoice::Wavelet => "Wavelet",
            FilterChoice::Gaussian => "Gaussian",
            FilterChoice::Lorentz => "Lorentz",
            FilterChoice::Voigt => "Voigt",
            FilterChoice::SpectrumKernel => "Spectrum",
        }
    }
}

/// Parameters of every filter, kept while the user switches between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub choice: FilterChoice,
    pub average_width: usize,
    pub median_width: usize,
    pub rebin_width: usize,
    pub wavelet: Wavelet,
    pub wavelet_percent: f64,
    /// Width in pixels of the sampled profile kernels.
    pub kernel_width: usize,
    /// Gaussian FWHM in pixels.
    pub gwidth: f64,
    /// Lorentzian HWHM in pixels.
    pub lwidth: f64,
    /// Filter inside the ranges rather than outside them.
    pub include_ranges: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            choice: FilterChoice::Average,
            average_width: 5,
            median_width: 5,
            rebin_width: 2,
            wavelet: Wavelet::Daubechies4,
            wavelet_percent: 50.0,
            kernel_width: 50,
            gwidth: 5.0,
            lwidth: 5.0,
            include_ranges: true,
        }
    }
}

impl FilterParams {
    /// The currently chosen filter with its parameters.
    pub fn kind(&self) -> FilterKind {
        match self.choice {
            FilterChoice::Average => FilterKind::Average {
                width: self.average_width,
            },
            FilterChoice::Median => FilterKind::Median {
                width: self.median_width,
            },
            FilterChoice::Rebin => FilterKind::Rebin {
                width: self.rebin_width,
            },
            FilterChoice::Wavelet => FilterKind::Wavelet {
                wavelet: self.wavelet,
                percent: self.wavelet_percent,
            },
            FilterChoice::Gaussian => FilterKind::Gaussian {
                kernel_width: self.kernel_width,
                fwhm: self.gwidth,
            },
            FilterChoice::Lorentz => FilterKind::Lorentz {
                kernel_width: self.kernel_width,
                width: self.lwidth,
            },
            FilterChoice::Voigt => FilterKind::Voigt {
                kernel_width: self.kernel_width,
                gwidth: self.gwidth,
                lwidth: self.lwidth,
            },
            FilterChoice::SpectrumKernel => FilterKind::SpectrumKernel,
        }
    }
}

/// Polynomial continuum fit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolyParams {
    pub degree: usize,
    pub use_errors: bool,
    pub subtract: SubtractMode,
    pub divide: bool,
}

impl Default for PolyParams {
    fn default() -> Self {
        PolyParams {
            degree: 1,
            use_errors: false,
            subtract: SubtractMode::None,
            divide: false,
        }
    }
}

/// Interpolated line settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpParams {
    pub kind: InterpKind,
    pub subtract: SubtractMode,
    pub divide: bool,
}

/// All tool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fit: LineFitOptions,
    pub filter: FilterParams,
    pub poly: PolyParams,
    pub interp: InterpParams,
    /// Report skewness, kurtosis and friends as well.
    pub full_stats: bool,
}

impl Settings {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.filter.average_width, 5);
        assert_eq!(s.filter.kernel_width, 50);
        assert_eq!(s.poly.degree, 1);
        assert_eq!(s.fit.iterations, 20);
        assert!(s.fit.gaussian);
    }

    #[test]
    fn chosen_filter_kind() {
        let mut p = FilterParams {
            choice: FilterChoice::Median,
            median_width: 7,
            ..FilterParams::default()
        };
        assert_eq!(p.kind(), FilterKind::Median { width: 7 });
        p.choice = FilterChoice::Voigt;
        assert!(matches!(p.kind(), FilterKind::Voigt { kernel_width: 50, .. }));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"poly": {"degree": 3}}"#).unwrap();
        assert_eq!(s.poly.degree, 3);
        assert!(!s.poly.divide);
        assert_eq!(s.filter, FilterParams::default());
        assert!(s.to_json().unwrap().contains("\"degree\": 3"));

        let s: Settings = serde_json::from_str(r#"{"interp": {"kind": "Spline"}}"#).unwrap();
        assert_eq!(s.interp.kind, InterpKind::Spline);
        assert_eq!(s.interp.subtract, SubtractMode::None);
    }
}
