use serde::{Deserialize, Serialize};

use super::profiles::{ProfileFitter, ProfileKind};
use super::quick::QuickLineFitter;
use super::FunctionFitter;
use crate::data::model::{is_bad, SpecData, SpecType, BAD};
use crate::data::ranges::{extract_line_data, lookup, Background, RangeList};
use crate::error::{Result, SplatError};

/// Which profiles to fit to each line, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFitOptions {
    pub gaussian: bool,
    pub lorentzian: bool,
    pub voigt: bool,
    /// Weight the fits by the spectrum errors, when it has them.
    pub use_errors: bool,
    /// Fit only the selected ranges.
    pub selected_only: bool,
    /// Fit iteration limit; the fit gives up after one fewer consecutive
    /// rejected steps.
    pub iterations: usize,
}

impl Default for LineFitOptions {
    fn default() -> Self {
        LineFitOptions {
            gaussian: true,
            lorentzian: false,
            voigt: false,
            use_errors: false,
            selected_only: false,
            iterations: 20,
        }
    }
}

impl LineFitOptions {
    fn kinds(&self) -> Vec<ProfileKind> {
        let mut kinds = Vec::new();
        if self.gaussian {
            kinds.push(ProfileKind::Gaussian);
        }
        if self.lorentzian {
            kinds.push(ProfileKind::Lorentzian);
        }
        if self.voigt {
            kinds.push(ProfileKind::Voigt);
        }
        kinds
    }
}

/// Quick fit measurements of one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickResult {
    /// Peak height, negative for absorption.
    pub peak: f64,
    pub centre: f64,
    pub half_width: f64,
    pub equivalent_width: f64,
    pub asymmetry: f64,
    pub absorption: bool,
}

/// Fitted parameters of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    pub kind: ProfileKind,
    pub scale: f64,
    pub centre: f64,
    /// Gaussian sigma or Lorentzian HWHM; Gaussian sigma of a Voigt.
    pub width: f64,
    /// Lorentzian HWHM of a Voigt.
    pub lwidth: Option<f64>,
    pub fwhm: f64,
    pub flux: f64,
    pub flux_error: f64,
    pub rms: f64,
    /// Errors of the parameters in [`ProfileKind::param_names`] order.
    pub errors: Vec<f64>,
    pub converged: bool,
}

impl ProfileResult {
    pub fn from_fitter(fitter: &ProfileFitter, x: &[f64], y: &[f64]) -> Self {
        ProfileResult {
            kind: fitter.kind(),
            scale: fitter.scale(),
            centre: fitter.centre(),
            width: fitter.width(),
            lwidth: fitter.lwidth(),
            fwhm: fitter.fwhm(),
            flux: fitter.flux(),
            flux_error: fitter.flux_error(),
            rms: fitter.calc_rms(x, y),
            errors: fitter.errors().to_vec(),
            converged: fitter.is_converged(),
        }
    }
}

/// Everything measured for one line region.
#[derive(Debug, Clone)]
pub struct LineFitResult {
    /// Index of the line among the fitted ranges.
    pub line: usize,
    /// Value of the shared fit counter used in the model names.
    pub fit_number: usize,
    pub quick: QuickResult,
    pub profiles: Vec<ProfileResult>,
    /// Quick fit triangle followed by one model per profile.
    pub models: Vec<SpecData>,
}

fn model_name(kind: ProfileKind) -> &'static str {
    match kind {
        ProfileKind::Gaussian => "Gaussian Fit",
        ProfileKind::Lorentzian => "Lorentzian Fit",
        ProfileKind::Voigt => "Voigt Fit",
    }
}

/// Fit every line range of `spec`.
///
/// `background`, when given, is interpolated onto the spectrum coordinates,
/// subtracted before fitting and added back to the model spectra. The fit
/// counter is shared with previous calls so that all spectra produced for
/// one line carry the same number.
pub fn fit_lines(
    spec: &SpecData,
    ranges: &RangeList,
    background: Option<&SpecData>,
    options: &LineFitOptions,
    fit_counter: &mut usize,
) -> Result<Vec<LineFitResult>> {
    let x = spec.x_data();
    let y = spec.y_data();
    let pairs = ranges.index_pairs(x, options.selected_only);
    if pairs.is_empty() {
        return Err(SplatError::NoRanges);
    }

    let back_y = match background {
        Some(b) => Some(b.eval_y_array(x)),
        None => {
            log::info!("Using a zero background for '{}'", spec.short_name);
            None
        }
    };
    let errors = if options.use_errors { spec.y_errors() } else { None };
    let kinds = options.kinds();

    let mut results = Vec::with_capacity(pairs.len());
    for (line, &(lower, upper)) in pairs.iter().enumerate() {
        let bg = back_y.as_deref().map_or(Background::None, Background::Values);
        let ex = extract_line_data(lower, upper, x, y, errors, bg);
        if ex.is_empty() {
            return Err(SplatError::NoValidData { line });
        }

        *fit_counter += 1;
        let number = *fit_counter;

        let quick = QuickLineFitter::new(&ex.x, &ex.y, ex.background.as_deref())?;
        let quick = QuickResult {
            peak: quick.signed_peak(),
            centre: quick.centre(),
            half_width: 0.5 * quick.width(),
            equivalent_width: quick.equivalent_width(),
            asymmetry: quick.asymmetry(),
            absorption: quick.is_absorption(),
        };

        let mut models = vec![quick_model(&quick, &ex.x, ex.background.as_deref(), number)?];
        let mut profiles = Vec::with_capacity(kinds.len());
        for &kind in &kinds {
            let init = kind.initial_params(quick.peak, quick.centre, quick.half_width);
            let fitter = ProfileFitter::fit(
                kind,
                &ex.x,
                &ex.y,
                ex.weights.as_deref(),
                init,
                options.iterations,
            )?;

            let mut fit_y = fitter.eval_array(x);
            if let Some(back) = &back_y {
                for (f, b) in fit_y.iter_mut().zip(back) {
                    *f = if is_bad(*f) || is_bad(*b) { BAD } else { *f + b };
                }
            }
            let name = format!("{}: {number}", model_name(kind));
            models.push(spec.derive(name, fit_y, None)?.with_type(SpecType::LineFit));
            profiles.push(ProfileResult::from_fitter(&fitter, &ex.x, &ex.y));
        }

        log::info!(
            "Line {line} of '{}': centre {:.4}, peak {:.4}",
            spec.short_name,
            quick.centre,
            quick.peak
        );
        results.push(LineFitResult {
            line,
            fit_number: number,
            quick,
            profiles,
            models,
        });
    }
    Ok(results)
}

/// Three point spectrum drawing the Quick fit as a triangle.
fn quick_model(
    quick: &QuickResult,
    coords: &[f64],
    background: Option<&[f64]>,
    number: usize,
) -> Result<SpecData> {
    let c = quick.centre;
    let w = quick.half_width;
    let xs = vec![c - w, c, c + w];
    let mut ys = vec![0.5 * quick.peak, quick.peak, 0.5 * quick.peak];
    if let Some(back) = background {
        for (yv, xv) in ys.iter_mut().zip(&xs) {
            *yv += back[lookup(*xv, coords)];
        }
    }
    Ok(SpecData::new(format!("Quick Fit: {number}"), xs, ys)?.with_type(SpecType::LineFit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_with_lines() -> SpecData {
        let x: Vec<f64> = (0..400).map(|i| 4000.0 + i as f64 * 0.5).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&x| {
                1.0 + ProfileKind::Gaussian.value(x, &[5.0, 4050.0, 1.5])
                    + ProfileKind::Gaussian.value(x, &[-0.6, 4150.0, 2.0])
            })
            .collect();
        SpecData::new("lines", x, y).unwrap()
    }

    fn flat_background(spec: &SpecData, level: f64) -> SpecData {
        spec.derive("continuum", vec![level; spec.len()], None).unwrap()
    }

    #[test]
    fn no_ranges_is_an_error() {
        let spec = spectrum_with_lines();
        let mut counter = 0;
        let err = fit_lines(&spec, &RangeList::new(), None, &LineFitOptions::default(), &mut counter);
        assert!(matches!(err, Err(SplatError::NoRanges)));
    }

    #[test]
    fn emission_and_absorption_lines_over_background() {
        let spec = spectrum_with_lines();
        let back = flat_background(&spec, 1.0);
        let ranges = RangeList::from_pairs(&[[4040.0, 4060.0], [4135.0, 4165.0]]);
        let options = LineFitOptions {
            lorentzian: true,
            ..LineFitOptions::default()
        };
        let mut counter = 3;
        let results = fit_lines(&spec, &ranges, Some(&back), &options, &mut counter).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(counter, 5);

        let emission = &results[0];
        assert!(!emission.quick.absorption);
        assert!((emission.quick.centre - 4050.0).abs() < 0.1);
        let gauss = &emission.profiles[0];
        assert_eq!(gauss.kind, ProfileKind::Gaussian);
        assert!((gauss.scale - 5.0).abs() < 1e-3);
        assert!((gauss.centre - 4050.0).abs() < 1e-4);
        assert!((gauss.width - 1.5).abs() < 1e-3);
        assert_eq!(emission.models.len(), 3);
        assert_eq!(emission.models[0].short_name, "Quick Fit: 4");
        assert_eq!(emission.models[1].short_name, "Gaussian Fit: 4");
        assert_eq!(emission.models[2].short_name, "Lorentzian Fit: 4");
        assert_eq!(emission.models[1].spec_type, SpecType::LineFit);
        assert!(!emission.models[1].use_in_auto_ranging);
        // Background is added back to the model far from the line.
        assert!((emission.models[1].y_data()[0] - 1.0).abs() < 1e-9);

        let absorption = &results[1];
        assert!(absorption.quick.absorption);
        assert!(absorption.quick.peak < 0.0);
        assert!((absorption.profiles[0].scale + 0.6).abs() < 1e-3);
        assert!(absorption.quick.equivalent_width > 0.0);
    }

    #[test]
    fn range_of_bad_data_reports_its_line() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut y = vec![1.0; 20];
        for v in &mut y[10..15] {
            *v = BAD;
        }
        let spec = SpecData::new("gappy", x, y).unwrap();
        let ranges = RangeList::from_pairs(&[[11.0, 13.0], [2.0, 6.0]]);
        let mut counter = 0;
        let err = fit_lines(&spec, &ranges, None, &LineFitOptions::default(), &mut counter);
        assert!(matches!(err, Err(SplatError::NoValidData { line: 0 })));
        assert_eq!(counter, 0);
    }

    #[test]
    fn quick_model_is_a_triangle() {
        let quick = QuickResult {
            peak: 4.0,
            centre: 10.0,
            half_width: 2.0,
            equivalent_width: 0.0,
            asymmetry: 0.0,
            absorption: false,
        };
        let coords = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0];
        let back = [1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0];
        let model = quick_model(&quick, &coords, Some(&back), 7).unwrap();
        assert_eq!(model.x_data(), &[8.0, 10.0, 12.0]);
        assert_eq!(model.y_data(), &[3.0, 6.0, 3.0]);
    }
}
