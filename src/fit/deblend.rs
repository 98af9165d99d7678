//! Simultaneous fitting of blended lines.
//!
//! All components are fitted at once as a sum of profiles over the data in
//! every range. Parameters of any component can be held fixed.

use serde::{Deserialize, Serialize};

use super::levmarq::LevMarq;
use super::linefit::ProfileResult;
use super::profiles::{ProfileKind, ProfileModel};
use crate::data::model::{is_bad, SpecData, SpecType, BAD};
use crate::data::ranges::{extract_ranges_data, Background};
use crate::error::{Result, SplatError};

/// One profile taking part in a deblend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub kind: ProfileKind,
    /// Initial values in [`ProfileKind::param_names`] order.
    pub params: Vec<f64>,
    /// Parameters held at their initial value.
    pub fixed: Vec<bool>,
}

impl Component {
    /// Component with every parameter free.
    pub fn new(kind: ProfileKind, params: Vec<f64>) -> Self {
        let n = params.len();
        Component {
            kind,
            params,
            fixed: vec![false; n],
        }
    }

    pub fn with_fixed(mut self, index: usize) -> Self {
        if let Some(f) = self.fixed.get_mut(index) {
            *f = true;
        }
        self
    }
}

/// Background under the blend.
#[derive(Debug, Clone, Copy)]
pub enum DeblendBackground<'a> {
    Spectrum(&'a SpecData),
    Constant(f64),
}

#[derive(Debug, Clone)]
pub struct DeblendResult {
    pub components: Vec<ProfileResult>,
    /// Sum of all components plus background.
    pub model: SpecData,
    /// Each component on its own, plus background.
    pub component_models: Vec<SpecData>,
    /// The constant background drawn over the fitted region.
    pub constant: Option<SpecData>,
    pub chisq: f64,
    pub converged: bool,
}

pub fn deblend(
    spec: &SpecData,
    pairs: &[(usize, usize)],
    components: &[Component],
    background: DeblendBackground<'_>,
    use_errors: bool,
    iterations: usize,
    name: &str,
) -> Result<DeblendResult> {
    if components.is_empty() {
        return Err(SplatError::InvalidParameter("no components to deblend".into()));
    }
    for c in components {
        if c.params.len() != c.kind.nparams() || c.fixed.len() != c.params.len() {
            return Err(SplatError::LengthMismatch {
                what: "component parameters",
                expected: c.kind.nparams(),
                got: c.params.len(),
            });
        }
    }

    let x = spec.x_data();
    let whole = [(0, spec.len() - 1)];
    let pairs = if pairs.is_empty() { &whole[..] } else { pairs };
    let errors = if use_errors { spec.y_errors() } else { None };

    let back_y: Vec<f64> = match background {
        DeblendBackground::Spectrum(b) => b.eval_y_array(x),
        DeblendBackground::Constant(c) => vec![c; x.len()],
    };
    let ex = extract_ranges_data(pairs, x, spec.y_data(), errors, Background::Values(&back_y));
    if ex.is_empty() {
        return Err(SplatError::NoValidData { line: 0 });
    }

    let model = ProfileModel::new(components.iter().map(|c| c.kind).collect());
    let initial: Vec<f64> = components.iter().flat_map(|c| c.params.iter().copied()).collect();
    let mut lm = LevMarq::new(&model, &ex.x, &ex.y, ex.weights.as_deref(), initial.clone())?;
    lm.set_iterations(iterations);
    for (i, c) in components.iter().enumerate() {
        let at = model.offset(i);
        for (j, &fixed) in c.fixed.iter().enumerate() {
            lm.set_param(at + j, initial[at + j], fixed);
        }
    }
    lm.fit()?;

    let rebase = ex.weights.is_none();
    let mut params = lm.params().to_vec();
    let errors: Vec<f64> = (0..params.len()).map(|i| lm.error(i, rebase)).collect();
    for (i, c) in components.iter().enumerate() {
        let at = model.offset(i);
        for w in &mut params[at + 2..at + c.kind.nparams()] {
            *w = w.abs();
        }
    }

    let fitted: Vec<f64> = ex.x.iter().map(|&xv| model.value(xv, &params)).collect();
    let rms = (fitted
        .iter()
        .zip(&ex.y)
        .map(|(f, y)| (y - f) * (y - f))
        .sum::<f64>()
        / ex.len() as f64)
        .sqrt();

    let with_background = |f: &dyn Fn(f64) -> f64| -> Vec<f64> {
        x.iter()
            .zip(&back_y)
            .map(|(&xv, &b)| if is_bad(xv) || is_bad(b) { BAD } else { f(xv) + b })
            .collect()
    };

    let mut results = Vec::with_capacity(components.len());
    let mut component_models = Vec::with_capacity(components.len());
    for (i, c) in components.iter().enumerate() {
        let at = model.offset(i);
        let p = &params[at..at + c.kind.nparams()];
        let e = &errors[at..at + c.kind.nparams()];
        results.push(ProfileResult {
            kind: c.kind,
            scale: p[0],
            centre: p[1],
            width: p[2],
            lwidth: p.get(3).copied(),
            fwhm: c.kind.fwhm(p),
            flux: c.kind.flux(p),
            flux_error: c.kind.flux_error(p, e),
            rms,
            errors: e.to_vec(),
            converged: lm.is_converged(),
        });
        let values = with_background(&|xv| c.kind.value(xv, p));
        component_models.push(
            spec.derive(format!("{name} ({} {})", c.kind, i + 1), values, None)?
                .with_type(SpecType::LineFit),
        );
    }

    let values = with_background(&|xv| model.value(xv, &params));
    let composite = spec.derive(name, values, None)?.with_type(SpecType::LineFit);

    let constant = match background {
        DeblendBackground::Constant(level) => {
            let lo = ex.x.iter().copied().fold(f64::MAX, f64::min);
            let hi = ex.x.iter().copied().fold(f64::MIN, f64::max);
            Some(
                SpecData::new(format!("{name} (background)"), vec![lo, hi], vec![level, level])?
                    .with_type(SpecType::LineFit),
            )
        }
        DeblendBackground::Spectrum(_) => None,
    };

    log::info!(
        "Deblended {} components of '{}' (chisq {:.4e})",
        components.len(),
        spec.short_name,
        lm.chisq()
    );
    Ok(DeblendResult {
        components: results,
        model: composite,
        component_models,
        constant,
        chisq: lm.chisq(),
        converged: lm.is_converged(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blend() -> SpecData {
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.1).collect();
        let y = x
            .iter()
            .map(|&x| {
                2.0 + ProfileKind::Gaussian.value(x, &[3.0, 9.0, 0.6])
                    + ProfileKind::Gaussian.value(x, &[2.0, 11.0, 0.8])
            })
            .collect();
        SpecData::new("blend", x, y).unwrap()
    }

    #[test]
    fn separates_two_gaussians() {
        let spec = blend();
        let components = [
            Component::new(ProfileKind::Gaussian, vec![2.5, 8.8, 0.5]),
            Component::new(ProfileKind::Gaussian, vec![2.5, 11.2, 0.5]),
        ];
        let out = deblend(
            &spec,
            &[],
            &components,
            DeblendBackground::Constant(2.0),
            false,
            20,
            "Deblend Fit: 1",
        )
        .unwrap();

        let a = &out.components[0];
        let b = &out.components[1];
        assert!((a.scale - 3.0).abs() < 1e-2);
        assert!((a.centre - 9.0).abs() < 1e-2);
        assert!((b.scale - 2.0).abs() < 1e-2);
        assert!((b.width - 0.8).abs() < 1e-2);
        assert!(out.chisq < 1e-3);

        assert_eq!(out.component_models.len(), 2);
        assert_eq!(out.component_models[1].short_name, "Deblend Fit: 1 (Gaussian 2)");
        let constant = out.constant.unwrap();
        assert_eq!(constant.y_data(), &[2.0, 2.0]);
        // Composite reproduces the data.
        let i = 90;
        assert!((out.model.y_data()[i] - spec.y_data()[i]).abs() < 1e-2);
    }

    #[test]
    fn fixed_centre_is_kept() {
        let spec = blend();
        let components = [
            Component::new(ProfileKind::Gaussian, vec![2.5, 9.0, 0.5]).with_fixed(1),
            Component::new(ProfileKind::Gaussian, vec![2.5, 11.0, 0.5]),
        ];
        let back = spec.derive("flat", vec![2.0; spec.len()], None).unwrap();
        let out = deblend(
            &spec,
            &[(50, 150)],
            &components,
            DeblendBackground::Spectrum(&back),
            false,
            20,
            "Deblend Fit: 2",
        )
        .unwrap();
        assert_eq!(out.components[0].centre, 9.0);
        assert_eq!(out.components[0].errors[1], 0.0);
        assert!(out.constant.is_none());
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let spec = blend();
        let components = [Component::new(ProfileKind::Voigt, vec![1.0, 10.0, 0.5])];
        let res = deblend(
            &spec,
            &[],
            &components,
            DeblendBackground::Constant(0.0),
            false,
            20,
            "x",
        );
        assert!(res.is_err());
    }
}
