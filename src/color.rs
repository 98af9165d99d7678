use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use rusty_splat::data::model::{SpecData, SpecType};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Spectrum colours
// ---------------------------------------------------------------------------

/// Colour of a fit spectrum, picked from the kind of fit in its name.
fn fit_color(name: &str) -> Option<Color32> {
    let prefixes = [
        ("Gaussian Fit", Color32::from_rgb(255, 0, 255)),
        ("Lorentzian Fit", Color32::from_rgb(0, 255, 255)),
        ("Voigt Fit", Color32::GRAY),
        ("Quick Fit", Color32::BLACK),
        ("Deblend", Color32::from_rgb(255, 140, 0)),
    ];
    prefixes
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, c)| *c)
}

/// Colour of a spectrum derived from another one, by its name prefix.
fn derived_color(name: &str) -> Option<Color32> {
    const FILTERS: [&str; 8] = [
        "Average (",
        "Median (",
        "Rebin (",
        "Wavelet (",
        "Gaussian (",
        "Lorentz (",
        "Voigt (",
        "Kernel: ",
    ];
    if name.starts_with("Ratio: ") {
        Some(Color32::from_rgb(0, 160, 160))
    } else if name.starts_with("Diff: ") {
        Some(Color32::DARK_GRAY)
    } else if FILTERS.iter().any(|p| name.starts_with(p)) {
        Some(Color32::RED)
    } else {
        None
    }
}

/// Assigns a colour to every spectrum of the session. Analysis products
/// get fixed colours by kind, everything else a palette colour by index.
#[derive(Debug, Clone)]
pub struct SpectrumColors {
    palette: Vec<Color32>,
}

impl SpectrumColors {
    pub fn new(spectra: &[SpecData]) -> Self {
        let n = spectra
            .iter()
            .filter(|s| !matches!(s.spec_type, SpecType::LineFit | SpecType::Polynomial))
            .count();
        SpectrumColors {
            palette: generate_palette(n.max(1)),
        }
    }

    pub fn color_for(&self, spectra: &[SpecData], index: usize) -> Color32 {
        let Some(spec) = spectra.get(index) else {
            return Color32::GRAY;
        };
        match spec.spec_type {
            SpecType::LineFit => fit_color(&spec.short_name).unwrap_or(Color32::GREEN),
            SpecType::Polynomial => Color32::from_rgb(0, 200, 200),
            _ => derived_color(&spec.short_name).unwrap_or_else(|| {
                let slot = spectra[..index]
                    .iter()
                    .filter(|s| !matches!(s.spec_type, SpecType::LineFit | SpecType::Polynomial))
                    .count();
                self.palette[slot % self.palette.len()]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_is_distinct() {
        let p = generate_palette(4);
        assert_eq!(p.len(), 4);
        assert_ne!(p[0], p[1]);
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn fits_get_kind_colours() {
        let base = SpecData::new("a", vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        let gauss = base
            .derive("Gaussian Fit: 1", vec![0.0, 0.0], None)
            .unwrap()
            .with_type(SpecType::LineFit);
        let other = base.derive("b", vec![0.0, 0.0], None).unwrap();
        let spectra = vec![base, gauss, other];
        let colors = SpectrumColors::new(&spectra);
        assert_eq!(colors.color_for(&spectra, 1), Color32::from_rgb(255, 0, 255));
        assert_ne!(colors.color_for(&spectra, 0), colors.color_for(&spectra, 2));
        assert_eq!(colors.color_for(&spectra, 9), Color32::GRAY);
    }

    #[test]
    fn derived_spectra_are_told_apart_by_prefix() {
        let base = SpecData::new("a", vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        let derive = |name: &str| base.derive(name, vec![1.0, 1.0], None).unwrap();
        let spectra = vec![
            derive("Ratio: (a) by (Polynomial Fit: 1)"),
            derive("Diff: (a) - (Polynomial Fit: 1)"),
            derive("Median (5): a"),
            derive("Flip of: a"),
            derive("Copy of: a"),
        ];
        let colors = SpectrumColors::new(&spectra);
        assert_ne!(colors.color_for(&spectra, 0), Color32::RED);
        assert_eq!(colors.color_for(&spectra, 1), Color32::DARK_GRAY);
        assert_eq!(colors.color_for(&spectra, 2), Color32::RED);
        assert_ne!(colors.color_for(&spectra, 3), Color32::RED);
        assert_ne!(colors.color_for(&spectra, 3), colors.color_for(&spectra, 4));
    }
}
