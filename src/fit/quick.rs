use crate::error::{Result, SplatError};

/// Fast, non-iterative line estimate in the manner of Figaro's ABLINE.
///
/// The data should have any background removed already. Absorption lines
/// are detected and measured sign-flipped, so `peak` is always positive.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickLineFitter {
    peak: f64,
    centre: f64,
    width: f64,
    equivalent_width: f64,
    asymmetry: f64,
    absorption: bool,
}

impl QuickLineFitter {
    /// `background`, when given, holds the background level at each
    /// coordinate and is used for the equivalent width.
    pub fn new(coords: &[f64], data: &[f64], background: Option<&[f64]>) -> Result<Self> {
        let n = coords.len();
        if n == 0 {
            return Err(SplatError::NoValidData { line: 0 });
        }
        if data.len() != n {
            return Err(SplatError::LengthMismatch {
                what: "line data",
                expected: n,
                got: data.len(),
            });
        }

        let max = data.iter().copied().fold(f64::MIN, f64::max);
        let min = data.iter().copied().fold(f64::MAX, f64::min);
        let absorption = min < 0.0 && -min > max;
        let sign = if absorption { -1.0 } else { 1.0 };
        let v: Vec<f64> = data.iter().map(|d| d * sign).collect();

        let (ip, peak) = v
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        let x_peak = coords[ip];

        // First moment of the positive part.
        let (sum, wsum) = v
            .iter()
            .zip(coords)
            .filter(|(d, _)| **d > 0.0)
            .fold((0.0, 0.0), |(s, w), (d, x)| (s + d, w + d * x));
        let centre = if sum > 0.0 { wsum / sum } else { x_peak };

        // Half maximum crossings either side of the peak.
        let half = 0.5 * peak;
        let crossing = |j: usize, k: usize| -> f64 {
            let (vj, vk) = (v[j], v[k]);
            if vk == vj {
                coords[j]
            } else {
                coords[j] + (half - vj) * (coords[k] - coords[j]) / (vk - vj)
            }
        };
        let x_left = (0..ip)
            .rev()
            .find(|&j| v[j] < half)
            .map_or(coords[0], |j| crossing(j, j + 1));
        let x_right = (ip + 1..n)
            .find(|&j| v[j] < half)
            .map_or(coords[n - 1], |j| crossing(j, j - 1));

        let mut width = (x_right - x_left).abs();
        if width == 0.0 {
            width = (coords[n - 1] - coords[0]).abs();
        }

        // Sides in coordinate order, whatever the data direction.
        let (lo, hi) = (x_left.min(x_right), x_left.max(x_right));
        let asymmetry = if width > 0.0 {
            100.0 * ((hi - x_peak) - (x_peak - lo)) / width
        } else {
            0.0
        };

        let equivalent_width = match background {
            Some(back) if back.len() == n => {
                let ratio: Vec<f64> = v
                    .iter()
                    .zip(back)
                    .map(|(d, b)| if *b != 0.0 { d / b } else { 0.0 })
                    .collect();
                (1..n)
                    .map(|i| 0.5 * (ratio[i] + ratio[i - 1]) * (coords[i] - coords[i - 1]).abs())
                    .sum()
            }
            _ => 0.0,
        };

        Ok(QuickLineFitter {
            peak,
            centre,
            width,
            equivalent_width,
            asymmetry,
            absorption,
        })
    }

    /// Peak height above the background, always positive.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Peak with the sign of the line, negative for absorption.
    pub fn signed_peak(&self) -> f64 {
        if self.absorption {
            -self.peak
        } else {
            self.peak
        }
    }

    pub fn centre(&self) -> f64 {
        self.centre
    }

    /// Full width at half maximum.
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn equivalent_width(&self) -> f64 {
        self.equivalent_width
    }

    /// Percentage asymmetry of the half maximum points about the peak.
    pub fn asymmetry(&self) -> f64 {
        self.asymmetry
    }

    pub fn is_absorption(&self) -> bool {
        self.absorption
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(n: usize, centre: usize, height: f64) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = x
            .iter()
            .map(|&x| (height - (x - centre as f64).abs()).max(0.0))
            .collect();
        (x, y)
    }

    #[test]
    fn symmetric_emission_line() {
        let (x, y) = triangle(21, 10, 4.0);
        let q = QuickLineFitter::new(&x, &y, None).unwrap();
        assert!(!q.is_absorption());
        assert_eq!(q.peak(), 4.0);
        assert!((q.centre() - 10.0).abs() < 1e-12);
        // Half maximum at 8 and 12.
        assert!((q.width() - 4.0).abs() < 1e-12);
        assert!(q.asymmetry().abs() < 1e-12);
        assert_eq!(q.equivalent_width(), 0.0);
    }

    #[test]
    fn absorption_is_sign_flipped() {
        let (x, y) = triangle(21, 7, 6.0);
        let y: Vec<f64> = y.iter().map(|v| -v).collect();
        let q = QuickLineFitter::new(&x, &y, None).unwrap();
        assert!(q.is_absorption());
        assert_eq!(q.peak(), 6.0);
        assert_eq!(q.signed_peak(), -6.0);
        assert!((q.centre() - 7.0).abs() < 1e-12);
        assert!((q.width() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn equivalent_width_against_background() {
        let (x, y) = triangle(21, 10, 4.0);
        let back = vec![2.0; x.len()];
        let q = QuickLineFitter::new(&x, &y, Some(&back)).unwrap();
        // Triangle area 16 over a level of 2.
        assert!((q.equivalent_width() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn skewed_line_has_positive_asymmetry() {
        let x: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y = vec![0.0, 0.0, 0.0, 4.0, 8.0, 6.0, 4.0, 2.0, 0.0, 0.0, 0.0];
        let q = QuickLineFitter::new(&x, &y, None).unwrap();
        assert!(q.asymmetry() > 0.0);
        assert!((q.asymmetry() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn asymmetry_ignores_coordinate_direction() {
        let x: Vec<f64> = (0..11).rev().map(|i| i as f64).collect();
        let y = vec![0.0, 0.0, 0.0, 2.0, 4.0, 6.0, 8.0, 4.0, 0.0, 0.0, 0.0];
        let q = QuickLineFitter::new(&x, &y, None).unwrap();
        assert!((q.asymmetry() - 100.0 / 3.0).abs() < 1e-9);
        assert!((q.width() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_data_is_an_error() {
        assert!(QuickLineFitter::new(&[], &[], None).is_err());
    }
}
