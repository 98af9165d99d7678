//! Descriptive statistics and flux integration over spectrum regions.

use std::fmt::Write as _;

use serde::Serialize;

use crate::data::model::{is_bad, SpecData};
use crate::data::ranges::clean_data;
use crate::error::{Result, SplatError};

/// Statistics of a set of BAD-free values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample variance, `n - 1` in the denominator.
    pub variance: f64,
    pub std_dev: f64,
    pub rms: f64,
    pub skewness: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
}

impl Statistics {
    pub fn new(data: &[f64]) -> Result<Self> {
        if data.is_empty() {
            return Err(SplatError::InvalidParameter("no data values for statistics".into()));
        }
        let n = data.len() as f64;
        let sum: f64 = data.iter().sum();
        let mean = sum / n;
        let min = data.iter().copied().fold(f64::MAX, f64::min);
        let max = data.iter().copied().fold(f64::MIN, f64::max);

        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for &v in data {
            let d = v - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        let variance = if data.len() > 1 { m2 / (n - 1.0) } else { 0.0 };
        let (skewness, kurtosis) = if m2 > 0.0 {
            let pop = m2 / n;
            ((m3 / n) / pop.powf(1.5), (m4 / n) / (pop * pop) - 3.0)
        } else {
            (0.0, 0.0)
        };
        let rms = (data.iter().map(|v| v * v).sum::<f64>() / n).sqrt();

        let mut sorted = data.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            0.5 * (sorted[mid - 1] + sorted[mid])
        };

        Ok(Statistics {
            count: data.len(),
            sum,
            min,
            max,
            mean,
            median,
            variance,
            std_dev: variance.sqrt(),
            rms,
            skewness,
            kurtosis,
        })
    }

    /// Text block of the statistics. The full form adds the higher
    /// moments.
    pub fn report(&self, full: bool) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "  Mean: {}", self.mean);
        let _ = writeln!(s, "  Standard deviation: {}", self.std_dev);
        let _ = writeln!(s, "  Minimum: {}", self.min);
        let _ = writeln!(s, "  Maximum: {}", self.max);
        let _ = writeln!(s, "  Number of values: {}", self.count);
        if full {
            let _ = writeln!(s, "  Sum: {}", self.sum);
            let _ = writeln!(s, "  Median: {}", self.median);
            let _ = writeln!(s, "  Variance: {}", self.variance);
            let _ = writeln!(s, "  RMS: {}", self.rms);
            let _ = writeln!(s, "  Skewness: {}", self.skewness);
            let _ = writeln!(s, "  Kurtosis: {}", self.kurtosis);
        }
        s
    }
}

/// Trapezium rule integration of sampled data.
pub struct NumericIntegrator;

impl NumericIntegrator {
    /// Integral of `y(x)`. Samples are put into increasing coordinate order
    /// first, so the result does not depend on the coordinate direction.
    pub fn integral(x: &[f64], y: &[f64]) -> f64 {
        let mut pts: Vec<(f64, f64)> = x
            .iter()
            .zip(y)
            .filter(|(x, y)| !is_bad(**x) && !is_bad(**y))
            .map(|(&x, &y)| (x, y))
            .collect();
        pts.sort_by(|a, b| a.0.total_cmp(&b.0));
        pts.windows(2)
            .map(|w| 0.5 * (w[0].1 + w[1].1) * (w[1].0 - w[0].0))
            .sum()
    }
}

/// Statistics, integrated flux and report for one request.
#[derive(Debug, Clone, Serialize)]
pub struct RegionStats {
    pub stats: Statistics,
    pub integral: f64,
    pub report: String,
}

/// Statistics of `spec` over the given coordinate ranges. The integral is
/// summed range by range so gaps between ranges add nothing.
pub fn region_stats(spec: &SpecData, ranges: &[[f64; 2]], full: bool) -> Result<RegionStats> {
    if ranges.is_empty() {
        return Err(SplatError::NoRanges);
    }
    let pairs = spec.spans(ranges);
    let (_, y, _) = clean_data(spec, &pairs);
    if y.is_empty() {
        return Err(SplatError::NoValidData { line: 0 });
    }
    let stats = Statistics::new(&y)?;
    let integral = pairs
        .iter()
        .map(|&(lo, hi)| {
            NumericIntegrator::integral(&spec.x_data()[lo..=hi], &spec.y_data()[lo..=hi])
        })
        .sum();

    let mut report = format!("Statistics of {} over ranges: \n", spec.short_name);
    for r in ranges {
        let _ = writeln!(report, "  -->{} : {}", r[0], r[1]);
    }
    report.push('\n');
    report.push_str(&stats.report(full));
    let _ = writeln!(report, "  Integrated flux: {integral}");

    log::info!("Statistics of '{}' over {} ranges", spec.short_name, ranges.len());
    Ok(RegionStats {
        stats,
        integral,
        report,
    })
}

/// Statistics of the whole of `spec`.
pub fn whole_stats(spec: &SpecData, full: bool) -> Result<RegionStats> {
    let (x, y, _) = clean_data(spec, &[(0, spec.len() - 1)]);
    if y.is_empty() {
        return Err(SplatError::EmptySpectrum(spec.short_name.clone()));
    }
    let stats = Statistics::new(&y)?;
    let integral = NumericIntegrator::integral(&x, &y);

    let mut report = format!("Statistics of {}:\n", spec.short_name);
    report.push_str(&stats.report(full));
    let _ = writeln!(report, "  Integrated flux: {integral}");

    log::info!("Statistics of the whole of '{}'", spec.short_name);
    Ok(RegionStats {
        stats,
        integral,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::BAD;

    #[test]
    fn basic_moments() {
        let s = Statistics::new(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.count, 8);
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.median, 4.5);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.variance - 32.0 / 7.0).abs() < 1e-12);
        assert!(s.skewness > 0.0);
        assert!(s.report(true).contains("Kurtosis"));
        assert!(!s.report(false).contains("Kurtosis"));
    }

    #[test]
    fn symmetric_data_has_no_skew() {
        let s = Statistics::new(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(s.skewness.abs() < 1e-12);
        assert!((s.rms - 11.0_f64.sqrt()).abs() < 1e-12);
        assert!(Statistics::new(&[]).is_err());
    }

    #[test]
    fn integral_is_direction_independent() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 1.0, 2.0, 3.0];
        assert!((NumericIntegrator::integral(&x, &y) - 4.5).abs() < 1e-12);
        let xr = [3.0, 2.0, 1.0, 0.0];
        let yr = [3.0, 2.0, 1.0, 0.0];
        assert!((NumericIntegrator::integral(&xr, &yr) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn region_stats_skip_bad_and_gaps() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut y = vec![1.0; 10];
        y[1] = BAD;
        let spec = SpecData::new("flat", x, y).unwrap();

        let r = region_stats(&spec, &[[0.0, 3.0], [6.0, 9.0]], false).unwrap();
        assert_eq!(r.stats.count, 7);
        // 0..3 with sample 1 missing still spans 3; 6..9 spans 3.
        assert!((r.integral - 6.0).abs() < 1e-12);
        assert!(r.report.contains("-->6 : 9"));

        let w = whole_stats(&spec, true).unwrap();
        assert_eq!(w.stats.count, 9);
        assert!((w.integral - 9.0).abs() < 1e-12);
        assert!(region_stats(&spec, &[], false).is_err());
    }
}
