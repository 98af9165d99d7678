use crate::data::model::{is_bad, BAD};

/// Filtered values and, when the input had them, errors.
pub type Filtered = (Vec<f64>, Option<Vec<f64>>);

fn window(i: usize, half: usize, n: usize) -> std::ops::Range<usize> {
    i.saturating_sub(half)..(i + half + 1).min(n)
}

/// Combined error of a mean over samples with the given errors. Samples
/// with a BAD error take no part.
fn mean_error(errors: &[f64], idx: impl Iterator<Item = usize>) -> f64 {
    let (sum, count) = idx
        .map(|j| errors[j])
        .filter(|e| !is_bad(*e))
        .fold((0.0, 0usize), |(s, c), e| (s + e * e, c + 1));
    if count == 0 {
        BAD
    } else {
        sum.sqrt() / count as f64
    }
}

/// Running mean over a centred window of `width` samples (`width` odd).
pub fn average(y: &[f64], errors: Option<&[f64]>, width: usize) -> Filtered {
    let n = y.len();
    let half = width / 2;
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
        let good: Vec<usize> = window(i, half, n).filter(|&j| !is_bad(y[j])).collect();
        out.push(good.iter().map(|&j| y[j]).sum::<f64>() / good.len() as f64);
        if let (Some(oe), Some(e)) = (out_err.as_mut(), errors) {
            oe.push(mean_error(e, good.iter().copied()));
        }
    }
    (out, out_err)
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Running median over a centred window of `width` samples. Errors are
/// passed through unchanged.
pub fn median(y: &[f64], errors: Option<&[f64]>, width: usize) -> Filtered {
    let n = y.len();
    let half = width / 2;
    let mut buf = Vec::with_capacity(width);
    let out = (0..n)
        .map(|i| {
            if is_bad(y[i]) {
                return BAD;
            }
            buf.clear();
            buf.extend(window(i, half, n).map(|j| y[j]).filter(|v| !is_bad(*v)));
            median_of(&mut buf)
        })
        .collect();
    (out, errors.map(<[f64]>::to_vec))
}

/// Median of the valid values, BAD when there are none.
pub fn median_value(values: &[f64]) -> f64 {
    let mut good: Vec<f64> = values.iter().copied().filter(|v| !is_bad(*v)).collect();
    if good.is_empty() {
        BAD
    } else {
        median_of(&mut good)
    }
}

/// Coordinates, values and errors after rebinning.
pub struct Rebinned {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub errors: Option<Vec<f64>>,
}

/// Replace each group of `width` samples by one: mean coordinate, mean of
/// the valid values, combined errors. A group without valid values is BAD.
pub fn rebin(x: &[f64], y: &[f64], errors: Option<&[f64]>, width: usize) -> Rebinned {
    let mut out = Rebinned {
        x: Vec::new(),
        y: Vec::new(),
        errors: errors.map(|_| Vec::new()),
    };
    let n = y.len();
    let mut start = 0;
    while start < n {
        let end = (start + width).min(n);
        let xs: Vec<f64> = x[start..end].iter().copied().filter(|v| !is_bad(*v)).collect();
        out.x.push(if xs.is_empty() {
            BAD
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        });

        let good: Vec<usize> = (start..end).filter(|&j| !is_bad(y[j])).collect();
        if good.is_empty() {
            out.y.push(BAD);
            if let Some(oe) = out.errors.as_mut() {
                oe.push(BAD);
            }
        } else {
            out.y.push(good.iter().map(|&j| y[j]).sum::<f64>() / good.len() as f64);
            if let (Some(oe), Some(e)) = (out.errors.as_mut(), errors) {
                oe.push(mean_error(e, good.iter().copied()));
            }
        }
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_skips_bad_samples() {
        let y = [1.0, 2.0, BAD, 4.0, 5.0];
        let (out, _) = average(&y, None, 3);
        assert_eq!(out[0], 1.5);
        assert_eq!(out[1], 1.5);
        assert_eq!(out[2], BAD);
        assert_eq!(out[3], 4.5);
        assert_eq!(out[4], 4.5);
    }

    #[test]
    fn average_combines_errors() {
        let y = [1.0; 5];
        let e = [2.0; 5];
        let (_, errs) = average(&y, Some(&e), 3);
        let errs = errs.unwrap();
        // sqrt(3 * 4) / 3
        assert!((errs[2] - (12.0_f64).sqrt() / 3.0).abs() < 1e-12);
        // Edge window holds two samples.
        assert!((errs[0] - (8.0_f64).sqrt() / 2.0).abs() < 1e-12);
    }

    #[test]
    fn bad_errors_do_not_dilute_the_mean_error() {
        let y = [1.0; 3];
        let e = [2.0, BAD, 2.0];
        let (_, errs) = average(&y, Some(&e), 3);
        let errs = errs.unwrap();
        assert!((errs[1] - (8.0_f64).sqrt() / 2.0).abs() < 1e-12);

        let r = rebin(&[1.0, 2.0], &[1.0, 1.0], Some(&[BAD, BAD]), 2);
        assert_eq!(r.errors.unwrap(), vec![BAD]);
    }

    #[test]
    fn median_removes_spike() {
        let y = [1.0, 1.0, 100.0, 1.0, 1.0];
        let (out, _) = median(&y, None, 3);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(median_value(&[3.0, BAD, 1.0, 2.0, 10.0]), 2.5);
        assert_eq!(median_value(&[BAD]), BAD);
    }

    #[test]
    fn rebin_groups_samples() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let y = [1.0, 3.0, BAD, BAD, 5.0, 7.0, 9.0];
        let r = rebin(&x, &y, None, 2);
        assert_eq!(r.x, vec![1.5, 3.5, 5.5, 7.0]);
        assert_eq!(r.y, vec![2.0, BAD, 6.0, 9.0]);
        assert!(r.errors.is_none());
    }
}
