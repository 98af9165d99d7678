//! Wavelet denoising with periodic orthonormal transforms.

use std::f64::consts::SQRT_2;

use serde::{Deserialize, Serialize};

use crate::data::model::{is_bad, BAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Wavelet {
    Haar,
    #[default]
    Daubechies4,
}

impl std::fmt::Display for Wavelet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Wavelet::Haar => "Haar",
            Wavelet::Daubechies4 => "Daub4",
        })
    }
}

impl Wavelet {
    fn lowpass(self) -> Vec<f64> {
        match self {
            Wavelet::Haar => vec![1.0 / SQRT_2, 1.0 / SQRT_2],
            Wavelet::Daubechies4 => {
                let s3 = 3.0_f64.sqrt();
                let d = 4.0 * SQRT_2;
                vec![(1.0 + s3) / d, (3.0 + s3) / d, (3.0 - s3) / d, (1.0 - s3) / d]
            }
        }
    }
}

struct Bank {
    h: Vec<f64>,
    g: Vec<f64>,
}

impl Bank {
    fn new(wavelet: Wavelet) -> Bank {
        let h = wavelet.lowpass();
        let l = h.len();
        let g = (0..l)
            .map(|k| if k % 2 == 0 { h[l - 1 - k] } else { -h[l - 1 - k] })
            .collect();
        Bank { h, g }
    }

    fn forward(&self, data: &mut [f64], len: usize, tmp: &mut [f64]) {
        let half = len / 2;
        for i in 0..half {
            let (mut a, mut d) = (0.0, 0.0);
            for (k, (hk, gk)) in self.h.iter().zip(&self.g).enumerate() {
                let v = data[(2 * i + k) % len];
                a += hk * v;
                d += gk * v;
            }
            tmp[i] = a;
            tmp[half + i] = d;
        }
        data[..len].copy_from_slice(&tmp[..len]);
    }

    fn inverse(&self, data: &mut [f64], len: usize, tmp: &mut [f64]) {
        let half = len / 2;
        tmp[..len].iter_mut().for_each(|v| *v = 0.0);
        for i in 0..half {
            let (a, d) = (data[i], data[half + i]);
            for (k, (hk, gk)) in self.h.iter().zip(&self.g).enumerate() {
                tmp[(2 * i + k) % len] += hk * a + gk * d;
            }
        }
        data[..len].copy_from_slice(&tmp[..len]);
    }
}

/// Fill BAD samples by linear interpolation between valid neighbours,
/// copying the nearest valid value at the ends. `None` when nothing is
/// valid.
fn fill_bad(y: &[f64]) -> Option<Vec<f64>> {
    let good: Vec<usize> = (0..y.len()).filter(|&i| !is_bad(y[i])).collect();
    let (&first, &last) = (good.first()?, good.last()?);
    let mut out = y.to_vec();
    for v in &mut out[..first] {
        *v = y[first];
    }
    for v in &mut out[last + 1..] {
        *v = y[last];
    }
    for pair in good.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for i in a + 1..b {
            let f = (i - a) as f64 / (b - a) as f64;
            out[i] = y[a] + f * (y[b] - y[a]);
        }
    }
    Some(out)
}

/// Remove the `percent` smallest detail coefficients of a full wavelet
/// decomposition. BAD samples are interpolated over for the transform and
/// restored afterwards. All-BAD data is returned unchanged.
pub fn denoise(y: &[f64], wavelet: Wavelet, percent: f64) -> Vec<f64> {
    let n = y.len();
    let Some(filled) = fill_bad(y) else {
        return y.to_vec();
    };
    let bank = Bank::new(wavelet);
    let min_len = bank.h.len().max(2);
    if n < min_len {
        return y.to_vec();
    }

    // Pad to a power of two by reflecting the end of the data.
    let m = n.next_power_of_two();
    let mut data = filled;
    for k in 0..m - n {
        let v = data[n - 1 - k.min(n - 1)];
        data.push(v);
    }

    let mut tmp = vec![0.0; m];
    let mut len = m;
    while len >= min_len {
        bank.forward(&mut data, len, &mut tmp);
        len /= 2;
    }
    let approx = len;

    let mut magnitudes: Vec<f64> = data[approx..].iter().map(|c| c.abs()).collect();
    let zap = ((percent / 100.0) * magnitudes.len() as f64).round() as usize;
    if zap > 0 {
        magnitudes.sort_by(f64::total_cmp);
        let threshold = magnitudes[zap.min(magnitudes.len()) - 1];
        let mut left = zap;
        for c in &mut data[approx..] {
            if left > 0 && c.abs() <= threshold {
                *c = 0.0;
                left -= 1;
            }
        }
    }

    let mut len = approx * 2;
    while len <= m {
        bank.inverse(&mut data, len, &mut tmp);
        len *= 2;
    }

    data.truncate(n);
    for (out, orig) in data.iter_mut().zip(y) {
        if is_bad(*orig) {
            *out = BAD;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 * 0.3).sin() * 2.0 + 0.1 * i as f64).collect()
    }

    #[test]
    fn zero_percent_reconstructs_exactly() {
        let y = signal(50);
        for w in [Wavelet::Haar, Wavelet::Daubechies4] {
            let out = denoise(&y, w, 0.0);
            for (a, b) in out.iter().zip(&y) {
                assert!((a - b).abs() < 1e-9, "{w}");
            }
        }
    }

    #[test]
    fn full_haar_threshold_leaves_the_mean() {
        let y = [1.0, 3.0, 5.0, 7.0];
        let out = denoise(&y, Wavelet::Haar, 100.0);
        for v in out {
            assert!((v - 4.0).abs() < 1e-12);
        }
    }

    #[test]
    fn thresholding_removes_noise() {
        let clean: Vec<f64> = (0..64).map(|i| 10.0 * (i as f64 * 0.05).sin()).collect();
        let noisy: Vec<f64> = clean
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.2 * (((i * 7919 + 13) % 17) as f64 / 8.0 - 1.0))
            .collect();
        let out = denoise(&noisy, Wavelet::Daubechies4, 50.0);
        let err = |v: &[f64]| v.iter().zip(&clean).map(|(a, b)| (a - b) * (a - b)).sum::<f64>();
        assert!(err(&out) < err(&noisy));
    }

    #[test]
    fn bad_samples_are_restored() {
        let mut y = signal(20);
        y[3] = BAD;
        y[4] = BAD;
        let out = denoise(&y, Wavelet::Haar, 10.0);
        assert_eq!(out[3], BAD);
        assert_eq!(out[4], BAD);
        assert!(out.iter().enumerate().all(|(i, v)| i == 3 || i == 4 || !is_bad(*v)));
    }

    #[test]
    fn fill_interpolates_gaps() {
        let y = [BAD, 1.0, BAD, BAD, 4.0, BAD];
        assert_eq!(fill_bad(&y).unwrap(), vec![1.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
        assert!(fill_bad(&[BAD]).is_none());
    }
}
