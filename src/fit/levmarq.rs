//! Levenberg–Marquardt non-linear least squares.
//!
//! The model is supplied through [`LevMarqFunc`], which evaluates the model
//! and its partial derivatives with respect to every parameter. Parameters
//! can be held fixed. The damping factor starts at 0.001, shrinks by ten on
//! every accepted step and grows by ten on every rejected one.
//!
//! Termination:
//! - an accepted step that improves χ² by less than the convergence ratio
//!   (`χ²_new / χ²_old > converge`) ends the fit as converged;
//! - `iterations - 1` consecutive rejected steps (at least one) end the fit
//!   as not converged.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SplatError};

/// Upper bound on the number of trial steps, whatever the convergence
/// settings.
const MAX_STEPS: usize = 1000;

/// Model evaluated by the minimiser.
pub trait LevMarqFunc {
    /// Value of the model at `x`. `dyda` has one slot per parameter and
    /// must be filled with the partial derivatives.
    fn eval(&self, x: f64, params: &[f64], dyda: &mut [f64]) -> f64;
}

/// Fill `dyda` by central differences of `f` and return `f(x, params)`.
pub fn numeric_derivatives<F>(f: F, x: f64, params: &[f64], dyda: &mut [f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    let mut p = params.to_vec();
    for (i, slot) in dyda.iter_mut().enumerate() {
        let h = 1e-6 * params[i].abs().max(1e-6);
        p[i] = params[i] + h;
        let up = f(x, &p);
        p[i] = params[i] - h;
        let down = f(x, &p);
        p[i] = params[i];
        *slot = (up - down) / (2.0 * h);
    }
    f(x, params)
}

/// Curvature matrix, gradient vector and χ² at one parameter set.
struct Curvature {
    alpha: DMatrix<f64>,
    beta: DVector<f64>,
    chisq: f64,
}

pub struct LevMarq<'a, F: LevMarqFunc> {
    func: &'a F,
    x: &'a [f64],
    y: &'a [f64],
    sigma: Vec<f64>,
    params: Vec<f64>,
    floating: Vec<bool>,
    converge: f64,
    iterations: usize,
    chisq: f64,
    covar: DMatrix<f64>,
    converged: bool,
    steps: usize,
}

impl<'a, F: LevMarqFunc> LevMarq<'a, F> {
    /// Set up a fit of `y(x)`. `weights` are `1/σ²` per point; without them
    /// all points have unit σ.
    pub fn new(
        func: &'a F,
        x: &'a [f64],
        y: &'a [f64],
        weights: Option<&[f64]>,
        params: Vec<f64>,
    ) -> Result<Self> {
        if x.len() != y.len() {
            return Err(SplatError::LengthMismatch {
                what: "fit data values",
                expected: x.len(),
                got: y.len(),
            });
        }
        let sigma = match weights {
            Some(w) if w.len() != x.len() => {
                return Err(SplatError::LengthMismatch {
                    what: "fit weights",
                    expected: x.len(),
                    got: w.len(),
                })
            }
            Some(w) => w.iter().map(|&w| 1.0 / w.sqrt()).collect(),
            None => vec![1.0; x.len()],
        };
        let n = params.len();
        Ok(LevMarq {
            func,
            x,
            y,
            sigma,
            floating: vec![true; n],
            params,
            converge: 0.999,
            iterations: 20,
            chisq: 0.0,
            covar: DMatrix::zeros(n, n),
            converged: false,
            steps: 0,
        })
    }

    /// Set a parameter value and whether it is held fixed.
    pub fn set_param(&mut self, index: usize, value: f64, fixed: bool) {
        if index < self.params.len() {
            self.params[index] = value;
            self.floating[index] = !fixed;
        }
    }

    pub fn set_converge(&mut self, converge: f64) {
        self.converge = converge;
    }

    /// One more than the number of consecutive rejected steps that stops
    /// the fit.
    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations.max(1);
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn param(&self, index: usize) -> f64 {
        self.params.get(index).copied().unwrap_or(0.0)
    }

    /// Trial steps taken by the last fit.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn chisq(&self) -> f64 {
        self.chisq
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn num_floating(&self) -> usize {
        self.floating.iter().filter(|f| **f).count()
    }

    pub fn covariance(&self, i: usize, j: usize) -> f64 {
        if i < self.params.len() && j < self.params.len() {
            self.covar[(i, j)]
        } else {
            0.0
        }
    }

    /// Standard error of a parameter. With `rebase` the error is scaled so
    /// that the final χ² counts as a good fit, a usable estimate when unit
    /// σ were assumed.
    pub fn error(&self, index: usize, rebase: bool) -> f64 {
        let var = self.covariance(index, index);
        if var <= 0.0 {
            return 0.0;
        }
        let mut err = var.sqrt();
        if rebase {
            let nfree = self.x.len() as f64 - self.params.len() as f64;
            if nfree > 0.0 {
                err *= (self.chisq / nfree).sqrt();
            }
        }
        err
    }

    /// Model values at the data coordinates for the current parameters.
    pub fn fit_values(&self) -> Vec<f64> {
        let mut dyda = vec![0.0; self.params.len()];
        self.x
            .iter()
            .map(|&x| self.func.eval(x, &self.params, &mut dyda))
            .collect()
    }

    fn floating_indices(&self) -> Vec<usize> {
        (0..self.params.len()).filter(|&i| self.floating[i]).collect()
    }

    fn curvature(&self, params: &[f64], idx: &[usize]) -> Curvature {
        let mfit = idx.len();
        let mut alpha = DMatrix::zeros(mfit, mfit);
        let mut beta = DVector::zeros(mfit);
        let mut chisq = 0.0;
        let mut dyda = vec![0.0; params.len()];

        for i in 0..self.x.len() {
            let fit = self.func.eval(self.x[i], params, &mut dyda);
            let sig2i = 1.0 / (self.sigma[i] * self.sigma[i]);
            let dy = self.y[i] - fit;
            for (j, &l) in idx.iter().enumerate() {
                let wt = dyda[l] * sig2i;
                for (k, &m) in idx[..=j].iter().enumerate() {
                    alpha[(j, k)] += wt * dyda[m];
                }
                beta[j] += dy * wt;
            }
            chisq += dy * dy * sig2i;
        }
        for j in 1..mfit {
            for k in 0..j {
                alpha[(k, j)] = alpha[(j, k)];
            }
        }
        if !chisq.is_finite() {
            chisq = f64::INFINITY;
        }
        Curvature { alpha, beta, chisq }
    }

    /// Minimise χ² starting from the current parameters.
    pub fn fit(&mut self) -> Result<()> {
        let idx = self.floating_indices();
        let mut current = self.curvature(&self.params, &idx);
        self.chisq = current.chisq;
        if idx.is_empty() {
            self.converged = true;
            return Ok(());
        }
        if self.x.len() < idx.len() {
            return Err(SplatError::InvalidParameter(format!(
                "{} data points cannot constrain {} parameters",
                self.x.len(),
                idx.len()
            )));
        }
        if !current.chisq.is_finite() {
            return Err(SplatError::InvalidParameter(
                "model cannot be evaluated at the initial parameters".into(),
            ));
        }

        let mut lambda = 0.001;
        let mut rejected = 0;
        self.converged = false;
        self.steps = 0;

        for step in 0..MAX_STEPS {
            self.steps = step + 1;
            let mut a = current.alpha.clone();
            for j in 0..idx.len() {
                a[(j, j)] *= 1.0 + lambda;
            }
            let da = a.lu().solve(&current.beta).ok_or(SplatError::SingularMatrix)?;

            let mut trial = self.params.clone();
            for (j, &l) in idx.iter().enumerate() {
                trial[l] += da[j];
            }
            let next = self.curvature(&trial, &idx);

            if next.chisq < current.chisq {
                lambda *= 0.1;
                let ratio = next.chisq / current.chisq;
                self.params = trial;
                current = next;
                rejected = 0;
                log::debug!("levmarq step {step}: chisq {:.6e} ratio {ratio:.6}", current.chisq);
                if current.chisq == 0.0 || ratio > self.converge {
                    self.converged = true;
                    break;
                }
            } else {
                lambda *= 10.0;
                rejected += 1;
                if rejected + 1 >= self.iterations {
                    break;
                }
            }
        }
        self.chisq = current.chisq;

        // Covariance of the floating parameters, fixed ones stay zero.
        self.covar = DMatrix::zeros(self.params.len(), self.params.len());
        match current.alpha.try_inverse() {
            Some(inv) => {
                for (j, &l) in idx.iter().enumerate() {
                    for (k, &m) in idx.iter().enumerate() {
                        self.covar[(l, m)] = inv[(j, k)];
                    }
                }
            }
            None => log::warn!("levmarq: curvature matrix is singular, errors unavailable"),
        }

        if !self.converged {
            log::warn!("levmarq: fit did not converge (chisq {:.6e})", self.chisq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a + b x
    struct Line;

    impl LevMarqFunc for Line {
        fn eval(&self, x: f64, p: &[f64], dyda: &mut [f64]) -> f64 {
            dyda[0] = 1.0;
            dyda[1] = x;
            p[0] + p[1] * x
        }
    }

    /// y = a exp(-b x)
    struct Decay;

    impl LevMarqFunc for Decay {
        fn eval(&self, x: f64, p: &[f64], dyda: &mut [f64]) -> f64 {
            numeric_derivatives(|x, p| p[0] * (-p[1] * x).exp(), x, p, dyda)
        }
    }

    #[test]
    fn fits_straight_line_exactly() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 + 0.5 * x).collect();
        let mut lm = LevMarq::new(&Line, &x, &y, None, vec![0.0, 0.0]).unwrap();
        lm.fit().unwrap();
        assert!((lm.param(0) - 3.0).abs() < 1e-6);
        assert!((lm.param(1) - 0.5).abs() < 1e-6);
        assert!(lm.chisq() < 1e-10);
    }

    #[test]
    fn gives_up_after_consecutive_rejections() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 + 0.5 * x).collect();
        // Already exact, so no step can lower chi square.
        let mut lm = LevMarq::new(&Line, &x, &y, None, vec![3.0, 0.5]).unwrap();
        lm.set_iterations(5);
        lm.fit().unwrap();
        assert!(!lm.is_converged());
        assert_eq!(lm.steps(), 4);
        assert_eq!(lm.params(), &[3.0, 0.5][..]);
        assert_eq!(lm.chisq(), 0.0);
    }

    #[test]
    fn fixed_parameter_does_not_move() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 1.0 + 2.0 * x).collect();
        let mut lm = LevMarq::new(&Line, &x, &y, None, vec![0.0, 0.0]).unwrap();
        lm.set_param(1, 2.0, true);
        lm.fit().unwrap();
        assert_eq!(lm.param(1), 2.0);
        assert!((lm.param(0) - 1.0).abs() < 1e-6);
        assert_eq!(lm.covariance(1, 1), 0.0);
        assert_eq!(lm.num_floating(), 1);
    }

    #[test]
    fn nonlinear_decay_with_numeric_derivatives() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, x)| 5.0 * (-0.7 * x).exp() + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let mut lm = LevMarq::new(&Decay, &x, &y, None, vec![3.0, 0.3]).unwrap();
        lm.fit().unwrap();
        assert!((lm.param(0) - 5.0).abs() < 0.05);
        assert!((lm.param(1) - 0.7).abs() < 0.02);
        assert!(lm.error(0, true) > 0.0);
    }

    #[test]
    fn rejects_mismatched_weights() {
        let x = [1.0, 2.0];
        let y = [1.0, 2.0];
        let w = [1.0];
        assert!(LevMarq::new(&Line, &x, &y, Some(&w), vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn too_few_points_is_an_error() {
        let x = [1.0];
        let y = [1.0];
        let mut lm = LevMarq::new(&Line, &x, &y, None, vec![0.0, 0.0]).unwrap();
        assert!(lm.fit().is_err());
    }
}
