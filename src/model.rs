//! Fitted Relevance Vector Machine and its predictive distribution.
//!
//! The predictive distribution at a new input `x` is Gaussian with
//!
//! ```text
//! mean     = mᵗ φ(x)
//! variance = 1/β + φ(x)ᵗ Σ φ(x)
//! ```
//!
//! where φ(x) evaluates the surviving basis functions. Prediction never
//! mutates the model and every query point is independent of the others.

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::basis::BasisSet;
use crate::math::quadratic_form;

/// Errors raised when assembling a model by hand.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Weights, precisions, covariance and basis disagree in size.
    #[error("Inconsistent model dimensions: {basis} basis functions, {mean} weights, {alpha} precisions and a {rows}x{cols} covariance.")]
    DimensionMismatch {
        /// Number of basis functions.
        basis: usize,
        /// Length of the weight mean.
        mean: usize,
        /// Length of the precision vector.
        alpha: usize,
        /// Covariance rows.
        rows: usize,
        /// Covariance columns.
        cols: usize,
    },

    /// β is zero, negative or not finite.
    #[error("Noise precision must be finite and positive, got {0}.")]
    InvalidNoisePrecision(f64),
}

/// Predictive mean and standard deviation at a single input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// ŷ(x)
    pub mean: f64,
    /// σ(x)
    pub stddev: f64,
}

impl Prediction {
    /// `(mean - k * stddev, mean + k * stddev)`
    pub fn interval(&self, k: f64) -> (f64, f64) {
        (self.mean - k * self.stddev, self.mean + k * self.stddev)
    }
}

/// Immutable snapshot of a converged fit.
#[derive(Debug, Clone)]
pub struct RvmModel {
    mean: Array1<f64>,
    covariance: Array2<f64>,
    alpha: Array1<f64>,
    beta: f64,
    basis: BasisSet,
    iterations: usize,
}

impl RvmModel {
    /// Assembles a model from its parts, checking that every part refers to
    /// the same number of basis functions.
    pub fn new(
        mean: Array1<f64>,
        covariance: Array2<f64>,
        alpha: Array1<f64>,
        beta: f64,
        basis: BasisSet,
    ) -> Result<Self, ModelError> {
        let m = basis.len();
        let (rows, cols) = covariance.dim();
        if mean.len() != m || alpha.len() != m || rows != m || cols != m {
            return Err(ModelError::DimensionMismatch {
                basis: m,
                mean: mean.len(),
                alpha: alpha.len(),
                rows,
                cols,
            });
        }
        if !(beta.is_finite() && beta > 0.0) {
            return Err(ModelError::InvalidNoisePrecision(beta));
        }
        Ok(Self::from_parts(mean, covariance, alpha, beta, basis, 0))
    }

    pub(crate) fn from_parts(
        mean: Array1<f64>,
        covariance: Array2<f64>,
        alpha: Array1<f64>,
        beta: f64,
        basis: BasisSet,
        iterations: usize,
    ) -> Self {
        Self {
            mean,
            covariance,
            alpha,
            beta,
            basis,
            iterations,
        }
    }

    /// Posterior mean of the weights.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Posterior covariance of the weights.
    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Weight precisions of the surviving basis functions.
    pub fn alpha(&self) -> &Array1<f64> {
        &self.alpha
    }

    /// Noise precision.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Surviving basis functions, in the order of `mean` and `alpha`.
    pub fn basis(&self) -> &BasisSet {
        &self.basis
    }

    /// Re-estimation iterations it took to converge.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of relevance vectors (surviving basis functions).
    pub fn n_relevant(&self) -> usize {
        self.basis.len()
    }

    /// Positions of the surviving basis functions in the basis set training
    /// started with.
    pub fn relevant_ids(&self) -> &[usize] {
        self.basis.ids()
    }

    /// Irreducible noise level `sqrt(1/β)`.
    pub fn noise_stddev(&self) -> f64 {
        self.beta.recip().sqrt()
    }

    /// Predictive mean and standard deviation at `x`.
    pub fn predict(&self, x: f64) -> Prediction {
        let phi = self.basis.evaluate(x);
        let variance = self.beta.recip() + quadratic_form(&phi, &self.covariance);
        Prediction {
            mean: self.mean.dot(&phi),
            stddev: variance.sqrt(),
        }
    }

    /// ŷ(x) = mᵗ φ(x)
    pub fn predict_mean(&self, x: f64) -> f64 {
        self.mean.dot(&self.basis.evaluate(x))
    }

    /// σ(x) = sqrt(1/β + φ(x)ᵗ Σ φ(x))
    pub fn predict_stddev(&self, x: f64) -> f64 {
        let phi = self.basis.evaluate(x);
        (self.beta.recip() + quadratic_form(&phi, &self.covariance)).sqrt()
    }

    /// Predictive means and standard deviations for every input in `xs`.
    pub fn predict_many(&self, xs: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
        let predictions: Vec<Prediction> = xs.iter().map(|&x| self.predict(x)).collect();
        (
            predictions.iter().map(|p| p.mean).collect(),
            predictions.iter().map(|p| p.stddev).collect(),
        )
    }

    /// Credible band `ŷ(x) ± k σ(x)`; `k = 2` covers roughly 95% of the
    /// Gaussian predictive distribution.
    pub fn credible_interval(&self, x: f64, k: f64) -> (f64, f64) {
        self.predict(x).interval(k)
    }
}

/// Predictive mean of `model` at `x`.
pub fn predict_mean(x: f64, model: &RvmModel) -> f64 {
    model.predict_mean(x)
}

/// Predictive standard deviation of `model` at `x`.
pub fn predict_stddev(x: f64, model: &RvmModel) -> f64 {
    model.predict_stddev(x)
}
