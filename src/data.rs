//! Trait implementation to handle the training data.

use std::rc::Rc;

use ndarray::Array1;
use thiserror::Error;

/// Errors raised while validating training data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// `X` and `y` hold a different number of observations.
    #[error("Inputs and outputs differ in length: {inputs} inputs vs {outputs} outputs.")]
    LengthMismatch {
        /// Length of `X`.
        inputs: usize,
        /// Length of `y`.
        outputs: usize,
    },

    /// No observations at all.
    #[error("Training requires at least one observation.")]
    Empty,

    /// An input or output is NaN or infinite.
    #[error("Non-finite value at observation {index}.")]
    NonFinite {
        /// Position of the first offending observation.
        index: usize,
    },
}

/// Interface for interaction with the data a model is trained on.
pub trait RegressionData {
    /// Scalar inputs
    fn X(&self) -> Rc<Array1<f64>>;
    /// Response (target) vector
    fn y(&self) -> Rc<Array1<f64>>;
}

/// Container for one-dimensional regression data.
#[derive(Debug, Clone)]
pub struct Dataset {
    X: Rc<Array1<f64>>,
    y: Rc<Array1<f64>>,
}

impl Dataset {
    /// Creates a new `Dataset`, checking that `X` and `y` are non-empty,
    /// of equal length and finite.
    pub fn new(X: Array1<f64>, y: Array1<f64>) -> Result<Self, DataError> {
        validate(&X, &y)?;

        Ok(Self {
            X: Rc::new(X),
            y: Rc::new(y),
        })
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Always `false` for a validated `Dataset`.
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

impl RegressionData for Dataset {
    fn X(&self) -> Rc<Array1<f64>> {
        Rc::clone(&self.X)
    }

    fn y(&self) -> Rc<Array1<f64>> {
        Rc::clone(&self.y)
    }
}

/// Checks that `X` and `y` are non-empty, of equal length and finite.
///
/// Every source of training data goes through this check before the
/// trainer touches it.
pub fn validate(X: &Array1<f64>, y: &Array1<f64>) -> Result<(), DataError> {
    if X.len() != y.len() {
        return Err(DataError::LengthMismatch {
            inputs: X.len(),
            outputs: y.len(),
        });
    }
    if X.is_empty() {
        return Err(DataError::Empty);
    }
    if let Some(index) = X
        .iter()
        .zip(y.iter())
        .position(|(x, t)| !(x.is_finite() && t.is_finite()))
    {
        return Err(DataError::NonFinite { index });
    }
    Ok(())
}
