//! Basis function definitions and the design matrix evaluator for the
//! Relevance Vector Machine.
//!
//! Includes:
//! - `BasisFunction`: Trait defining the interface for scalar basis functions.
//! - `Constant`: Bias term, always evaluates to one.
//! - `Monomial`: Power of the input, `x^degree`.
//! - `GaussianKernel`: Radial basis function centered on a (training) point.
//! - `CustomBasis`: Wraps a caller supplied closure.
//! - `Basis`: Enum encapsulating the different basis function types.
//! - `BasisSet`: Ordered collection of basis functions that remembers the
//!   original position of every entry across pruning.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use thiserror::Error;

/// Errors raised while constructing basis functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BasisError {
    /// The string does not name a known basis function.
    #[error("Unknown basis function: {0}")]
    UnknownBasis(String),

    /// A parameter is missing, malformed or out of range.
    #[error("Invalid value {value} for basis parameter '{name}'")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value as given.
        value: String,
    },
}

/// Basis function interface. A basis function maps a scalar input to a
/// single feature of the linear model.
pub trait BasisFunction {
    /// Evaluates the basis function at `x`.
    fn evaluate(&self, x: f64) -> f64;
    /// Human readable name used in logs and model summaries.
    fn name(&self) -> String;
}

/// Bias term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant;

impl BasisFunction for Constant {
    fn evaluate(&self, _x: f64) -> f64 {
        1.0
    }

    fn name(&self) -> String {
        "constant".to_string()
    }
}

/// `x^degree`. Degree zero is equivalent to `Constant`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Monomial {
    /// Power the input is raised to.
    pub degree: i32,
}

impl BasisFunction for Monomial {
    fn evaluate(&self, x: f64) -> f64 {
        x.powi(self.degree)
    }

    fn name(&self) -> String {
        match self.degree {
            0 => "constant".to_string(),
            1 => "x".to_string(),
            d => format!("x^{d}"),
        }
    }
}

/// Gaussian radial basis function `exp(-(x - center)^2 / (2 width^2))`.
///
/// Placing one kernel on every training input gives the classic kernel
/// formulation, where the surviving kernels are the relevance vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    /// Location of the kernel.
    pub center: f64,
    /// Length scale, strictly positive.
    pub width: f64,
}

impl GaussianKernel {
    /// Creates a new kernel, rejecting non-positive or non-finite widths.
    pub fn new(center: f64, width: f64) -> Result<Self, BasisError> {
        if !center.is_finite() {
            return Err(BasisError::InvalidParameter {
                name: "center",
                value: center.to_string(),
            });
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(BasisError::InvalidParameter {
                name: "width",
                value: width.to_string(),
            });
        }
        Ok(Self { center, width })
    }
}

impl BasisFunction for GaussianKernel {
    fn evaluate(&self, x: f64) -> f64 {
        let d = x - self.center;
        (-(d * d) / (2.0 * self.width * self.width)).exp()
    }

    fn name(&self) -> String {
        format!("gaussian(c={}, w={})", self.center, self.width)
    }
}

/// Caller supplied basis function.
#[derive(Clone)]
pub struct CustomBasis {
    name: String,
    func: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl CustomBasis {
    /// Wraps `func` under the display name `name`.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for CustomBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomBasis")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BasisFunction for CustomBasis {
    fn evaluate(&self, x: f64) -> f64 {
        (self.func)(x)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

// Unit and plain structs carry the behaviour, the enum lets a single
// `BasisSet` hold a mix of them.

/// Holds the basis function strategies as enum variants.
#[derive(Debug, Clone)]
pub enum Basis {
    /// Implements the `Constant` strategy.
    Constant(Constant),
    /// Implements the `Monomial` strategy.
    Monomial(Monomial),
    /// Implements the `GaussianKernel` strategy.
    Gaussian(GaussianKernel),
    /// Implements the `CustomBasis` strategy.
    Custom(CustomBasis),
}

impl Basis {
    /// `x^degree`
    pub fn power(degree: i32) -> Self {
        Basis::Monomial(Monomial { degree })
    }

    /// Wraps a closure as a basis function.
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Basis::Custom(CustomBasis::new(name, func))
    }
}

impl BasisFunction for Basis {
    /// Calls the corresponding `evaluate` for each `Basis` variant
    fn evaluate(&self, x: f64) -> f64 {
        match self {
            Basis::Constant(b) => b.evaluate(x),
            Basis::Monomial(b) => b.evaluate(x),
            Basis::Gaussian(b) => b.evaluate(x),
            Basis::Custom(b) => b.evaluate(x),
        }
    }

    fn name(&self) -> String {
        match self {
            Basis::Constant(b) => b.name(),
            Basis::Monomial(b) => b.name(),
            Basis::Gaussian(b) => b.name(),
            Basis::Custom(b) => b.name(),
        }
    }
}

fn parse_param<T: FromStr>(name: &'static str, raw: &str) -> Result<T, BasisError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| BasisError::InvalidParameter {
            name,
            value: raw.to_string(),
        })
}

impl FromStr for Basis {
    type Err = BasisError;

    /// Parses `constant`, `identity` (or `linear`), `square`, `cube`,
    /// `power:<k>` and `gaussian:<center>:<width>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let mut parts = lowered.split(':');
        let kind = parts.next().unwrap_or_default();
        let params: Vec<&str> = parts.collect();

        match (kind, params.as_slice()) {
            ("constant", []) => Ok(Basis::Constant(Constant)),
            ("identity" | "linear", []) => Ok(Basis::power(1)),
            ("square", []) => Ok(Basis::power(2)),
            ("cube", []) => Ok(Basis::power(3)),
            ("power", [degree]) => Ok(Basis::power(parse_param("degree", degree)?)),
            ("gaussian", [center, width]) => Ok(Basis::Gaussian(GaussianKernel::new(
                parse_param("center", center)?,
                parse_param("width", width)?,
            )?)),
            _ => Err(BasisError::UnknownBasis(s.to_string())),
        }
    }
}

/// Ordered collection of basis functions.
///
/// The set only ever shrinks: `retain` builds a new set from a subset of the
/// current entries, keeping their relative order and their original
/// positions (`ids`), so a surviving basis function can always be traced
/// back to the set training started with.
#[derive(Debug, Clone)]
pub struct BasisSet {
    functions: Vec<Basis>,
    ids: Vec<usize>,
}

impl BasisSet {
    /// Creates a new `BasisSet`; entry `i` gets id `i`.
    pub fn new(functions: Vec<Basis>) -> Self {
        let ids = (0..functions.len()).collect();
        Self { functions, ids }
    }

    /// `{1, x, ..., x^degree}`
    pub fn polynomial(degree: i32) -> Self {
        Self::new((0..=degree).map(Basis::power).collect())
    }

    /// One Gaussian kernel per center, optionally preceded by a bias term.
    pub fn gaussian_kernels(centers: &[f64], width: f64, bias: bool) -> Result<Self, BasisError> {
        let mut functions = Vec::with_capacity(centers.len() + usize::from(bias));
        if bias {
            functions.push(Basis::Constant(Constant));
        }
        for &center in centers {
            functions.push(Basis::Gaussian(GaussianKernel::new(center, width)?));
        }
        Ok(Self::new(functions))
    }

    /// Parses every spec with `Basis::from_str`.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, BasisError> {
        let functions = specs
            .iter()
            .map(|spec| spec.as_ref().parse::<Basis>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(functions))
    }

    /// Number of basis functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// `true` when no basis function is left.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Basis functions in order.
    pub fn functions(&self) -> &[Basis] {
        &self.functions
    }

    /// Original positions of the entries.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Display names, see `BasisFunction::name`.
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name()).collect()
    }

    /// Returns a new set made of the entries at `keep` (positions within
    /// this set, in increasing order).
    ///
    /// # Panics
    ///
    /// Panics if any position in `keep` is not smaller than `self.len()`.
    pub fn retain(&self, keep: &[usize]) -> Self {
        Self {
            functions: keep.iter().map(|&i| self.functions[i].clone()).collect(),
            ids: keep.iter().map(|&i| self.ids[i]).collect(),
        }
    }

    /// φ(x): every basis function evaluated at `x`.
    pub fn evaluate(&self, x: f64) -> Array1<f64> {
        self.functions.iter().map(|f| f.evaluate(x)).collect()
    }
}

impl From<Vec<Basis>> for BasisSet {
    fn from(functions: Vec<Basis>) -> Self {
        Self::new(functions)
    }
}

/// Builds the N×M design matrix Φ with `Φ[n, j] = φ_j(x_n)`.
///
/// The result is always two dimensional, a single basis function gives an
/// N×1 matrix.
pub fn compute_design_matrix(inputs: ArrayView1<f64>, basis: &BasisSet) -> Array2<f64> {
    let functions = basis.functions();
    Array2::from_shape_fn((inputs.len(), functions.len()), |(n, j)| {
        functions[j].evaluate(inputs[n])
    })
}
