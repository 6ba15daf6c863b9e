//! Functions that implement the Relevance Vector Machine initialization and
//! evidence-maximization update step.
//!
//! Training operates on an `RvmState`: every call to `step` recomputes the
//! relevance factors, re-estimates the weight precisions α and the noise
//! precision β, prunes the basis functions whose precision crossed the
//! threshold and recomputes the weight posterior. `run` repeats the step
//! until the precisions stop moving, the basis set collapses or the
//! iteration budget is exhausted.

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use thiserror::Error;

use crate::basis::{compute_design_matrix, BasisSet};
use crate::data::{validate, DataError, Dataset, RegressionData};
use crate::math::{invert_spd, select, sum_abs_diff, LinalgError};
use crate::model::RvmModel;

/// Errors that abort a fit. None of them is recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// The posterior precision matrix could not be inverted.
    #[error("Posterior covariance could not be computed: {0}")]
    SingularMatrix(#[from] LinalgError),

    /// Pruning removed every basis function.
    #[error("Model collapsed at iteration {iteration}: no relevant basis functions remain.")]
    EmptyBasisSet {
        /// Iteration at which the set emptied.
        iteration: usize,
    },

    /// `max_iterations` re-estimations ran without converging.
    #[error(
        "Training did not converge within {max_iterations} iterations. Last sum of absolute alpha changes was {last_change:.6e}."
    )]
    NonConvergence {
        /// Iteration budget that was exhausted.
        max_iterations: usize,
        /// Precision change of the final iteration.
        last_change: f64,
    },

    /// Re-estimated β is zero, negative or not finite.
    #[error("Re-estimated noise precision {value} at iteration {iteration} is not finite and positive.")]
    InvalidNoisePrecision {
        /// Iteration that produced the value.
        iteration: usize,
        /// Offending β.
        value: f64,
    },

    /// The initial basis set is empty.
    #[error("Training requires at least one basis function.")]
    NoBasisFunctions,

    /// Settings or initial hyperparameters are unusable.
    #[error("Invalid training settings: {0}")]
    InvalidSettings(String),

    /// Training data failed validation.
    #[error("Training data is invalid: {0}")]
    Data(#[from] DataError),

    /// A model was requested before training converged.
    #[error("No fitted model available, training is in phase {0:?}.")]
    NotConverged(TrainingPhase),
}

/// RvmSettings are the parameters used to initialize a new `RvmState`.
#[derive(Debug, Clone, PartialEq)]
pub struct RvmSettings {
    /// Basis functions whose re-estimated precision is at or above this
    /// value are pruned.
    pub alpha_threshold: f64,
    /// Training stops once the sum of absolute precision changes between
    /// two iterations drops below this value.
    pub epsilon: f64,
    /// Upper bound on the number of re-estimation iterations.
    pub max_iterations: usize,
    /// Half-open range `[low, high)` the initial α and β are drawn from.
    pub init_range: (f64, f64),
}

impl Default for RvmSettings {
    fn default() -> Self {
        Self {
            alpha_threshold: 1000.0,
            epsilon: 0.1,
            max_iterations: 10_000,
            init_range: (0.1, 0.2),
        }
    }
}

impl RvmSettings {
    /// Creates a new `RvmSettings` with the default initialization range.
    pub fn new(alpha_threshold: f64, epsilon: f64, max_iterations: usize) -> Self {
        Self {
            alpha_threshold,
            epsilon,
            max_iterations,
            ..Self::default()
        }
    }

    /// Sets `alpha_threshold`.
    pub fn with_alpha_threshold(mut self, alpha_threshold: f64) -> Self {
        self.alpha_threshold = alpha_threshold;
        self
    }

    /// Sets `epsilon`.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets `max_iterations`.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the `[low, high)` range of the initial draws.
    pub fn with_init_range(mut self, low: f64, high: f64) -> Self {
        self.init_range = (low, high);
        self
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if !(self.alpha_threshold.is_finite() && self.alpha_threshold > 0.0) {
            return Err(TrainingError::InvalidSettings(format!(
                "alpha_threshold must be finite and positive, got {}",
                self.alpha_threshold
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(TrainingError::InvalidSettings(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(TrainingError::InvalidSettings(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let (low, high) = self.init_range;
        if !(low > 0.0 && high.is_finite() && low < high) {
            return Err(TrainingError::InvalidSettings(format!(
                "init_range must satisfy 0 < low < high, got [{low}, {high})"
            )));
        }
        Ok(())
    }
}

/// Lifecycle of an `RvmState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    /// Hyperparameters are drawn, the initial posterior is not computed yet.
    Initializing,
    /// Re-estimation in progress.
    Iterating,
    /// Precisions changed by less than `epsilon` in the last iteration.
    Converged,
    /// Every basis function was pruned.
    Collapsed,
    /// A singular matrix, an invalid noise precision or an exhausted
    /// iteration budget ended training.
    Failed,
}

impl TrainingPhase {
    /// `true` once `step` has nothing left to do.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrainingPhase::Converged | TrainingPhase::Collapsed | TrainingPhase::Failed
        )
    }
}

/// The surviving basis functions together with their precisions and design
/// matrix columns. Always rebuilt as a whole so the three stay index-aligned.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    basis: BasisSet,
    alpha: Array1<f64>,
    design: Array2<f64>,
}

impl ActiveSet {
    fn new(basis: BasisSet, alpha: Array1<f64>, X: &Array1<f64>) -> Self {
        debug_assert_eq!(basis.len(), alpha.len());
        let design = compute_design_matrix(X.view(), &basis);
        Self {
            basis,
            alpha,
            design,
        }
    }

    /// Same basis functions, new precisions.
    fn with_alpha(&self, alpha: Array1<f64>) -> Self {
        debug_assert_eq!(self.alpha.len(), alpha.len());
        Self {
            basis: self.basis.clone(),
            alpha,
            design: self.design.clone(),
        }
    }

    /// Number of surviving basis functions.
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    /// `true` when every basis function was pruned.
    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    /// Surviving basis functions.
    pub fn basis(&self) -> &BasisSet {
        &self.basis
    }

    /// Current precision of every surviving basis function.
    pub fn alpha(&self) -> &Array1<f64> {
        &self.alpha
    }

    /// Φ for the current basis set.
    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }
}

/// Gaussian posterior over the weights of the surviving basis functions.
#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    /// Posterior mean m.
    pub mean: Array1<f64>,
    /// Posterior covariance Σ.
    pub covariance: Array2<f64>,
}

impl Posterior {
    /// Σ = (diag(α) + β ΦᵗΦ)⁻¹ and m = β Σ Φᵗ y.
    pub fn compute(
        design: &Array2<f64>,
        alpha: &Array1<f64>,
        beta: f64,
        y: &Array1<f64>,
    ) -> Result<Self, LinalgError> {
        let mut precision = design.t().dot(design) * beta;
        precision
            .diag_mut()
            .zip_mut_with(alpha, |p, &a| *p += a);

        let covariance = invert_spd(&precision)?;
        let mean = covariance.dot(&design.t().dot(y)) * beta;

        Ok(Self { mean, covariance })
    }
}

/// Diagnostics recorded after every re-estimation iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Basis set size after pruning.
    pub n_basis: usize,
    /// Basis functions removed in this iteration.
    pub n_pruned: usize,
    /// Sum of absolute precision changes over the surviving basis functions.
    pub alpha_change: f64,
    /// Re-estimated noise precision.
    pub beta: f64,
}

/// RvmState is the main entry point of the evidence-maximization loop.
pub struct RvmState {
    /// Training data.
    pub data: Box<dyn RegressionData>,
    /// Parameters used to initialize the `RvmState`.
    pub params: RvmSettings,
    active: ActiveSet,
    beta: f64,
    posterior: Option<Posterior>,
    phase: TrainingPhase,
    iter: usize,
    last_change: f64,
    history: Vec<IterationRecord>,
}

impl RvmState {
    /// Creates an `RvmState` whose initial precisions α₀ (one per basis
    /// function) and noise precision β₀ are drawn uniformly from
    /// `params.init_range` using `rng`.
    pub fn new<R: Rng + ?Sized>(
        params: RvmSettings,
        data: Box<dyn RegressionData>,
        basis: BasisSet,
        rng: &mut R,
    ) -> Result<Self, TrainingError> {
        params.validate()?;
        let (low, high) = params.init_range;
        let uniform = Uniform::new(low, high);

        let alpha: Array1<f64> = (0..basis.len()).map(|_| uniform.sample(rng)).collect();
        let beta = uniform.sample(rng);

        Self::with_hyperparameters(params, data, basis, alpha, beta)
    }

    /// Creates an `RvmState` from explicit initial hyperparameters.
    pub fn with_hyperparameters(
        params: RvmSettings,
        data: Box<dyn RegressionData>,
        basis: BasisSet,
        alpha: Array1<f64>,
        beta: f64,
    ) -> Result<Self, TrainingError> {
        params.validate()?;
        if basis.is_empty() {
            return Err(TrainingError::NoBasisFunctions);
        }
        if alpha.len() != basis.len() {
            return Err(TrainingError::InvalidSettings(format!(
                "{} initial precisions for {} basis functions",
                alpha.len(),
                basis.len()
            )));
        }
        if alpha.iter().any(|a| !(a.is_finite() && *a > 0.0)) || !(beta.is_finite() && beta > 0.0) {
            return Err(TrainingError::InvalidSettings(
                "initial precisions must be finite and strictly positive".to_string(),
            ));
        }

        let X = data.X();
        let y = data.y();
        validate(&X, &y)?;

        let active = ActiveSet::new(basis, alpha, &X);

        Ok(Self {
            data,
            params,
            active,
            beta,
            posterior: None,
            phase: TrainingPhase::Initializing,
            iter: 0,
            last_change: f64::INFINITY,
            history: Vec::new(),
        })
    }

    /// Advances the state machine by one transition and returns the new
    /// phase. A terminal phase is returned unchanged.
    pub fn step(&mut self) -> Result<TrainingPhase, TrainingError> {
        let result = match self.phase {
            TrainingPhase::Initializing => self.initialize(),
            TrainingPhase::Iterating => self.iterate(),
            terminal => return Ok(terminal),
        };

        match result {
            Ok(phase) => {
                self.phase = phase;
                Ok(phase)
            }
            Err(err) => {
                self.phase = match err {
                    TrainingError::EmptyBasisSet { .. } => TrainingPhase::Collapsed,
                    _ => TrainingPhase::Failed,
                };
                Err(err)
            }
        }
    }

    /// Steps until training converges. Fails once `max_iterations`
    /// re-estimation iterations have run without converging.
    pub fn run(&mut self) -> Result<(), TrainingError> {
        loop {
            match self.phase {
                TrainingPhase::Converged => return Ok(()),
                TrainingPhase::Collapsed | TrainingPhase::Failed => {
                    return Err(TrainingError::NotConverged(self.phase))
                }
                TrainingPhase::Iterating if self.iter >= self.params.max_iterations => {
                    warn!(
                        "RVM failed to converge after {} iterations (last alpha change {:.6e})",
                        self.iter, self.last_change
                    );
                    self.phase = TrainingPhase::Failed;
                    return Err(TrainingError::NonConvergence {
                        max_iterations: self.params.max_iterations,
                        last_change: self.last_change,
                    });
                }
                _ => {
                    self.step()?;
                }
            }
        }
    }

    /// Runs training to convergence and returns the fitted model.
    pub fn fit(mut self) -> Result<RvmModel, TrainingError> {
        self.run()?;
        self.into_model()
    }

    /// Snapshot of a converged fit.
    pub fn into_model(self) -> Result<RvmModel, TrainingError> {
        match (self.phase, self.posterior) {
            (TrainingPhase::Converged, Some(posterior)) => Ok(RvmModel::from_parts(
                posterior.mean,
                posterior.covariance,
                self.active.alpha,
                self.beta,
                self.active.basis,
                self.iter,
            )),
            (phase, _) => Err(TrainingError::NotConverged(phase)),
        }
    }

    fn initialize(&mut self) -> Result<TrainingPhase, TrainingError> {
        let y = self.data.y();
        info!(
            "Initializing RVM with {} observations and {} basis functions",
            y.len(),
            self.active.len()
        );
        let posterior = Posterior::compute(&self.active.design, &self.active.alpha, self.beta, &y)?;
        self.posterior = Some(posterior);

        Ok(TrainingPhase::Iterating)
    }

    fn iterate(&mut self) -> Result<TrainingPhase, TrainingError> {
        let posterior = match &self.posterior {
            Some(posterior) => posterior,
            None => return self.initialize(),
        };
        let X = self.data.X();
        let y = self.data.y();
        let iteration = self.iter + 1;
        let active = &self.active;

        // Relevance factors use the previous α and the current Σ.
        let gamma = 1.0 - &active.alpha * &posterior.covariance.diag();
        let alpha_new = &gamma / &posterior.mean.mapv(|m| m * m);

        let residual = &*y - &active.design.dot(&posterior.mean);
        let beta_new = (y.len() as f64 - gamma.sum()) / residual.dot(&residual);
        if !(beta_new.is_finite() && beta_new > 0.0) {
            warn!("Invalid noise precision {beta_new} at iteration {iteration}");
            return Err(TrainingError::InvalidNoisePrecision {
                iteration,
                value: beta_new,
            });
        }

        // NaN precisions fail the comparison and are pruned as well.
        let threshold = self.params.alpha_threshold;
        let keep: Vec<usize> = alpha_new
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a < threshold)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            warn!("All basis functions pruned at iteration {iteration}, model collapsed");
            return Err(TrainingError::EmptyBasisSet { iteration });
        }

        let n_pruned = active.len() - keep.len();
        let (previous_alpha, next) = if n_pruned > 0 {
            let basis = active.basis.retain(&keep);
            info!(
                "Iteration {iteration}: pruned {n_pruned} basis functions, {} remain: {:?}",
                basis.len(),
                basis.names()
            );
            (
                select(&active.alpha, &keep),
                ActiveSet::new(basis, select(&alpha_new, &keep), &X),
            )
        } else {
            (active.alpha.clone(), active.with_alpha(alpha_new))
        };

        let posterior = Posterior::compute(&next.design, &next.alpha, beta_new, &y)?;
        let alpha_change = sum_abs_diff(&previous_alpha, &next.alpha);

        debug!(
            "Iteration {iteration}: M = {}, sum |delta alpha| = {alpha_change:.6e}, beta = {beta_new:.6e}",
            next.len()
        );

        self.history.push(IterationRecord {
            iteration,
            n_basis: next.len(),
            n_pruned,
            alpha_change,
            beta: beta_new,
        });
        self.active = next;
        self.beta = beta_new;
        self.posterior = Some(posterior);
        self.iter = iteration;
        self.last_change = alpha_change;

        if alpha_change < self.params.epsilon {
            info!(
                "RVM converged after {iteration} iterations with {} relevant basis functions",
                self.active.len()
            );
            Ok(TrainingPhase::Converged)
        } else {
            Ok(TrainingPhase::Iterating)
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    /// Number of completed re-estimation iterations.
    pub fn iteration(&self) -> usize {
        self.iter
    }

    /// Surviving basis functions with their precisions.
    pub fn active_set(&self) -> &ActiveSet {
        &self.active
    }

    /// Current noise precision.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// `None` until the first `step`.
    pub fn posterior(&self) -> Option<&Posterior> {
        self.posterior.as_ref()
    }

    /// Sum of absolute precision changes in the last iteration.
    pub fn last_change(&self) -> f64 {
        self.last_change
    }

    /// One record per completed iteration.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }
}

/// Fits an RVM to `(X, y)` starting from `basis`, drawing the initial
/// hyperparameters from `rng`.
pub fn train<R: Rng + ?Sized>(
    X: &Array1<f64>,
    y: &Array1<f64>,
    basis: BasisSet,
    params: RvmSettings,
    rng: &mut R,
) -> Result<RvmModel, TrainingError> {
    let data = Dataset::new(X.to_owned(), y.to_owned())?;
    RvmState::new(params, Box::new(data), basis, rng)?.fit()
}

/// `train` with a `StdRng` seeded from `seed`.
pub fn train_seeded(
    X: &Array1<f64>,
    y: &Array1<f64>,
    basis: BasisSet,
    params: RvmSettings,
    seed: u64,
) -> Result<RvmModel, TrainingError> {
    let mut rng = StdRng::seed_from_u64(seed);
    train(X, y, basis, params, &mut rng)
}
