#![allow(non_snake_case)]

use std::rc::Rc;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use sparse_rvm::basis::{Basis, BasisSet};
use sparse_rvm::data::{DataError, Dataset, RegressionData};
use sparse_rvm::math::max_asymmetry;
use sparse_rvm::rvm::{train, train_seeded, RvmSettings, RvmState, TrainingError, TrainingPhase};

fn demo_data() -> (Array1<f64>, Array1<f64>) {
    (
        array![1.0, 3.0, 5.0, 6.0, 7.0, 8.0, 8.5, 9.0],
        array![3.0, -2.0, 3.0, 8.0, 20.0, 12.0, 7.0, 10.0],
    )
}

/// y = 2x + 1 plus a small deterministic perturbation.
fn linear_data(n: usize, step: f64) -> (Array1<f64>, Array1<f64>) {
    let x = Array1::from_iter((0..n).map(|i| i as f64 * step));
    let y = Array1::from_iter(
        x.iter()
            .enumerate()
            .map(|(i, &x)| 2.0 * x + 1.0 + 0.1 * (3.7 * i as f64).sin()),
    );
    (x, y)
}

fn linear_basis() -> BasisSet {
    BasisSet::new(vec![Basis::power(0), Basis::power(1)])
}

/// Data source that hands its arrays to the trainer unchecked.
struct RawData {
    X: Rc<Array1<f64>>,
    y: Rc<Array1<f64>>,
}

impl RegressionData for RawData {
    fn X(&self) -> Rc<Array1<f64>> {
        self.X.clone()
    }

    fn y(&self) -> Rc<Array1<f64>> {
        self.y.clone()
    }
}

fn state_for(x: Array1<f64>, y: Array1<f64>, basis: BasisSet, seed: u64) -> RvmState {
    let data = Dataset::new(x, y).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    RvmState::new(RvmSettings::default(), Box::new(data), basis, &mut rng).unwrap()
}

#[test]
fn test_invariants_hold_at_every_iteration() {
    let (x, y) = demo_data();
    let mut state = state_for(x, y, BasisSet::polynomial(3), 7);

    assert_eq!(state.phase(), TrainingPhase::Initializing);
    assert!(state.posterior().is_none());

    let mut previous_size = state.active_set().len();
    let mut steps = 0;
    while !state.phase().is_terminal() {
        state.step().unwrap();
        steps += 1;
        assert!(steps < 1000, "training did not terminate");

        let active = state.active_set();
        let posterior = state.posterior().unwrap();
        let m = active.basis().len();

        assert_eq!(active.alpha().len(), m);
        assert_eq!(posterior.mean.len(), m);
        assert_eq!(posterior.covariance.dim(), (m, m));
        assert_eq!(active.design().ncols(), m);
        assert_eq!(active.design().nrows(), 8);

        assert!(max_asymmetry(&posterior.covariance) < 1e-12);
        assert!(active.alpha().iter().all(|&a| a > 0.0));
        assert!(state.beta() > 0.0);

        assert!(m <= previous_size);
        previous_size = m;
    }

    assert_eq!(state.phase(), TrainingPhase::Converged);
    assert!(state.last_change() < state.params.epsilon);
}

#[test]
fn test_history_records_every_iteration() {
    let (x, y) = demo_data();
    let mut state = state_for(x, y, BasisSet::polynomial(3), 11);
    state.run().unwrap();

    let history = state.history();
    assert_eq!(history.len(), state.iteration());

    let mut size = 4;
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record.iteration, i + 1);
        assert_eq!(record.n_basis + record.n_pruned, size);
        size = record.n_basis;
    }
    assert_eq!(size, state.active_set().len());

    let last = history.last().unwrap();
    assert_eq!(last.alpha_change, state.last_change());
    assert_eq!(last.beta, state.beta());
}

#[test]
fn test_linear_data_converges() {
    let (x, y) = linear_data(20, 0.5);
    let mut state = state_for(x, y, linear_basis(), 3);

    state.run().unwrap();

    assert_eq!(state.phase(), TrainingPhase::Converged);
    assert!(state.iteration() < 100);
    assert!(state.last_change() < 0.1);

    let model = state.into_model().unwrap();
    assert_eq!(model.relevant_ids(), &[0, 1]);
    assert_abs_diff_eq!(model.mean()[0], 1.0, epsilon = 0.05);
    assert_abs_diff_eq!(model.mean()[1], 2.0, epsilon = 0.05);
}

#[test]
fn test_uncorrelated_basis_is_pruned() {
    // cos(pi x) alternates between +1 and -1 on the integers and carries no
    // information about the linear trend.
    let (x, y) = linear_data(20, 1.0);
    let basis = BasisSet::new(vec![
        Basis::power(0),
        Basis::power(1),
        Basis::custom("alternating", |x| (std::f64::consts::PI * x).cos()),
    ]);

    for seed in 0..5 {
        let model = train_seeded(&x, &y, basis.clone(), RvmSettings::default(), seed).unwrap();

        assert_eq!(model.relevant_ids(), &[0, 1]);
        assert!(!model.basis().names().contains(&"alternating".to_string()));
    }
}

#[test]
fn test_polynomial_demo() {
    let (x, y) = demo_data();
    let mut rng = StdRng::seed_from_u64(2024);

    let model = train(&x, &y, BasisSet::polynomial(3), RvmSettings::default(), &mut rng).unwrap();

    assert!(model.n_relevant() >= 1 && model.n_relevant() <= 4);
    let mean = model.predict_mean(8.0);
    let stddev = model.predict_stddev(8.0);
    assert!((-20.0..=30.0).contains(&mean));
    assert!(stddev.is_finite() && stddev > 0.0);
}

#[test]
fn test_fixed_initialization_is_deterministic() {
    let (x, y) = demo_data();
    let fit = || {
        let data = Dataset::new(x.clone(), y.clone()).unwrap();
        RvmState::with_hyperparameters(
            RvmSettings::default(),
            Box::new(data),
            BasisSet::polynomial(3),
            Array1::from_elem(4, 0.15),
            0.15,
        )
        .unwrap()
        .fit()
        .unwrap()
    };

    let first = fit();
    let second = fit();

    assert_eq!(first.mean(), second.mean());
    assert_eq!(first.covariance(), second.covariance());
    assert_eq!(first.alpha(), second.alpha());
    assert_eq!(first.beta(), second.beta());
    assert_eq!(first.relevant_ids(), second.relevant_ids());
    assert_eq!(first.iterations(), second.iterations());
}

#[test]
fn test_seeded_training_is_reproducible() {
    let (x, y) = demo_data();

    let first = train_seeded(&x, &y, BasisSet::polynomial(3), RvmSettings::default(), 5).unwrap();
    let second = train_seeded(&x, &y, BasisSet::polynomial(3), RvmSettings::default(), 5).unwrap();

    assert_eq!(first.mean(), second.mean());
    assert_eq!(first.beta(), second.beta());
}

#[test]
fn test_kernel_expansion_is_sparse() {
    let x = Array1::linspace(-5.0, 5.0, 25);
    let sinc = |x: f64| if x == 0.0 { 1.0 } else { x.sin() / x };
    let y = Array1::from_iter(
        x.iter()
            .enumerate()
            .map(|(i, &x)| sinc(x) + 0.05 * (7.3 * i as f64).sin()),
    );
    let basis = BasisSet::gaussian_kernels(x.as_slice().unwrap(), 1.0, true).unwrap();

    let model = train_seeded(&x, &y, basis, RvmSettings::default(), 1).unwrap();

    assert!(model.n_relevant() < 26);
    for &xi in x.iter() {
        assert!((model.predict_mean(xi) - sinc(xi)).abs() < 0.15);
    }
}

#[test]
fn test_iteration_budget() {
    let (x, y) = demo_data();
    let data = Dataset::new(x, y).unwrap();
    let settings = RvmSettings::default()
        .with_epsilon(1e-12)
        .with_max_iterations(1);
    let mut rng = StdRng::seed_from_u64(0);
    let mut state = RvmState::new(settings, Box::new(data), BasisSet::polynomial(3), &mut rng).unwrap();

    let err = state.run().unwrap_err();

    assert!(matches!(
        err,
        TrainingError::NonConvergence {
            max_iterations: 1,
            ..
        }
    ));
    assert_eq!(state.phase(), TrainingPhase::Failed);
    assert_eq!(state.iteration(), 1);
    assert!(matches!(
        state.into_model(),
        Err(TrainingError::NotConverged(TrainingPhase::Failed))
    ));
}

#[test]
fn test_collapse_is_reported() {
    // A threshold this small prunes every basis function on the first pass
    let (x, y) = linear_data(10, 1.0);
    let data = Dataset::new(x, y).unwrap();
    let settings = RvmSettings::default().with_alpha_threshold(1e-9);
    let mut state = RvmState::with_hyperparameters(
        settings,
        Box::new(data),
        linear_basis(),
        array![0.15, 0.15],
        0.15,
    )
    .unwrap();

    assert_eq!(state.step().unwrap(), TrainingPhase::Iterating);
    assert_eq!(
        state.step().unwrap_err(),
        TrainingError::EmptyBasisSet { iteration: 1 }
    );
    assert_eq!(state.phase(), TrainingPhase::Collapsed);
    // Terminal phases are sticky
    assert_eq!(state.step().unwrap(), TrainingPhase::Collapsed);
    assert!(state.run().is_err());
}

#[test]
fn test_zero_residual_is_reported() {
    let x = array![1.0, 2.0, 3.0];
    let y = Array1::zeros(3);

    let err = train_seeded(&x, &y, linear_basis(), RvmSettings::default(), 0).unwrap_err();

    assert!(matches!(
        err,
        TrainingError::InvalidNoisePrecision { iteration: 1, .. }
    ));
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let (x, y) = demo_data();

    assert_eq!(
        train_seeded(&x, &y, BasisSet::new(vec![]), RvmSettings::default(), 0).unwrap_err(),
        TrainingError::NoBasisFunctions
    );
    assert_eq!(
        train_seeded(&x, &array![1.0], linear_basis(), RvmSettings::default(), 0).unwrap_err(),
        TrainingError::Data(DataError::LengthMismatch {
            inputs: 8,
            outputs: 1
        })
    );

    for settings in [
        RvmSettings::default().with_alpha_threshold(0.0),
        RvmSettings::default().with_epsilon(-1.0),
        RvmSettings::default().with_max_iterations(0),
        RvmSettings::default().with_init_range(0.2, 0.1),
        RvmSettings::default().with_init_range(0.0, 0.1),
    ] {
        assert!(matches!(
            train_seeded(&x, &y, linear_basis(), settings, 0),
            Err(TrainingError::InvalidSettings(_))
        ));
    }

    let data = Dataset::new(x, y).unwrap();
    let result = RvmState::with_hyperparameters(
        RvmSettings::default(),
        Box::new(data),
        linear_basis(),
        array![0.1, -0.1],
        0.1,
    );
    assert!(matches!(result, Err(TrainingError::InvalidSettings(_))));
}

#[test]
fn test_model_requires_convergence() {
    let (x, y) = demo_data();
    let state = state_for(x, y, BasisSet::polynomial(3), 0);

    assert!(matches!(
        state.into_model(),
        Err(TrainingError::NotConverged(TrainingPhase::Initializing))
    ));
}

#[test]
fn test_non_finite_data_is_rejected_for_any_source() {
    let finite = array![1.0, 2.0, 3.0];
    let with_nan = array![1.0, f64::NAN, 3.0];

    for (X, y) in [(with_nan.clone(), finite.clone()), (finite, with_nan)] {
        let data = RawData {
            X: Rc::new(X),
            y: Rc::new(y),
        };
        let result = RvmState::with_hyperparameters(
            RvmSettings::default(),
            Box::new(data),
            linear_basis(),
            array![0.15, 0.15],
            0.15,
        );
        assert_eq!(
            result.err(),
            Some(TrainingError::Data(DataError::NonFinite { index: 1 }))
        );
    }
}

#[test]
fn test_singular_matrix_is_reported() {
    // An unbounded basis function leaves no finite posterior precision
    let (x, y) = linear_data(5, 1.0);
    let data = Dataset::new(x, y).unwrap();
    let basis = BasisSet::new(vec![Basis::custom("blowup", |_| f64::INFINITY)]);
    let mut state =
        RvmState::with_hyperparameters(RvmSettings::default(), Box::new(data), basis, array![0.15], 0.15)
            .unwrap();

    let err = state.step().unwrap_err();

    assert!(matches!(err, TrainingError::SingularMatrix(_)));
    assert_eq!(state.phase(), TrainingPhase::Failed);
    assert!(state.posterior().is_none());
    assert!(matches!(
        state.fit(),
        Err(TrainingError::NotConverged(TrainingPhase::Failed))
    ));
}
