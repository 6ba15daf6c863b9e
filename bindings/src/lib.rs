mod data;

use crate::data::NumpyData;

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use rand::rngs::StdRng;
use rand::{thread_rng, SeedableRng};
use sparse_rvm::{BasisSet, RvmModel, RvmSettings, RvmState, TrainingError};

fn training_error(err: TrainingError) -> PyErr {
    match err {
        TrainingError::InvalidSettings(_)
        | TrainingError::Data(_)
        | TrainingError::NoBasisFunctions => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// `Model` wraps a fitted `RvmModel`.
#[pyclass(name = "Model", frozen)]
struct ModelWrapper {
    model: RvmModel,
}

#[pymethods]
impl ModelWrapper {
    /// Predictive mean and standard deviation at every input of `x`.
    fn predict<'py>(
        &self,
        py: Python<'py>,
        x: PyReadonlyArray1<'py, f64>,
    ) -> (Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>) {
        let xs = x.as_array().to_owned();
        let (means, stddevs) = self.model.predict_many(&xs);

        (
            PyArray1::from_array_bound(py, &means),
            PyArray1::from_array_bound(py, &stddevs),
        )
    }

    #[getter]
    fn weights<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_array_bound(py, self.model.mean())
    }

    #[getter]
    fn alpha<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_array_bound(py, self.model.alpha())
    }

    #[getter]
    fn beta(&self) -> f64 {
        self.model.beta()
    }

    /// Positions of the relevant basis functions in the list passed to `fit`.
    #[getter]
    fn relevant(&self) -> Vec<usize> {
        self.model.relevant_ids().to_vec()
    }

    #[getter]
    fn basis(&self) -> Vec<String> {
        self.model.basis().names()
    }

    #[getter]
    fn iterations(&self) -> usize {
        self.model.iterations()
    }
}

#[pyfunction]
#[pyo3(signature = (x, y, basis, alpha_threshold=1000.0, epsilon=0.1, max_iterations=10_000, seed=None))]
fn fit(
    x: PyReadonlyArray1<f64>,
    y: PyReadonlyArray1<f64>,
    basis: Vec<String>,
    alpha_threshold: f64,
    epsilon: f64,
    max_iterations: usize,
    seed: Option<u64>,
) -> PyResult<ModelWrapper> {
    let data = Box::new(NumpyData::new(x, y));
    let basis = BasisSet::parse(&basis).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let params = RvmSettings::new(alpha_threshold, epsilon, max_iterations);

    let state = match seed {
        Some(seed) => RvmState::new(params, data, basis, &mut StdRng::seed_from_u64(seed)),
        None => RvmState::new(params, data, basis, &mut thread_rng()),
    }
    .map_err(training_error)?;
    let model = state.fit().map_err(training_error)?;

    Ok(ModelWrapper { model })
}

/// A Python module implemented in Rust.
#[pymodule]
fn sparse_rvm_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(fit, m)?)?;
    m.add_class::<ModelWrapper>()?;
    Ok(())
}
