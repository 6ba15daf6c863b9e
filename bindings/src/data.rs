#![allow(non_snake_case)]

use std::rc::Rc;

use ndarray::Array1;
use numpy::PyReadonlyArray1;
use sparse_rvm::RegressionData;

/// Training data copied out of the numpy arrays passed by the Python user.
pub struct NumpyData {
    X: Rc<Array1<f64>>,
    y: Rc<Array1<f64>>,
}

impl NumpyData {
    pub fn new(X: PyReadonlyArray1<f64>, y: PyReadonlyArray1<f64>) -> Self {
        Self {
            X: Rc::new(X.as_array().to_owned()),
            y: Rc::new(y.as_array().to_owned()),
        }
    }
}

impl RegressionData for NumpyData {
    fn X(&self) -> Rc<Array1<f64>> {
        Rc::clone(&self.X)
    }

    fn y(&self) -> Rc<Array1<f64>> {
        Rc::clone(&self.y)
    }
}
