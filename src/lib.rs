//   Copyright 2024 The PyMC Developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
#![warn(missing_docs)]
#![allow(non_snake_case)]

//! sparse_rvm implements sparse Bayesian regression with the Relevance
//! Vector Machine (RVM). The model is linear in a set of basis functions
//! and every weight gets its own prior precision. The precisions are
//! estimated from the data by evidence maximization, which drives most of
//! them to infinity; the corresponding basis functions are pruned and only
//! a handful of "relevant" ones survive. The surviving set gives fast
//! predictions together with a Gaussian predictive uncertainty.
//!
//! ```no_run
//! use ndarray::array;
//! use sparse_rvm::{train_seeded, BasisSet, RvmSettings};
//!
//! let x = array![1.0, 3.0, 5.0, 6.0, 7.0, 8.0, 8.5, 9.0];
//! let y = array![3.0, -2.0, 3.0, 8.0, 20.0, 12.0, 7.0, 10.0];
//!
//! let model = train_seeded(&x, &y, BasisSet::polynomial(3), RvmSettings::default(), 42)?;
//! let (low, high) = model.credible_interval(8.0, 2.0);
//! println!("{} in [{low}, {high}]", model.predict_mean(8.0));
//! # Ok::<(), sparse_rvm::TrainingError>(())
//! ```

pub mod basis;
pub mod data;
pub mod math;
pub mod model;
pub mod rvm;

pub use crate::basis::{
    compute_design_matrix, Basis, BasisError, BasisFunction, BasisSet, Constant, CustomBasis,
    GaussianKernel, Monomial,
};
pub use crate::data::{DataError, Dataset, RegressionData};
pub use crate::math::LinalgError;
pub use crate::model::{predict_mean, predict_stddev, ModelError, Prediction, RvmModel};
pub use crate::rvm::{
    train, train_seeded, IterationRecord, RvmSettings, RvmState, TrainingError, TrainingPhase,
};
