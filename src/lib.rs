//! MNIST classifier trained with a functional training loop.
//!
//! A [TrainState](state::TrainState) bundles the model, the optimizer and the running
//! [metrics](metrics::Metrics). The [step functions](step) consume a state and a batch and
//! return the next state; the [training](training) driver chains them over epochs and
//! records a [history](metrics::MetricsHistory) of train and test metrics.

#[macro_use]
extern crate derive_new;

pub mod data;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod model;
pub mod state;
pub mod step;
pub mod training;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;

#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
