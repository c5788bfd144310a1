use core::marker::PhantomData;

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
    LearningRate,
};

use crate::metrics::Metrics;

/// Everything a training step reads and produces: parameters, optimizer state and the
/// running metrics.
///
/// Transitions take the state by value and return the next one, so a state is never
/// observed after it was replaced.
pub struct TrainState<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optim: O,
    metrics: Metrics,
    lr: LearningRate,
    step: usize,
    _b: PhantomData<B>,
}

impl<B, M, O> TrainState<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    /// A state with an empty accumulator, starting at step 0.
    pub fn new(model: M, optim: O, lr: LearningRate) -> Self {
        Self {
            model,
            optim,
            metrics: Metrics::empty(),
            lr,
            step: 0,
            _b: PhantomData,
        }
    }

    /// Seeds the backend, then initializes the parameters with `init`.
    pub fn create<F>(init: F, optim: O, seed: u64, device: &B::Device, lr: LearningRate) -> Self
    where
        F: FnOnce(&B::Device) -> M,
    {
        B::seed(seed);

        Self::new(init(device), optim, lr)
    }

    /// Runs the optimizer on the parameters.
    pub fn apply_gradients(self, grads: GradientsParams) -> Self {
        let Self {
            model,
            mut optim,
            metrics,
            lr,
            step,
            _b,
        } = self;
        let model = optim.step(lr, model, grads);

        Self {
            model,
            optim,
            metrics,
            lr,
            step: step + 1,
            _b,
        }
    }

    /// Substitutes the metric accumulator, nothing else.
    pub fn replace_metrics(self, metrics: Metrics) -> Self {
        Self { metrics, ..self }
    }

    /// Empties the metric accumulator.
    pub fn reset_metrics(self) -> Self {
        self.replace_metrics(Metrics::empty())
    }

    /// The current parameters.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The running metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of optimizer steps applied so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// The learning rate passed to every optimizer step.
    pub fn learning_rate(&self) -> LearningRate {
        self.lr
    }

    /// Consumes the state, keeping the trained parameters.
    pub fn into_model(self) -> M {
        self.model
    }
}

impl<B, M, O> Clone for TrainState<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            optim: self.optim.clone(),
            metrics: self.metrics,
            lr: self.lr,
            step: self.step,
            _b: PhantomData,
        }
    }
}
