use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};

use crate::{data::MnistBatch, metrics::Metrics, model::Classifier, state::TrainState};

/// Mean cross-entropy between logits and class indices.
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// One gradient-descent step on a batch.
pub fn train_step<B, M, O>(state: TrainState<B, M, O>, batch: &MnistBatch<B>) -> TrainState<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    O: Optimizer<M, B>,
{
    let logits = state.model().logits(batch.images.clone());
    let loss = cross_entropy(logits, batch.targets.clone());

    // Gradients linked to each parameter of the model.
    let grads = GradientsParams::from_grads(loss.backward(), state.model());

    state.apply_gradients(grads)
}

/// Folds the metrics of a batch into the state's accumulator.
///
/// The forward pass runs on the inner backend; parameters and optimizer are left as is.
pub fn compute_metrics<B, M, O>(
    state: TrainState<B, M, O>,
    batch: &MnistBatch<B>,
) -> TrainState<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let update = batch_metrics(&state.model().valid(), &batch.inner());
    let metrics = state.metrics().merge(&update);

    state.replace_metrics(metrics)
}

/// A fresh accumulator holding the metrics of one batch.
pub fn batch_metrics<B, C>(model: &C, batch: &MnistBatch<B>) -> Metrics
where
    B: Backend,
    C: Classifier<B>,
{
    let logits = model.logits(batch.images.clone());
    let loss = cross_entropy(logits.clone(), batch.targets.clone());

    Metrics::from_batch(
        logits,
        batch.targets.clone(),
        loss.into_scalar().elem::<f64>(),
    )
}
