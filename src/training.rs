use std::fmt::Display;

use burn::{
    config::Config,
    data::dataset::{
        vision::{MnistDataset, MnistItem},
        Dataset,
    },
    module::{AutodiffModule, Module},
    optim::{Optimizer, SgdConfig},
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    data::{BatchPlan, MnistBatcher, PartialBatch},
    error::Error,
    metrics::{MetricValues, Metrics, MetricsHistory, Split},
    model::{Classifier, Cnn, CnnConfig},
    state::TrainState,
    step::{batch_metrics, compute_metrics, train_step},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: CnnConfig,
    pub optimizer: SgdConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 0.005)]
    pub learning_rate: f64,
    #[config(default = 0)]
    pub seed: u64,
    #[config(default = "PartialBatch::Drop")]
    pub partial_batch: PartialBatch,
}

impl TrainingConfig {
    /// Checks the hyperparameters against a training set of `num_items` items.
    pub fn validate(&self, num_items: usize) -> crate::Result<()> {
        if self.num_epochs == 0 {
            return Err(Error::InvalidConfig("`num_epochs` must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("`batch_size` must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "`learning_rate` must be positive, got {}",
                self.learning_rate
            )));
        }
        if BatchPlan::sequential(num_items, self.batch_size, self.partial_batch).is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{num_items} training items can't fill a batch of {}",
                self.batch_size
            )));
        }

        Ok(())
    }
}

/// Summary of one epoch on one split.
#[derive(new, Clone, Copy, Debug, PartialEq)]
pub struct EpochReport {
    pub split: Split,
    pub epoch: usize,
    pub values: MetricValues,
}

impl Display for EpochReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} epoch: {}, loss: {}, accuracy: {}",
            self.split,
            self.epoch,
            self.values.loss,
            self.values.accuracy * 100.0
        )
    }
}

/// Trains `state` on `dataset_train`, evaluating on `dataset_test` after every epoch.
///
/// Every epoch reshuffles the training set. Each epoch boundary finalizes the training
/// accumulator into `train_*` series and resets it, then records the test metrics under
/// `test_*`.
pub fn fit<B, M, O, D>(
    mut state: TrainState<B, M, O>,
    dataset_train: &D,
    dataset_test: &D,
    batcher: &MnistBatcher<B>,
    config: &TrainingConfig,
) -> crate::Result<(TrainState<B, M, O>, MetricsHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
    O: Optimizer<M, B>,
    D: Dataset<MnistItem> + ?Sized,
{
    config.validate(dataset_train.len())?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let plan_test =
        BatchPlan::sequential(dataset_test.len(), config.batch_size, config.partial_batch);
    let mut history = MetricsHistory::new();

    log::info!(
        "Training on {} items, testing on {} items",
        dataset_train.len(),
        plan_test.num_items()
    );

    for epoch in 1..=config.num_epochs {
        let plan_train = BatchPlan::shuffled(
            dataset_train.len(),
            config.batch_size,
            config.partial_batch,
            &mut rng,
        );
        log::debug!("Epoch {epoch}: {} training batches", plan_train.len());

        for indices in plan_train.iter() {
            let batch = batcher.load(dataset_train, indices)?;
            state = train_step(state, &batch);
            state = compute_metrics(state, &batch);
        }

        let train = state.metrics().compute()?;
        history.record(Split::Train, &train);
        state = state.reset_metrics();

        // The test pass never writes into the training state.
        let valid = state.model().valid();
        let mut metrics_test = Metrics::empty();
        for indices in plan_test.iter() {
            let batch = batcher.load(dataset_test, indices)?.inner();
            metrics_test = metrics_test.merge(&batch_metrics(&valid, &batch));
        }
        let test = metrics_test.compute()?;
        history.record(Split::Test, &test);

        for report in [
            EpochReport::new(Split::Train, epoch, train),
            EpochReport::new(Split::Test, epoch, test),
        ] {
            log::debug!("{report}");
            println!("{report}");
        }
    }

    Ok((state, history))
}

// Create the directory to save the model, the config and the history.
fn create_artifact_dir(artifact_dir: &str) -> crate::Result<()> {
    // Remove existing artifacts so the history matches this run.
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir)?;
    Ok(())
}

/// Trains the CNN on MNIST and writes `config.json`, `history.json` and the model record
/// into `artifact_dir`.
pub fn run<B: AutodiffBackend>(
    artifact_dir: &str,
    config: TrainingConfig,
    device: B::Device,
) -> crate::Result<MetricsHistory> {
    create_artifact_dir(artifact_dir)?;
    config.save(format!("{artifact_dir}/config.json"))?;

    let batcher = MnistBatcher::<B>::new(device.clone());
    let dataset_train = MnistDataset::train();
    let dataset_test = MnistDataset::test();

    let state = TrainState::<B, _, _>::create(
        |device| config.model.init::<B>(device),
        config.optimizer.init::<B, Cnn<B>>(),
        config.seed,
        &device,
        config.learning_rate,
    );

    let (state, history) = fit(state, &dataset_train, &dataset_test, &batcher, &config)?;

    history.save(format!("{artifact_dir}/history.json"))?;
    state
        .into_model()
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .map_err(|err| Error::Recorder(format!("{err:?}")))?;

    log::info!("Artifacts saved in {artifact_dir}");

    Ok(history)
}
