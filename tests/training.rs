use burn::{
    backend::{Autodiff, NdArray},
    data::dataset::{vision::MnistItem, InMemDataset},
    optim::{adaptor::OptimizerAdaptor, Sgd, SgdConfig},
};
use mnist_train::{
    data::{MnistBatcher, PartialBatch},
    model::{Cnn, CnnConfig},
    state::TrainState,
    training::{fit, TrainingConfig},
    Error,
};

type B = Autodiff<NdArray<f32>>;
type Optim = OptimizerAdaptor<Sgd<NdArray<f32>>, Cnn<B>, B>;

fn dataset(num_items: usize) -> InMemDataset<MnistItem> {
    let items = (0..num_items)
        .map(|i| {
            let label = (i % 10) as u8;
            MnistItem {
                image: [[label as f32 * 25.0; 28]; 28],
                label,
            }
        })
        .collect();

    InMemDataset::new(items)
}

fn config(num_epochs: usize, batch_size: usize) -> TrainingConfig {
    let model = CnnConfig::new(10)
        .with_conv1_channels(2)
        .with_conv2_channels(2)
        .with_hidden_size(8);

    TrainingConfig::new(model, SgdConfig::new())
        .with_num_epochs(num_epochs)
        .with_batch_size(batch_size)
        .with_learning_rate(0.01)
}

fn initial_state(config: &TrainingConfig) -> TrainState<B, Cnn<B>, Optim> {
    TrainState::create(
        |device| config.model.init(device),
        config.optimizer.init(),
        config.seed,
        &Default::default(),
        config.learning_rate,
    )
}

#[test]
fn full_batch_single_epoch_records_one_entry_per_series() {
    let config = config(1, 8);
    let batcher = MnistBatcher::new(Default::default());

    let (state, history) =
        fit(initial_state(&config), &dataset(8), &dataset(8), &batcher, &config).unwrap();

    for name in ["train_loss", "train_accuracy", "test_loss", "test_accuracy"] {
        assert_eq!(history.series(name).len(), 1, "series {name}");
    }
    assert_eq!(history.names().count(), 4);
    assert_eq!(state.step(), 1);
    assert!(state.metrics().is_empty());
}

#[test]
fn short_final_batch_is_dropped_by_default() {
    let config = config(2, 4);
    let batcher = MnistBatcher::new(Default::default());

    let (state, history) =
        fit(initial_state(&config), &dataset(10), &dataset(8), &batcher, &config).unwrap();

    assert_eq!(state.step(), 4);
    assert_eq!(history.series("train_loss").len(), 2);
    assert_eq!(history.series("test_accuracy").len(), 2);
}

#[test]
fn short_final_batch_is_trained_when_kept() {
    let config = config(2, 4).with_partial_batch(PartialBatch::Keep);
    let batcher = MnistBatcher::new(Default::default());

    let (state, _history) =
        fit(initial_state(&config), &dataset(10), &dataset(8), &batcher, &config).unwrap();

    assert_eq!(state.step(), 6);
}

#[test]
fn metrics_are_fractions_and_losses_are_finite() {
    let config = config(2, 5);
    let batcher = MnistBatcher::new(Default::default());

    let (_state, history) =
        fit(initial_state(&config), &dataset(20), &dataset(10), &batcher, &config).unwrap();

    for name in ["train_accuracy", "test_accuracy"] {
        assert!(history
            .series(name)
            .iter()
            .all(|accuracy| (0.0..=1.0).contains(accuracy)));
    }
    for name in ["train_loss", "test_loss"] {
        assert!(history.series(name).iter().all(|loss| loss.is_finite()));
    }
}

#[test]
fn test_set_without_a_full_batch_aborts() {
    let config = config(1, 4);
    let batcher = MnistBatcher::new(Default::default());

    let result = fit(initial_state(&config), &dataset(8), &dataset(3), &batcher, &config);

    assert!(matches!(result, Err(Error::NoData(_))));
}

#[test]
fn training_set_without_a_full_batch_is_rejected() {
    let config = config(1, 16);
    let batcher = MnistBatcher::new(Default::default());

    let result = fit(initial_state(&config), &dataset(8), &dataset(8), &batcher, &config);

    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
