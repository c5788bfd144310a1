use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Running count of correct predictions.
#[derive(new, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accuracy {
    /// Number of rows whose argmax matches the target.
    pub correct: u64,
    /// Number of rows seen.
    pub total: u64,
}

impl Accuracy {
    /// Counts the correct predictions of a single batch.
    pub fn from_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Self {
        let [batch_size, _n_classes] = logits.dims();
        let predictions = logits.argmax(1).reshape([batch_size]);
        let correct = predictions
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        Self::new(correct as u64, batch_size as u64)
    }

    /// Sums the counts of both accumulators.
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(self.correct + other.correct, self.total + other.total)
    }

    /// Fraction of correct predictions, in `[0, 1]`.
    pub fn compute(&self) -> Result<f64> {
        if self.total == 0 {
            return Err(Error::NoData("accuracy"));
        }

        Ok(self.correct as f64 / self.total as f64)
    }
}

/// Running mean of a scalar.
#[derive(new, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Average {
    /// Sum of the recorded values.
    pub total: f64,
    /// Number of recorded values.
    pub count: u64,
}

impl Average {
    /// An average holding a single value.
    pub fn from_value(value: f64) -> Self {
        Self::new(value, 1)
    }

    /// Sums the values and counts of both averages.
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(self.total + other.total, self.count + other.count)
    }

    /// The mean value; `name` labels the [`Error::NoData`] raised when nothing was recorded.
    pub fn compute(&self, name: &'static str) -> Result<f64> {
        if self.count == 0 {
            return Err(Error::NoData(name));
        }

        Ok(self.total / self.count as f64)
    }
}

/// Metric accumulator carried by the training state.
///
/// Accumulators are values: [update](Metrics::update) and [merge](Metrics::merge) return a
/// new accumulator and leave the receiver untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Classification accuracy.
    pub accuracy: Accuracy,
    /// Mean of the per-batch losses.
    pub loss: Average,
}

impl Metrics {
    /// A zeroed accumulator.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A fresh accumulator for one batch.
    ///
    /// The loss counts as a single value, whatever the batch size.
    pub fn from_batch<B: Backend>(
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        loss: f64,
    ) -> Self {
        Self {
            accuracy: Accuracy::from_predictions(logits, targets),
            loss: Average::from_value(loss),
        }
    }

    /// Returns this accumulator with one more batch folded in.
    pub fn update<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        loss: f64,
    ) -> Self {
        self.merge(&Self::from_batch(logits, targets, loss))
    }

    /// Sums the counters of both accumulators.
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            accuracy: self.accuracy.merge(&other.accuracy),
            loss: self.loss.merge(&other.loss),
        }
    }

    /// Whether no batch was accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.accuracy.total == 0 && self.loss.count == 0
    }

    /// Finalizes every metric.
    ///
    /// Fails with [Error::NoData] when nothing was accumulated.
    pub fn compute(&self) -> Result<MetricValues> {
        Ok(MetricValues::new(
            self.accuracy.compute()?,
            self.loss.compute("loss")?,
        ))
    }
}

/// Finalized metric values.
#[derive(new, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    /// Accuracy in `[0, 1]`.
    pub accuracy: f64,
    /// Mean loss.
    pub loss: f64,
}

impl MetricValues {
    /// Values keyed by metric name.
    pub fn entries(&self) -> [(&'static str, f64); 2] {
        [("loss", self.loss), ("accuracy", self.accuracy)]
    }
}

/// The dataset split a metric was computed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Test => f.write_str("test"),
        }
    }
}

/// Per-epoch metric series, keyed `{split}_{metric}` (e.g. `train_loss`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsHistory {
    series: BTreeMap<String, Vec<f64>>,
}

impl MetricsHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to a series, creating it if needed.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.series.entry(name.into()).or_default().push(value);
    }

    /// Appends every finalized metric under the split's prefix.
    pub fn record(&mut self, split: Split, values: &MetricValues) {
        for (name, value) in values.entries() {
            self.push(format!("{split}_{name}"), value);
        }
    }

    /// The values of a series; empty when the series was never recorded.
    pub fn series(&self, name: &str) -> &[f64] {
        self.series.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// The latest value of a series.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.series(name).last().copied()
    }

    /// Names of the recorded series, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Whether no series was recorded.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Writes the history as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a history written by [`MetricsHistory::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn logits(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            [
                [0.0, 0.2, 0.8], // 2
                [1.0, 2.0, 0.5], // 1
                [0.4, 0.1, 0.2], // 0
                [0.6, 0.7, 0.2], // 1
            ],
            device,
        )
    }

    #[test]
    fn accuracy_counts_argmax_matches() {
        let device = Default::default();
        let targets = Tensor::from_data([2, 2, 1, 1], &device);

        let accuracy = Accuracy::from_predictions(logits(&device), targets);

        assert_eq!(accuracy, Accuracy::new(2, 4));
        assert_eq!(accuracy.compute().unwrap(), 0.5);
    }

    #[test]
    fn half_correct_pair_is_exactly_one_half() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            [
                [0.0, 0.0, 0.0, 5.0, 0.0, 0.0], // 3
                [0.0, 0.0, 0.0, 5.0, 0.0, 1.0], // 3
            ],
            &device,
        );
        let targets = Tensor::from_data([3, 5], &device);

        let values = Metrics::empty()
            .update(logits, targets, 0.7)
            .compute()
            .unwrap();

        assert_eq!(values.accuracy, 0.5);
    }

    #[test]
    fn all_correct_batch_reports_its_loss() {
        let device = Default::default();
        let targets = Tensor::from_data([2, 1, 0, 1], &device);

        let values = Metrics::from_batch(logits(&device), targets, 0.25)
            .compute()
            .unwrap();

        assert_eq!(values, MetricValues::new(1.0, 0.25));
    }

    #[test]
    fn empty_is_merge_identity() {
        let device = Default::default();
        let targets = Tensor::from_data([2, 2, 1, 1], &device);
        let metrics = Metrics::from_batch(logits(&device), targets, 1.5);

        assert_eq!(Metrics::empty().merge(&metrics), metrics);
        assert_eq!(metrics.merge(&Metrics::empty()), metrics);
    }

    #[test]
    fn update_leaves_receiver_untouched() {
        let device = Default::default();
        let targets = Tensor::from_data([2, 2, 1, 1], &device);
        let metrics = Metrics::empty();

        let updated = metrics.update(logits(&device), targets, 1.0);

        assert!(metrics.is_empty());
        assert_eq!(updated.accuracy.total, 4);
        assert_eq!(updated.loss.count, 1);
    }

    #[test]
    fn loss_averages_over_batches() {
        let metrics = Metrics {
            accuracy: Accuracy::new(3, 4),
            loss: Average::from_value(1.0),
        }
        .merge(&Metrics {
            accuracy: Accuracy::new(1, 4),
            loss: Average::from_value(2.0),
        });

        let values = metrics.compute().unwrap();

        assert_eq!(values.loss, 1.5);
        assert_eq!(values.accuracy, 0.5);
    }

    #[test]
    fn empty_accumulator_has_no_data() {
        assert!(matches!(
            Metrics::empty().compute(),
            Err(Error::NoData("accuracy"))
        ));
        assert!(matches!(
            Average::default().compute("loss"),
            Err(Error::NoData("loss"))
        ));
    }

    #[test]
    fn history_records_split_prefixed_series() {
        let mut history = MetricsHistory::new();

        history.record(Split::Train, &MetricValues::new(0.9, 0.3));
        history.record(Split::Test, &MetricValues::new(0.8, 0.4));
        history.record(Split::Train, &MetricValues::new(0.95, 0.2));

        assert_eq!(history.series("train_accuracy"), &[0.9, 0.95]);
        assert_eq!(history.series("train_loss"), &[0.3, 0.2]);
        assert_eq!(history.last("test_loss"), Some(0.4));
        assert!(history.series("valid_loss").is_empty());
        assert_eq!(
            history.names().collect::<Vec<_>>(),
            ["test_accuracy", "test_loss", "train_accuracy", "train_loss"]
        );
    }

    #[test]
    fn history_survives_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = MetricsHistory::new();
        history.push("train_loss", 0.5);

        history.save(&path).unwrap();

        assert_eq!(MetricsHistory::load(&path).unwrap(), history);
    }
}
