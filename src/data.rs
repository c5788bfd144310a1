use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{vision::MnistItem, Dataset},
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use rand::{rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Side of the square MNIST images.
pub const IMAGE_SIZE: usize = 28;

/// What to do with a final batch smaller than the batch size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialBatch {
    /// Discard the short batch.
    #[default]
    Drop,
    /// Keep the short batch.
    Keep,
}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Images of shape `[batch_size, 28, 28]`, scaled to `[0, 1]`.
    pub images: Tensor<B, 3>,
    /// Class index of every image.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.targets.dims()[0]
    }
}

impl<B: AutodiffBackend> MnistBatch<B> {
    /// The same batch on the inner backend, detached from any graph.
    pub fn inner(&self) -> MnistBatch<B::InnerBackend> {
        MnistBatch {
            images: self.images.clone().inner(),
            targets: self.targets.clone().inner(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Fetches the items at `indices` and batches them.
    pub fn load<D>(&self, dataset: &D, indices: &[usize]) -> Result<MnistBatch<B>>
    where
        D: Dataset<MnistItem> + ?Sized,
    {
        let items = indices
            .iter()
            .map(|index| dataset.get(*index).ok_or(Error::MissingItem(*index)))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.batch(items))
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, &self.device))
            .map(|tensor| tensor.reshape([1, IMAGE_SIZE, IMAGE_SIZE]))
            // Raw pixels are in [0, 255].
            .map(|tensor| tensor / 255)
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    [(item.label as i64).elem::<B::IntElem>()],
                    &self.device,
                )
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

/// Dataset indices grouped into batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Vec<usize>>,
}

impl BatchPlan {
    /// Batches `0..len` in order.
    pub fn sequential(len: usize, batch_size: usize, policy: PartialBatch) -> Self {
        Self::chunk((0..len).collect(), batch_size, policy)
    }

    /// Batches a random permutation of `0..len`.
    pub fn shuffled(len: usize, batch_size: usize, policy: PartialBatch, rng: &mut StdRng) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);

        Self::chunk(indices, batch_size, policy)
    }

    fn chunk(indices: Vec<usize>, batch_size: usize, policy: PartialBatch) -> Self {
        let batches = indices
            .chunks(batch_size.max(1))
            .filter(|chunk| policy == PartialBatch::Keep || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.batches.iter().map(Vec::as_slice)
    }

    /// Number of items covered by the plan.
    pub fn num_items(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}
