use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::data::IMAGE_SIZE;

/// A model mapping a batch of images to one logit per class.
pub trait Classifier<B: Backend> {
    /// Images of shape `[batch_size, height, width]` to logits of shape
    /// `[batch_size, num_classes]`.
    fn logits(&self, images: Tensor<B, 3>) -> Tensor<B, 2>;
}

#[derive(Config, Debug)]
pub struct CnnConfig {
    pub num_classes: usize,
    #[config(default = 32)]
    pub conv1_channels: usize,
    #[config(default = 64)]
    pub conv2_channels: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

/// Two convolution blocks followed by a two-layer perceptron.
#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AvgPool2d,
    hidden: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl CnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cnn<B> {
        // Each pooling halves both sides.
        let pooled = IMAGE_SIZE / 4;

        Cnn {
            conv1: Conv2dConfig::new([1, self.conv1_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.conv1_channels, self.conv2_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            hidden: LinearConfig::new(self.conv2_channels * pooled * pooled, self.hidden_size)
                .init(device),
            output: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Cnn<B> {
    /// # Shapes
    ///   - Images [batch_size, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, height, width] = images.dims();

        // Create a channel at the second dimension.
        let x = images.reshape([batch_size, 1, height, width]);

        let x = self.conv1.forward(x); // [batch_size, c1, 28, 28]
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, c1, 14, 14]
        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, c2, 7, 7]

        let x = x.flatten::<2>(1, 3);
        let x = self.hidden.forward(x);
        let x = self.activation.forward(x);

        self.output.forward(x)
    }
}

impl<B: Backend> Classifier<B> for Cnn<B> {
    fn logits(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward(images)
    }
}
