use crate::mnist::{HEIGHT, MnistBatch, NUM_LABELS, WIDTH};
use burn::{
    nn::{
        Initializer, Linear, LinearConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

pub trait ModelConfigExt<B: Backend>: Config {
    type Model: Module<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
}

/// LeNet hyperparameters.
///
/// The defaults describe 28x28 single-channel inputs classified into 10 labels.
#[derive(Config, Debug)]
pub struct LeNetConfig {
    #[config(default = "HEIGHT")]
    pub height: usize,
    #[config(default = "WIDTH")]
    pub width: usize,
    #[config(default = 1)]
    pub channels: usize,
    #[config(default = "NUM_LABELS")]
    pub num_labels: usize,
    #[config(default = 20)]
    pub conv1_channels: usize,
    #[config(default = 50)]
    pub conv2_channels: usize,
    #[config(default = 500)]
    pub hidden: usize,
}

const KERNEL: usize = 5;
const POOL: usize = 2;

impl LeNetConfig {
    /// Spatial size after the two conv (valid padding) + pool stages.
    pub fn feature_dims(&self) -> [usize; 2] {
        let stage = |size: usize| size.saturating_sub(KERNEL - 1) / POOL;
        [stage(stage(self.height)), stage(stage(self.width))]
    }
}

/// Conv -> pool -> conv -> pool -> dense + relu -> output logits.
#[derive(Module, Debug)]
pub struct LeNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub dense: Linear<B>,
    pub output: Linear<B>,
    pub activation: Relu,
}

impl<B: Backend> ModelConfigExt<B> for LeNetConfig {
    type Model = LeNet<B>;

    /// Returns the initialized model.
    fn init(&self, device: &B::Device) -> Self::Model {
        let xavier = Initializer::XavierUniform { gain: 1.0 };
        let conv1 = Conv2dConfig::new([self.channels, self.conv1_channels], [KERNEL, KERNEL])
            .with_initializer(xavier.clone())
            .init(device);
        let conv2 = Conv2dConfig::new([self.conv1_channels, self.conv2_channels], [KERNEL, KERNEL])
            .with_initializer(xavier.clone())
            .init(device);
        let pool = MaxPool2dConfig::new([POOL, POOL])
            .with_strides([POOL, POOL])
            .init();
        let [h, w] = self.feature_dims();
        let dense = LinearConfig::new(self.conv2_channels * h * w, self.hidden)
            .with_initializer(xavier.clone())
            .init(device);
        let output = LinearConfig::new(self.hidden, self.num_labels)
            .with_initializer(xavier)
            .init(device);
        LeNet {
            conv1,
            conv2,
            pool,
            dense,
            output,
            activation: Relu::new(),
        }
    }
}

/// Loss, logits and targets of one classification step.
#[derive(Debug)]
pub struct ClassificationStep<B: Backend> {
    /// # Shape
    /// [1]
    pub loss: Tensor<B, 1>,
    /// # Shape
    /// [batch_size, num_labels]
    pub output: Tensor<B, 2>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> LeNet<B> {
    /// # Shapes
    ///
    /// - images: [batch_size, channels, height, width]
    /// - output: [batch_size, num_labels]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.pool.forward(x);
        let x = self.conv2.forward(x);
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.dense.forward(x);
        let x = self.activation.forward(x);
        self.output.forward(x)
    }

    pub fn forward_classification(&self, batch: MnistBatch<B>) -> ClassificationStep<B> {
        let [batch_size] = batch.targets.dims();
        let output = self.forward(batch.images);
        assert_eq!(batch_size, output.dims()[0]);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets.clone());

        ClassificationStep {
            loss,
            output,
            targets: batch.targets,
        }
    }
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn feature_dims_for_mnist() {
        assert_eq!(LeNetConfig::new().feature_dims(), [4, 4]);
        assert_eq!(LeNetConfig::new().with_height(3).feature_dims(), [0, 4]);
    }

    #[test]
    fn forward_shapes() {
        let device = Default::default();
        let model: LeNet<TestBackend> = LeNetConfig::new().init(&device);
        assert_eq!(model.dense.weight.dims(), [50 * 4 * 4, 500]);

        let images = Tensor::<TestBackend, 4>::zeros([3, 1, HEIGHT, WIDTH], &device);
        assert_eq!(model.forward(images).dims(), [3, NUM_LABELS]);
    }

    #[test]
    fn classification_loss_is_finite() {
        let device = Default::default();
        let model: LeNet<TestBackend> = LeNetConfig::new().init(&device);
        let batch = MnistBatch {
            images: Tensor::<TestBackend, 4>::ones([2, 1, HEIGHT, WIDTH], &device),
            targets: Tensor::<TestBackend, 1, Int>::from_ints([1, 9], &device),
        };

        let step = model.forward_classification(batch);
        assert_eq!(step.output.dims(), [2, NUM_LABELS]);
        let loss: f32 = step.loss.into_scalar().elem();
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}
