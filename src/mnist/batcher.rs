use super::dataset::{HEIGHT, MnistItem, WIDTH};
use burn::data::dataloader::{DataLoader, batcher::Batcher};
use burn::prelude::*;
use std::sync::Arc;

pub type Dataloader<B> = Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Brightness scaled into [0, 1] (`value / 255`), without binarization.
    ///
    /// # Shape
    /// [batch_size, 1, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let mut pixels = Vec::with_capacity(batch_size * HEIGHT * WIDTH);
        let mut labels = Vec::with_capacity(batch_size);
        for item in items {
            pixels.extend(item.image);
            labels.push(item.label as i64);
        }

        let images = TensorData::new(pixels, [batch_size, 1, HEIGHT, WIDTH])
            .convert::<B::FloatElem>();
        let images = Tensor::<B, 4>::from_data(images, device) / 255;

        let targets = TensorData::new(labels, [batch_size]).convert::<B::IntElem>();
        let targets = Tensor::<B, 1, Int>::from_data(targets, device);

        MnistBatch { images, targets }
    }
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use crate::backend::Element;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(value: Element, label: u8) -> MnistItem {
        MnistItem {
            image: vec![value; HEIGHT * WIDTH],
            label,
        }
    }

    #[test]
    fn batch_shapes_and_scaling() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(255.0, 3), item(51.0, 7)], &device);

        assert_eq!(batch.images.dims(), [2, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 7]);

        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!((pixels[0] - 1.0).abs() < 1e-6);
        assert!((pixels[HEIGHT * WIDTH] - 0.2).abs() < 1e-6);
    }
}
