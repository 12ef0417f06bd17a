pub mod batcher;
pub mod dataset;

pub use batcher::{Dataloader, MnistBatch, MnistBatcher};
pub use dataset::{HEIGHT, MnistDataset, MnistItem, MnistSource, MnistSplit, NUM_LABELS, WIDTH};
