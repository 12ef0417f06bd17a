//! Kept in its own test binary: the ndarray backend seeds one process-wide generator,
//! which concurrently running model tests would otherwise draw from.
#![cfg(feature = "ndarray")]

use burn::prelude::*;
use lenet_mnist_bench::model::{LeNet, LeNetConfig, ModelConfigExt};

type TestBackend = burn::backend::NdArray<f32>;

fn seeded_conv1(seed: u64) -> Vec<f32> {
    let device = Default::default();
    TestBackend::seed(&device, seed);
    let model: LeNet<TestBackend> = LeNetConfig::new().init(&device);
    model.conv1.weight.val().into_data().to_vec::<f32>().unwrap()
}

#[test]
fn same_seed_gives_same_weights() {
    let first = seeded_conv1(123);
    let second = seeded_conv1(123);
    assert_eq!(first, second);

    let other = seeded_conv1(124);
    assert_ne!(first, other);
}
