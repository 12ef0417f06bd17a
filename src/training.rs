use crate::error::Error;
use crate::evaluation::to_classes;
use crate::mnist::{Dataloader, HEIGHT, NUM_LABELS, WIDTH};
use crate::model::{LeNet, LeNetConfig};
use crate::optim::{OptimConfigExt, optimizer_config};
use burn::prelude::*;
use burn::{
    optim::{GradientsParams, Optimizer, SgdConfig},
    tensor::backend::AutodiffBackend,
};

#[derive(Config, Debug)]
pub struct BenchmarkConfig {
    pub model: LeNetConfig,
    pub optimizer: SgdConfig,
    #[config(default = 1e-2)]
    pub lr: f64,
    #[config(default = 66)]
    pub train_batch_size: usize,
    #[config(default = 100)]
    pub test_batch_size: usize,
    #[config(default = 11)]
    pub num_epochs: usize,
    /// Optimizer steps taken on each minibatch.
    #[config(default = 1)]
    pub iterations: usize,
    /// Seeds the backend, hence the weight initialization.
    #[config(default = 123)]
    pub seed: u64,
    #[config(default = 12345)]
    pub shuffle_seed: u64,
    #[config(default = 4)]
    pub num_workers: usize,
    /// Keep only the first examples of the training split.
    #[config(default = "None")]
    pub train_examples: Option<usize>,
    /// Keep only the first examples of the test split.
    #[config(default = "None")]
    pub test_examples: Option<usize>,
    /// Batches between two progress lines.
    #[config(default = 100)]
    pub log_interval: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self::new(LeNetConfig::new(), optimizer_config())
    }
}

impl BenchmarkConfig {
    /// Rejects a config that the MNIST batches cannot feed.
    ///
    /// The batcher always yields `[b, 1, HEIGHT, WIDTH]` images with labels below `NUM_LABELS`,
    /// so any other model shape would panic inside the backend.
    pub fn validate(&self) -> crate::Result<()> {
        let model = &self.model;
        let expected = [
            ("model.height", model.height, HEIGHT),
            ("model.width", model.width, WIDTH),
            ("model.channels", model.channels, 1),
            ("model.num_labels", model.num_labels, NUM_LABELS),
        ];
        for (name, found, expected) in expected {
            if found != expected {
                return Err(Error::InvalidConfig(format!(
                    "{name} is {found} but MNIST needs {expected}"
                )));
            }
        }
        for (name, value) in [
            ("train_batch_size", self.train_batch_size),
            ("test_batch_size", self.test_batch_size),
            ("iterations", self.iterations),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Running loss and accuracy over the batches of an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochMetrics {
    loss_sum: f64,
    correct: usize,
    items: usize,
    batches: usize,
}

impl EpochMetrics {
    pub fn update(&mut self, loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += loss * batch_size as f64;
        self.correct += correct;
        self.items += batch_size;
        self.batches += 1;
    }

    pub fn items(&self) -> usize {
        self.items
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Item-weighted mean loss.
    pub fn loss(&self) -> f64 {
        if self.items == 0 {
            return 0.0;
        }
        self.loss_sum / self.items as f64
    }

    /// Accuracy in percent.
    pub fn accuracy(&self) -> f64 {
        if self.items == 0 {
            return 0.0;
        }
        100.0 * self.correct as f64 / self.items as f64
    }
}

/// Trains `model` for `config.num_epochs` epochs.
///
/// Each epoch is a fresh pass over `dataloader`, which resets its iterator.
pub fn train<AutoB, Optim>(
    mut model: LeNet<AutoB>,
    dataloader: Dataloader<AutoB>,
    optim: &mut Optim,
    config: &BenchmarkConfig,
) -> crate::Result<LeNet<AutoB>>
where
    AutoB: AutodiffBackend,
    Optim: Optimizer<LeNet<AutoB>, AutoB>,
{
    log::info!("Starting training...");
    for epoch in 1..config.num_epochs + 1 {
        let (trained, metrics) = fit_epoch(model, dataloader.clone(), optim, config, epoch)?;
        model = trained;
        log::info!(
            "Epoch {epoch}/{}, Avg Loss {:.4}, Avg Acc {:.2}",
            config.num_epochs,
            metrics.loss(),
            metrics.accuracy(),
        );
    }
    log::info!("Training finished.");
    Ok(model)
}

/// One pass over the loader, taking `config.iterations` optimizer steps per batch.
pub fn fit_epoch<AutoB, Optim>(
    mut model: LeNet<AutoB>,
    dataloader: Dataloader<AutoB>,
    optim: &mut Optim,
    config: &BenchmarkConfig,
    epoch: usize,
) -> crate::Result<(LeNet<AutoB>, EpochMetrics)>
where
    AutoB: AutodiffBackend,
    Optim: Optimizer<LeNet<AutoB>, AutoB>,
{
    let num_batches = dataloader.num_items().div_ceil(config.train_batch_size.max(1));
    let mut metrics = EpochMetrics::default();

    for (b, batch) in dataloader.iter().enumerate() {
        let [batch_size] = batch.targets.dims();

        for iteration in 0..config.iterations {
            let step = model.forward_classification(batch.clone());

            // only the first iteration on a batch counts towards the metrics
            if iteration == 0 {
                let loss: f64 = step.loss.clone().into_scalar().elem();
                let targets = to_classes(step.targets.clone())?;
                let predictions =
                    to_classes(step.output.clone().argmax(1).reshape([batch_size]))?;
                let correct = targets
                    .iter()
                    .zip(&predictions)
                    .filter(|(t, p)| t == p)
                    .count();
                metrics.update(loss, correct, batch_size);
            }

            let grads = step.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.lr, model, grads);
        }

        if config.log_interval > 0 && (b + 1) % config.log_interval == 0 {
            log::debug!(
                "Epoch {epoch}/{}, Batch {:0>4}/{num_batches}, Loss {:.4}, Acc {:0>6.2}",
                config.num_epochs,
                b + 1,
                metrics.loss(),
                metrics.accuracy(),
            );
        }
    }

    Ok((model, metrics))
}

/// Builds the optimizer described by `config`.
pub fn init_optim<AutoB: AutodiffBackend>(
    config: &BenchmarkConfig,
) -> <SgdConfig as OptimConfigExt<AutoB, LeNet<AutoB>>>::Adaptor {
    <SgdConfig as OptimConfigExt<AutoB, LeNet<AutoB>>>::init(&config.optimizer)
}
