use crate::backend::RecorderTy;
use crate::error::{Error, Result};
use crate::evaluation::{Evaluation, evaluate};
use crate::mnist::{Dataloader, MnistBatcher, MnistDataset, MnistSource};
use crate::model::{LeNet, ModelConfigExt};
use crate::timing::{BenchmarkReport, PhaseTimer};
use crate::training::{BenchmarkConfig, init_optim, train};
use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::path::Path;

pub const CONFIG_NAME: &str = "benchmark_config.json";
pub const MODEL_NAME: &str = "model";
pub const REPORT_NAME: &str = "report.json";

/// Data phase: both loaders over MNIST.
pub fn build_loaders<AutoB: AutodiffBackend>(
    config: &BenchmarkConfig,
    source: &MnistSource,
    device: &AutoB::Device,
) -> Result<(Dataloader<AutoB>, Dataloader<AutoB::InnerBackend>)> {
    let batcher = MnistBatcher::default();

    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.train_batch_size)
        .shuffle(config.shuffle_seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(MnistDataset::train(source, config.train_examples)?);
    let dataloader_test = DataLoaderBuilder::new(batcher)
        .batch_size(config.test_batch_size)
        .shuffle(config.shuffle_seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(MnistDataset::test(source, config.test_examples)?);

    Ok((dataloader_train, dataloader_test))
}

/// Runs the whole benchmark: load data, build the model, train, evaluate, then print the timings.
///
/// When `artifacts` is given, the config, the trained model and the timing report are saved there.
pub fn run<AutoB: AutodiffBackend>(
    config: &BenchmarkConfig,
    source: &MnistSource,
    device: AutoB::Device,
    artifacts: Option<&Path>,
) -> Result<(BenchmarkReport, Evaluation)> {
    config.validate()?;
    let total_timer = PhaseTimer::start();

    let data_timer = PhaseTimer::start();
    log::info!("Load data...");
    let (dataloader_train, dataloader_test) = build_loaders::<AutoB>(config, source, &device)?;
    let data = data_timer.elapsed();

    log::info!("Build model...");
    AutoB::seed(&device, config.seed);
    let model: LeNet<AutoB> = config.model.init(&device);
    let mut optim = init_optim::<AutoB>(config);

    let train_timer = PhaseTimer::start();
    log::info!("Train model...");
    let model = train(model, dataloader_train, &mut optim, config)?;
    let train_time = train_timer.elapsed();

    let test_timer = PhaseTimer::start();
    log::info!("Evaluate model...");
    let evaluation = evaluate(&model.valid(), dataloader_test)?;
    log::info!("{}", evaluation.stats());
    let test = test_timer.elapsed();

    let report = BenchmarkReport {
        data,
        train: train_time,
        test,
        total: total_timer.elapsed(),
    };

    log::info!("****************Example finished********************");
    report.print();

    if let Some(dir) = artifacts {
        save_artifacts(dir, config, &model, &report)?;
    }

    Ok((report, evaluation))
}

pub fn save_artifacts<B: Backend>(
    dir: &Path,
    config: &BenchmarkConfig,
    model: &LeNet<B>,
    report: &BenchmarkReport,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let config_path = dir.join(CONFIG_NAME);
    log::info!("Saving benchmark config into {config_path:?}");
    config.save(&config_path)?;

    let model_path = dir.join(MODEL_NAME);
    log::info!("Saving model to {model_path:?}");
    model
        .clone()
        .save_file(model_path, &RecorderTy::new()) // ext added automatically
        .map_err(|e| Error::Artifact(format!("failed to save the model: {e}")))?;

    let report_path = dir.join(REPORT_NAME);
    log::info!("Saving report into {report_path:?}");
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| Error::Artifact(format!("failed to serialize the report: {e}")))?;
    std::fs::write(report_path, json)?;

    Ok(())
}

/// Loads a benchmark config, failing if the file is missing or invalid.
pub fn load_config(path: &Path) -> Result<BenchmarkConfig> {
    log::info!("Loading benchmark config from {path:?}");
    BenchmarkConfig::load(path)
        .map_err(|e| Error::Artifact(format!("failed to load {path:?}: {e}")))
}
