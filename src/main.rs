#![recursion_limit = "256"]

use lenet_mnist_bench::{
    backend::{MainAutoBackend, MainDevice},
    benchmark,
    cli::{self, AppArgs},
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_args = AppArgs::parse()?;
    if app_args.help {
        println!("{}", cli::HELP);
        return Ok(());
    }

    let config = app_args.benchmark_config()?;
    log::debug!("{config}");
    benchmark::run::<MainAutoBackend>(
        &config,
        &app_args.source(),
        MainAutoBackend::main_device(),
        app_args.artifacts_path.as_deref(),
    )?;

    Ok(())
}
