use crate::benchmark::load_config;
use crate::error::Result;
use crate::mnist::MnistSource;
use crate::training::BenchmarkConfig;
use std::ffi::OsString;
use std::path::PathBuf;

pub const HELP: &str = "\
LeNet MNIST Benchmark

Trains a LeNet convolutional network on MNIST and reports the wall-clock time
spent loading data, training and evaluating.

USAGE:
    lenet-mnist-bench [OPTIONS]

BEHAVIOR OVERVIEW
- Without --config, the fixed benchmark configuration is used (11 epochs, train batch 66, test batch 100, seed 123).
- Without --data-dir, MNIST is downloaded into ~/.cache/burn-dataset/mnist on first use.
- With --artifacts-path, the configuration, the trained model and the timing report are saved into that directory.
- Log verbosity follows RUST_LOG (default: info; use RUST_LOG=debug for per-batch progress).

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -c, --config <PATH>         Load the benchmark configuration from this json file
    -d, --data-dir <PATH>       Read the MNIST idx files (raw or .gz) from this directory
    -a, --artifacts-path <PATH> Directory where the configuration, model and report are saved
    -e, --epochs <N>            Override the number of training epochs
        --train-examples <N>    Only use the first N training examples
        --test-examples <N>     Only use the first N test examples
";

#[derive(Debug, Default)]
pub struct AppArgs {
    pub help: bool,
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub artifacts_path: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub train_examples: Option<usize>,
    pub test_examples: Option<usize>,
}

impl AppArgs {
    pub fn parse() -> std::result::Result<Self, pico_args::Error> {
        Self::parse_from(std::env::args_os().skip(1).collect())
    }

    pub fn parse_from(args: Vec<OsString>) -> std::result::Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_vec(args);

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(Self {
                help: true,
                ..Default::default()
            });
        }

        let args = AppArgs {
            help: false,
            config: pargs.opt_value_from_os_str(["-c", "--config"], parse_path)?,
            data_dir: pargs.opt_value_from_os_str(["-d", "--data-dir"], parse_path)?,
            artifacts_path: pargs.opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?,
            epochs: pargs.opt_value_from_str(["-e", "--epochs"])?,
            train_examples: pargs.opt_value_from_str("--train-examples")?,
            test_examples: pargs.opt_value_from_str("--test-examples")?,
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: format!("unused arguments: {remaining:?}"),
            });
        }

        Ok(args)
    }

    pub fn source(&self) -> MnistSource {
        match &self.data_dir {
            Some(dir) => MnistSource::Local(dir.clone()),
            None => MnistSource::Cache,
        }
    }

    /// The configuration file (or the fixed defaults) with the command-line overrides applied.
    ///
    /// Fails on a config whose model does not fit MNIST.
    pub fn benchmark_config(&self) -> Result<BenchmarkConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BenchmarkConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config.num_epochs = epochs;
        }
        if self.train_examples.is_some() {
            config.train_examples = self.train_examples;
        }
        if self.test_examples.is_some() {
            config.test_examples = self.test_examples;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> std::result::Result<PathBuf, &'static str> {
    Ok(s.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::LeNetConfig;
    use burn::config::Config;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let app_args = AppArgs::parse_from(vec![]).unwrap();
        assert!(!app_args.help);
        assert!(matches!(app_args.source(), MnistSource::Cache));

        let config = app_args.benchmark_config().unwrap();
        assert_eq!(config.num_epochs, 11);
        assert_eq!(config.train_examples, None);
    }

    #[test]
    fn help_wins() {
        let app_args = AppArgs::parse_from(args(&["-e", "3", "--help"])).unwrap();
        assert!(app_args.help);
    }

    #[test]
    fn overrides_apply_on_top_of_the_config_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        BenchmarkConfig::default()
            .with_num_epochs(5)
            .with_test_examples(Some(100))
            .save(&path)
            .unwrap();

        let path_arg = path.to_string_lossy().to_string();
        let app_args = AppArgs::parse_from(args(&[
            "--config",
            &path_arg,
            "-d",
            "/data/mnist",
            "--train-examples",
            "600",
        ]))
        .unwrap();
        assert!(matches!(
            app_args.source(),
            MnistSource::Local(dir) if dir == PathBuf::from("/data/mnist")
        ));

        let config = app_args.benchmark_config().unwrap();
        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.train_examples, Some(600));
        assert_eq!(config.test_examples, Some(100));

        let app_args = AppArgs::parse_from(args(&["-c", &path_arg, "-e", "1"])).unwrap();
        assert_eq!(app_args.benchmark_config().unwrap().num_epochs, 1);
    }

    #[test]
    fn rejects_unknown_and_malformed_arguments() {
        assert!(AppArgs::parse_from(args(&["--bogus"])).is_err());
        assert!(AppArgs::parse_from(args(&["--epochs", "many"])).is_err());
    }

    #[test]
    fn config_file_with_wrong_label_count_is_rejected() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = BenchmarkConfig::default();
        config.model = LeNetConfig::new().with_num_labels(5);
        config.save(&path).unwrap();

        let path_arg = path.to_string_lossy().to_string();
        let app_args = AppArgs::parse_from(args(&["-c", &path_arg])).unwrap();
        assert!(matches!(
            app_args.benchmark_config(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let app_args = AppArgs::parse_from(args(&["-c", "/nonexistent/config.json"])).unwrap();
        assert!(app_args.benchmark_config().is_err());
    }
}
