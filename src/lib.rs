pub mod backend;
pub mod benchmark;
pub mod cli;
pub mod error;
pub mod evaluation;
pub mod mnist;
pub mod model;
pub mod optim;
pub mod timing;
pub mod training;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::benchmark::run;
    pub use crate::evaluation::Evaluation;
    pub use crate::mnist::{MnistDataset, MnistSource, MnistSplit};
    pub use crate::model::{LeNet, LeNetConfig, ModelConfigExt};
    pub use crate::timing::BenchmarkReport;
    pub use crate::training::BenchmarkConfig;
}
