use std::fmt;
use std::path::PathBuf;

/// All errors that can occur while running the benchmark.
#[derive(Debug)]
pub enum Error {
    /// An IDX file does not start with the expected magic number.
    BadMagic {
        path: PathBuf,
        expected: u32,
        found: u32,
    },
    /// An IDX file is shorter than its header claims, or has unexpected dimensions.
    MalformedIdx { path: PathBuf, msg: String },
    /// The image and label files of a split disagree on the number of examples.
    CountMismatch { images: usize, labels: usize },
    /// The dataset could not be fetched into the local cache.
    Download(String),
    /// The evaluation was fed inconsistent data.
    Evaluation(String),
    /// A tensor could not be read back into host memory.
    TensorData(String),
    /// A config, model or report could not be persisted or loaded.
    Artifact(String),
    /// A config does not fit the MNIST data or cannot drive a run.
    InvalidConfig(String),
    /// An underlying I/O error not covered by the above variants.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic {
                path,
                expected,
                found,
            } => write!(
                f,
                "bad magic number in {path:?}: expected {expected}, found {found}"
            ),
            Self::MalformedIdx { path, msg } => write!(f, "malformed idx file {path:?}: {msg}"),
            Self::CountMismatch { images, labels } => {
                write!(f, "found {images} images but {labels} labels")
            }
            Self::Download(msg) => write!(f, "download error: {msg}"),
            Self::Evaluation(msg) => write!(f, "evaluation error: {msg}"),
            Self::TensorData(msg) => write!(f, "tensor data error: {msg}"),
            Self::Artifact(msg) => write!(f, "artifact error: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
