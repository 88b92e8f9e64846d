//! Fatal errors of the bot process.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use verdant_core::ConfigError;
use verdant_networking::ConnectionError;

/// Anything that ends the process with a non-zero exit code.
#[derive(Error, Debug)]
pub enum AppError {
    /// The config failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A local file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The async runtime could not start.
    #[error("cannot start runtime: {0}")]
    Runtime(#[source] io::Error),

    /// The connection gave up.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl AppError {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type of the binary.
pub type AppResult<T> = Result<T, AppError>;
