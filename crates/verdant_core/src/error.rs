//! # Core Error Types
//!
//! Errors raised while loading configuration and while applying patches
//! to the synchronized document.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::BotConfig`].
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the bot cannot run with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while decoding or applying a single patch operation.
///
/// A failing operation is skipped; the rest of its batch still applies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Path string is not a valid JSON Pointer.
    #[error("invalid path `{0}`")]
    InvalidPointer(String),

    /// Operation name is not one of add / replace / remove.
    #[error("unknown patch op `{0}`")]
    UnknownOp(String),

    /// Operation object is missing a required field or has the wrong shape.
    #[error("malformed patch op: {0}")]
    Malformed(String),

    /// `add` or `replace` without a value.
    #[error("missing value for op at `{path}`")]
    MissingValue {
        /// Rendered target path.
        path: String,
    },

    /// Target path does not resolve in the current document.
    #[error("path `{path}` does not resolve")]
    Unresolved {
        /// Rendered target path.
        path: String,
    },

    /// Array insertion beyond the end of the array.
    #[error("index {index} out of bounds at `{path}` (len {len})")]
    IndexOutOfBounds {
        /// Rendered target path.
        path: String,
        /// Requested index.
        index: usize,
        /// Array length at the time of the op.
        len: usize,
    },

    /// A path step lands on a scalar.
    #[error("`{path}` is not a container")]
    NotAContainer {
        /// Rendered path of the scalar.
        path: String,
    },

    /// Removing the document root is not allowed.
    #[error("cannot remove the document root")]
    RootRemoval,

    /// A patch arrived before any full state.
    #[error("no full state received yet")]
    NoBaseState,
}
