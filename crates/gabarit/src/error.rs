//! Error taxonomy shared by every model, the artifact store and the registry.

use std::path::PathBuf;

use thiserror::Error;

use crate::estimators::ParamValidationError;
use crate::store::codec::{DecodeError, EncodeError};

/// Errors raised by the model lifecycle.
///
/// The first six variants form the public contract of the lifecycle. The
/// remaining ones wrap lower-level failures (filesystem, JSON, blob codec).
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid or incompatible construction options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A predict-family call on a model that was never fitted.
    #[error("model `{model_name}` is not fitted")]
    NotFitted { model_name: String },

    /// The model cannot provide the requested behavior.
    #[error("unsupported operation: {0}")]
    Capability(String),

    /// A required reload argument was not supplied.
    #[error("missing argument: `{0}` is required")]
    MissingArgument(&'static str),

    /// A reload path was supplied but does not exist.
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// A second fit on a backend that only supports a single fit.
    #[error("model `{model_name}` is already fitted and cannot be refitted")]
    Refit { model_name: String },

    /// Input data does not match what the model expects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Hyper-parameter validation failed.
    #[error("invalid parameter: {0}")]
    Params(#[from] ParamValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("timestamp formatting error: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("failed to write artifact: {0}")]
    Serialize(#[from] EncodeError),

    #[error("failed to read artifact: {0}")]
    Deserialize(#[from] DecodeError),
}

/// Result alias used throughout the crate.
pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn capability(message: impl Into<String>) -> Self {
        Self::Capability(message.into())
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
