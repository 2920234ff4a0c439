//! gabarit: model lifecycle and aggregation framework.
//!
//! One contract for heterogeneous text and tabular backends: construct,
//! fit, predict, save, and reload from persisted artifacts alone.
//!
//! # Key Types
//!
//! - [`Model`] - The lifecycle contract, with shared bookkeeping in [`model::ModelBase`]
//! - [`ModelOptions`] - Construction options (`ModelOptions::builder()`)
//! - [`backends`] - TF-IDF classifiers and tabular regressors
//! - [`aggregation::ModelAggregationRegressor`] - Several regressors behind one model
//! - [`ModelRegistry`] - Finds saved models and reloads them
//!
//! # Persistence
//!
//! [`Model::save`] writes a configuration document, opaque pipeline blobs and
//! a usage note into the model directory. [`ModelRegistry::load_model`] reads
//! them back into a trained model, without the instance that produced them.

pub mod aggregation;
pub mod backends;
pub mod data;
pub mod error;
pub mod estimators;
pub mod logging;
pub mod model;
pub mod preprocess;
pub mod registry;
pub mod serving;
pub mod settings;
pub mod store;
pub mod strategy;
pub mod text;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use error::{ModelError, ModelResult};
pub use model::{Model, ModelHandle, ModelOptions};
pub use registry::ModelRegistry;

pub use data::{Frame, Inputs, Label, Output, Prediction, Predictions, Targets};
