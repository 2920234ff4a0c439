//! Data containers exchanged with models.

mod batch;
mod frame;
mod label;
mod prediction;

pub use batch::{Batch, Inputs, Targets};
pub use frame::Frame;
pub use label::{ClassSpace, Label};
pub use prediction::{Output, Prediction, Predictions};
