//! Model inputs and training targets.
//!
//! Every call is normalized to batch form. [`Inputs`] remembers whether the
//! caller passed a single sample, so the lone prediction can be unwrapped on
//! the way out.

use ndarray::{Array1, Array2};

use super::{Frame, Label};
use crate::error::{ModelError, ModelResult};

// =============================================================================
// Batch
// =============================================================================

/// A rectangular batch of samples.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// One document per sample.
    Texts(Vec<String>),
    /// Named numeric columns, one row per sample.
    Frame(Frame),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Texts(texts) => texts.len(),
            Batch::Frame(frame) => frame.n_rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn texts(&self) -> ModelResult<&[String]> {
        match self {
            Batch::Texts(texts) => Ok(texts),
            Batch::Frame(_) => Err(ModelError::invalid_input("expected text documents, got a numeric frame")),
        }
    }

    pub fn frame(&self) -> ModelResult<&Frame> {
        match self {
            Batch::Frame(frame) => Ok(frame),
            Batch::Texts(_) => Err(ModelError::invalid_input("expected a numeric frame, got text documents")),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Caller-facing input: a batch plus a single-sample marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    batch: Batch,
    single: bool,
}

impl Inputs {
    /// Wrap a batch; predictions keep batch shape.
    pub fn batch(batch: Batch) -> Self {
        Self { batch, single: false }
    }

    /// A single document; its prediction is unwrapped.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            batch: Batch::Texts(vec![text.into()]),
            single: true,
        }
    }

    /// A single row of named values; its prediction is unwrapped.
    pub fn row(columns: &[&str], values: &[f64]) -> ModelResult<Self> {
        let values = Array2::from_shape_vec((1, values.len()), values.to_vec())
            .map_err(|e| ModelError::invalid_input(e.to_string()))?;
        Ok(Self {
            batch: Batch::Frame(Frame::from_named(columns, values)?),
            single: true,
        })
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn as_batch(&self) -> &Batch {
        &self.batch
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

impl From<&str> for Inputs {
    fn from(text: &str) -> Self {
        Inputs::text(text)
    }
}

impl From<String> for Inputs {
    fn from(text: String) -> Self {
        Inputs::text(text)
    }
}

impl From<Vec<String>> for Inputs {
    fn from(texts: Vec<String>) -> Self {
        Inputs::batch(Batch::Texts(texts))
    }
}

impl From<Vec<&str>> for Inputs {
    fn from(texts: Vec<&str>) -> Self {
        Inputs::batch(Batch::Texts(texts.into_iter().map(str::to_string).collect()))
    }
}

impl From<&[&str]> for Inputs {
    fn from(texts: &[&str]) -> Self {
        Inputs::batch(Batch::Texts(texts.iter().map(|t| t.to_string()).collect()))
    }
}

impl From<Frame> for Inputs {
    fn from(frame: Frame) -> Self {
        Inputs::batch(Batch::Frame(frame))
    }
}

impl From<Batch> for Inputs {
    fn from(batch: Batch) -> Self {
        Inputs::batch(batch)
    }
}

// =============================================================================
// Targets
// =============================================================================

/// Training targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// One class label per sample.
    Labels(Vec<Label>),
    /// Binary indicator matrix `[n_samples, n_labels]` with named label columns.
    MultiLabel { columns: Vec<String>, values: Array2<u8> },
    /// Continuous regression targets.
    Values(Array1<f64>),
}

impl Targets {
    /// Build a multi-label target, checking shape and 0/1 values.
    pub fn multi_label(columns: &[&str], values: Array2<u8>) -> ModelResult<Self> {
        if columns.len() != values.ncols() {
            return Err(ModelError::invalid_input(format!(
                "{} label columns for {} indicator columns",
                columns.len(),
                values.ncols()
            )));
        }
        if values.iter().any(|&v| v > 1) {
            return Err(ModelError::invalid_input("multi-label targets must be 0 or 1"));
        }
        Ok(Targets::MultiLabel {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Targets::Labels(labels) => labels.len(),
            Targets::MultiLabel { values, .. } => values.nrows(),
            Targets::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Label>> for Targets {
    fn from(labels: Vec<Label>) -> Self {
        Targets::Labels(labels)
    }
}

impl From<Vec<&str>> for Targets {
    fn from(labels: Vec<&str>) -> Self {
        Targets::Labels(labels.into_iter().map(Label::from).collect())
    }
}

impl From<Vec<i64>> for Targets {
    fn from(labels: Vec<i64>) -> Self {
        Targets::Labels(labels.into_iter().map(Label::Int).collect())
    }
}

impl From<Label> for Targets {
    fn from(label: Label) -> Self {
        Targets::Labels(vec![label])
    }
}

impl From<&str> for Targets {
    fn from(label: &str) -> Self {
        Targets::Labels(vec![Label::from(label)])
    }
}

impl From<Array1<f64>> for Targets {
    fn from(values: Array1<f64>) -> Self {
        Targets::Values(values)
    }
}

impl From<Vec<f64>> for Targets {
    fn from(values: Vec<f64>) -> Self {
        Targets::Values(Array1::from(values))
    }
}
