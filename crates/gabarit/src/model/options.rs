//! Construction options shared by every model.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ModelError, ModelResult};

// =============================================================================
// Enumerations
// =============================================================================

/// Multiclass decomposition. Persisted as `null`, `"ovr"` or `"ovo"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MulticlassStrategy {
    #[default]
    None,
    Ovr,
    Ovo,
}

impl MulticlassStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MulticlassStrategy::None => "none",
            MulticlassStrategy::Ovr => "ovr",
            MulticlassStrategy::Ovo => "ovo",
        }
    }
}

impl fmt::Display for MulticlassStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MulticlassStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(MulticlassStrategy::None),
            "ovr" => Ok(MulticlassStrategy::Ovr),
            "ovo" => Ok(MulticlassStrategy::Ovo),
            other => Err(ModelError::config(format!(
                "unknown multiclass_strategy `{other}`, expected one of none, ovr, ovo"
            ))),
        }
    }
}

impl Serialize for MulticlassStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MulticlassStrategy::None => serializer.serialize_none(),
            other => serializer.serialize_some(other.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for MulticlassStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(MulticlassStrategy::None),
            Some(raw) => raw.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// How much auxiliary state [`Model::save`](super::Model::save) writes.
///
/// - `LOW`: snapshot and configuration only
/// - `MEDIUM`: adds the standalone and preprocessing pipelines
/// - `HIGH`: adds a reproducibility record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelSave {
    Low,
    Medium,
    #[default]
    High,
}

impl LevelSave {
    pub fn includes_pipelines(self) -> bool {
        self >= LevelSave::Medium
    }
}

impl FromStr for LevelSave {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(LevelSave::Low),
            "MEDIUM" => Ok(LevelSave::Medium),
            "HIGH" => Ok(LevelSave::High),
            _ => Err(ModelError::config(format!(
                "unknown level_save `{s}`, expected one of LOW, MEDIUM, HIGH"
            ))),
        }
    }
}

/// Capability tag checked when models are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Classifier,
    Regressor,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Classifier => f.write_str("classifier"),
            ModelFamily::Regressor => f.write_str("regressor"),
        }
    }
}

// =============================================================================
// ModelOptions
// =============================================================================

/// Options accepted by every model constructor.
///
/// `multiclass_strategy` stays a raw string here; it is parsed when the
/// model is constructed so an unknown value fails construction.
///
/// # Example
///
/// ```
/// use gabarit::model::{LevelSave, ModelOptions};
///
/// let options = ModelOptions::builder()
///     .model_name("demo")
///     .models_root("/tmp/models")
///     .level_save(LevelSave::Medium)
///     .multiclass_strategy("ovr")
///     .build();
/// assert_eq!(options.model_name.as_deref(), Some("demo"));
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Defaults to the backend's own name.
    #[builder(into)]
    pub model_name: Option<String>,

    /// Explicit model directory; allocated under `models_root` when absent.
    #[builder(into)]
    pub model_dir: Option<PathBuf>,

    #[builder(into, default = PathBuf::from(DEFAULT_MODELS_ROOT))]
    pub models_root: PathBuf,

    /// Input columns of tabular models.
    pub x_col: Option<Vec<String>>,

    /// Target columns.
    pub y_col: Option<Vec<String>>,

    #[builder(default)]
    pub level_save: LevelSave,

    #[builder(default)]
    pub multi_label: bool,

    #[builder(into)]
    pub multiclass_strategy: Option<String>,

    /// Seed for backends with randomness; drawn at construction when absent.
    pub random_seed: Option<u64>,
}

pub const DEFAULT_MODELS_ROOT: &str = "models";

impl Default for ModelOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ModelOptions {
    /// Parse options from a TOML document.
    pub fn from_toml(source: &str) -> ModelResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Parsed multiclass strategy.
    pub fn strategy(&self) -> ModelResult<MulticlassStrategy> {
        self.multiclass_strategy
            .as_deref()
            .map_or(Ok(MulticlassStrategy::None), str::parse)
    }
}
