//! Paths consumed by standalone reload.

use std::path::{Path, PathBuf};

use bon::Builder;

use crate::error::{ModelError, ModelResult};
use crate::store::{
    self, AGGREGATION_FUNCTION_FILE, CONFIGURATION_FILE, PREPROCESS_PIPELINE_FILE, STANDALONE_PIPELINE_FILE,
};

/// One of the files a standalone reload can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandaloneArtifact {
    Configuration,
    Pipeline,
    PreprocessPipeline,
    AggregationFunction,
}

impl StandaloneArtifact {
    pub fn argument_name(self) -> &'static str {
        match self {
            StandaloneArtifact::Configuration => "configuration_path",
            StandaloneArtifact::Pipeline => "pipeline_path",
            StandaloneArtifact::PreprocessPipeline => "preprocess_pipeline_path",
            StandaloneArtifact::AggregationFunction => "aggregation_function_path",
        }
    }
}

/// Artifact locations for [`Model::reload_from_standalone`](super::Model::reload_from_standalone).
///
/// # Example
///
/// ```
/// use gabarit::model::StandalonePaths;
///
/// let paths = StandalonePaths::builder()
///     .configuration("models/rf/configurations.json")
///     .pipeline("models/rf/pipeline_standalone.bin")
///     .build();
/// assert!(paths.aggregation_function.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct StandalonePaths {
    #[builder(into)]
    pub configuration: Option<PathBuf>,
    #[builder(into)]
    pub pipeline: Option<PathBuf>,
    #[builder(into)]
    pub preprocess_pipeline: Option<PathBuf>,
    #[builder(into)]
    pub aggregation_function: Option<PathBuf>,
}

impl StandalonePaths {
    /// Artifacts of the snapshot committed in a saved model directory.
    ///
    /// Blob names follow the generation recorded by the configuration
    /// document; a directory without one resolves to plain names.
    pub fn in_dir(dir: &Path) -> ModelResult<Self> {
        let generation = store::committed_generation(dir)?;
        let blob = |file: &str| Some(dir.join(store::generation_file(file, generation)));
        Ok(Self {
            configuration: Some(dir.join(CONFIGURATION_FILE)),
            pipeline: blob(STANDALONE_PIPELINE_FILE),
            preprocess_pipeline: blob(PREPROCESS_PIPELINE_FILE),
            aggregation_function: blob(AGGREGATION_FUNCTION_FILE),
        })
    }

    pub fn get(&self, artifact: StandaloneArtifact) -> Option<&Path> {
        match artifact {
            StandaloneArtifact::Configuration => self.configuration.as_deref(),
            StandaloneArtifact::Pipeline => self.pipeline.as_deref(),
            StandaloneArtifact::PreprocessPipeline => self.preprocess_pipeline.as_deref(),
            StandaloneArtifact::AggregationFunction => self.aggregation_function.as_deref(),
        }
    }

    /// Check that every `required` path was given, then that each exists.
    pub fn require(&self, required: &[StandaloneArtifact]) -> ModelResult<()> {
        for &artifact in required {
            if self.get(artifact).is_none() {
                return Err(ModelError::MissingArgument(artifact.argument_name()));
            }
        }
        for &artifact in required {
            if let Some(path) = self.get(artifact) {
                store::require_existing(path)?;
            }
        }
        Ok(())
    }

    /// A required path; [`ModelError::MissingArgument`] when omitted.
    pub fn path(&self, artifact: StandaloneArtifact) -> ModelResult<&Path> {
        self.get(artifact)
            .ok_or(ModelError::MissingArgument(artifact.argument_name()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_argument_is_reported_before_missing_file() {
        let paths = StandalonePaths::builder().configuration("/does/not/exist.json").build();
        let err = paths
            .require(&[StandaloneArtifact::Configuration, StandaloneArtifact::Pipeline])
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingArgument("pipeline_path")));
    }

    #[test]
    fn absent_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIGURATION_FILE), "{}").unwrap();
        let paths = StandalonePaths::in_dir(dir.path()).unwrap();
        assert_eq!(paths.pipeline, Some(dir.path().join(STANDALONE_PIPELINE_FILE)));

        assert!(paths.require(&[StandaloneArtifact::Configuration]).is_ok());
        let err = paths.require(&[StandaloneArtifact::Pipeline]).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactNotFound(_)));
    }

    #[test]
    fn blob_paths_follow_the_committed_generation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIGURATION_FILE), r#"{"save_generation": 2}"#).unwrap();
        let paths = StandalonePaths::in_dir(dir.path()).unwrap();
        assert_eq!(paths.pipeline, Some(dir.path().join("pipeline_standalone.g2.bin")));
        assert_eq!(paths.aggregation_function, Some(dir.path().join("aggregation_function.g2.bin")));
    }
}
