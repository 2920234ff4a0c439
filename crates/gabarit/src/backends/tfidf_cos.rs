//! TF-IDF nearest-reference classifier using cosine similarity.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    confs, cosine_similarity, encode_targets, no_probabilities, not_fitted, read_pipeline, read_record,
    text_features, write_pipelines,
};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;
use crate::strategy::{EncodedTargets, StrategyRules};
use crate::text::{to_dense, CountParams, TfidfParams, TfidfVectorizer, TransformerParams};
use crate::utils::argmax;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CosPipeline {
    vectorizer: TfidfVectorizer,
    /// One row per training document, or per class with super-documents.
    references: Array2<f64>,
    reference_classes: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CosConfs {
    tfidf: TfidfParams,
    with_super_documents: bool,
}

/// Predicts the class of the most similar reference document.
///
/// With `with_super_documents`, each class is represented by the
/// concatenation of its training documents. No probabilities.
#[derive(Debug)]
pub struct ModelTfidfCos {
    base: ModelBase,
    tfidf: TfidfParams,
    with_super_documents: bool,
    pipeline: Option<CosPipeline>,
}

impl ModelTfidfCos {
    pub const MODEL_CLASS: &'static str = "ModelTfidfCos";
    const RULES: StrategyRules = StrategyRules::MONO_LABEL_ONLY;

    pub fn new(options: &ModelOptions, tfidf: TfidfParams, with_super_documents: bool) -> ModelResult<Self> {
        if options.multi_label && with_super_documents {
            return Err(ModelError::config("super documents cannot be used with multi_label=true"));
        }
        Self::RULES.check(Self::MODEL_CLASS, options.multi_label, options.strategy()?)?;
        tfidf.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_tfidf_cos")?,
            tfidf,
            with_super_documents,
            pipeline: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, TfidfParams::default(), false)
    }

    pub fn with_super_documents(&self) -> bool {
        self.with_super_documents
    }

    /// Best similarity per class, `[n_samples, n_classes]`.
    fn similarity_by_class(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_fitted(&self.base))?;
        let features = text_features(&pipeline.vectorizer, x)?;
        let similarity = cosine_similarity(features.view(), pipeline.references.view());
        let mut scores = Array2::from_elem((features.nrows(), self.base.classes().len()), f64::NEG_INFINITY);
        for (i, row) in similarity.rows().into_iter().enumerate() {
            for (&class, &value) in pipeline.reference_classes.iter().zip(row) {
                if value > scores[[i, class]] {
                    scores[[i, class]] = value;
                }
            }
        }
        Ok(scores)
    }
}

impl Model for ModelTfidfCos {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn model_class(&self) -> &'static str {
        Self::MODEL_CLASS
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Classifier
    }

    fn librairie(&self) -> &'static str {
        "gabarit-text"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::Refuse
    }

    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let (classes, targets) = encode_targets(&self.base, y)?;
        let EncodedTargets::Classes { indices, n_classes } = targets else {
            return Err(ModelError::invalid_input("cosine similarity models are mono-label"));
        };
        let texts = x.texts()?;
        let mut vectorizer = TfidfVectorizer::new(self.tfidf.clone());
        let (references, reference_classes) = if self.with_super_documents {
            let references = vectorizer.fit_super_documents(texts, &indices, n_classes)?;
            (to_dense(&references), (0..n_classes).collect())
        } else {
            (to_dense(&vectorizer.fit_transform(texts)?), indices)
        };

        self.pipeline = Some(CosPipeline {
            vectorizer,
            references,
            reference_classes,
        });
        Ok(classes)
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        if return_proba {
            return Err(no_probabilities(Self::MODEL_CLASS));
        }
        let scores = self.similarity_by_class(x)?;
        let classes = self.base.classes();
        scores
            .rows()
            .into_iter()
            .map(|row| classes.decode(argmax(row)))
            .collect::<ModelResult<Vec<_>>>()
            .map(Predictions::Labels)
    }

    fn class_scores(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        self.similarity_by_class(x)
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        Ok(confs([
            ("tfidf_count_confs", serde_json::to_value(&self.tfidf.count)?),
            ("tfidf_confs", serde_json::to_value(&self.tfidf.transformer)?),
            ("with_super_documents", Value::Bool(self.with_super_documents)),
        ]))
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = CosConfs {
            tfidf: self.tfidf.clone(),
            with_super_documents: self.with_super_documents,
        };
        write_pipelines(&self.base, store, confs, self.pipeline.as_ref(), None)
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, _registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[StandaloneArtifact::Configuration, StandaloneArtifact::Pipeline])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let pipeline: CosPipeline = read_pipeline(paths)?;
        let count: Option<CountParams> = stored.extra_field("tfidf_count_confs")?;
        let transformer: Option<TransformerParams> = stored.extra_field("tfidf_confs")?;
        let with_super_documents: Option<bool> = stored.extra_field("with_super_documents")?;

        let fitted = pipeline.vectorizer.params();
        self.tfidf = TfidfParams {
            count: count.unwrap_or(fitted.count),
            transformer: transformer.unwrap_or(fitted.transformer),
        };
        self.with_super_documents = with_super_documents.unwrap_or(self.with_super_documents);
        self.base.restore(&stored);
        self.pipeline = Some(pipeline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Inputs, Label};

    fn fitted(root: &std::path::Path, super_documents: bool) -> ModelTfidfCos {
        let options = ModelOptions::builder().models_root(root).build();
        let mut model = ModelTfidfCos::new(&options, TfidfParams::default(), super_documents).unwrap();
        model
            .fit(
                vec!["open the door", "close the door", "turn on the light", "switch off light"].into(),
                vec!["door", "door", "light", "light"].into(),
            )
            .unwrap();
        model
    }

    #[test]
    fn nearest_reference_wins() {
        let root = tempfile::tempdir().unwrap();
        for super_documents in [false, true] {
            let model = fitted(root.path(), super_documents);
            let out = model.predict(vec!["open door", "light on"].into(), false).unwrap();
            let labels = out.batch().and_then(Predictions::labels).unwrap();
            assert_eq!(labels, &[Label::from("door"), Label::from("light")]);
        }
    }

    #[test]
    fn probabilities_are_a_capability_error() {
        let root = tempfile::tempdir().unwrap();
        let model = fitted(root.path(), false);
        let err = model.predict("door".into(), true).unwrap_err();
        assert!(matches!(err, ModelError::Capability(_)));
    }

    #[test]
    fn second_fit_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let mut model = fitted(root.path(), false);
        let err = model.fit(vec!["x y"].into(), vec!["z"].into()).unwrap_err();
        assert!(matches!(err, ModelError::Refit { .. }));
        assert_eq!(model.nb_fit(), 1);
    }

    #[test]
    fn rank_uses_similarity() {
        let root = tempfile::tempdir().unwrap();
        let model = fitted(root.path(), true);
        let positions = model
            .get_predict_position(Inputs::from(vec!["open door", "open door"]), &[Label::from("door"), Label::from("light")])
            .unwrap();
        assert_eq!(positions, vec![Some(1), Some(2)]);
    }

    #[test]
    fn super_documents_reject_multi_label() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder().models_root(root.path()).multi_label(true).build();
        let err = ModelTfidfCos::new(&options, TfidfParams::default(), true).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }
}
