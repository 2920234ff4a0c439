//! Persisted configuration document.
//!
//! [`ModelRecord`] is projected from a live model when saving and never
//! mutated back into it. [`StoredRecord`] is the tolerant read side: every
//! field is optional so a reload can tell "absent" from "present".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::options::{LevelSave, ModelFamily, MulticlassStrategy};
use crate::data::Label;
use crate::error::ModelResult;
use crate::store;

/// Version of this crate, recorded for compatibility checks by readers.
pub const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub package_version: String,
    pub model_name: String,
    pub model_class: String,
    pub model_type: ModelFamily,
    pub model_dir: PathBuf,
    pub trained: bool,
    pub nb_fit: usize,
    pub x_col: Option<Vec<String>>,
    pub y_col: Option<Vec<String>>,
    pub list_classes: Option<Vec<Label>>,
    pub dict_classes: Option<BTreeMap<usize, Label>>,
    pub multi_label: bool,
    pub multiclass_strategy: MulticlassStrategy,
    pub level_save: LevelSave,
    pub librairie: String,
    pub date: String,
}

impl ModelRecord {
    /// Merge into one document: `extra` first, then `backend`, then the
    /// record itself, each overriding the previous one on key collisions.
    pub fn into_document(self, extra: Map<String, Value>, backend: Map<String, Value>) -> ModelResult<Map<String, Value>> {
        let mut document = extra;
        document.extend(backend);
        if let Value::Object(fields) = serde_json::to_value(self)? {
            document.extend(fields);
        }
        Ok(document)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredRecord {
    pub package_version: Option<String>,
    pub model_name: Option<String>,
    pub model_class: Option<String>,
    pub model_type: Option<ModelFamily>,
    pub trained: Option<bool>,
    pub nb_fit: Option<usize>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub x_col: Option<Option<Vec<String>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub y_col: Option<Option<Vec<String>>>,
    pub list_classes: Option<Vec<Label>>,
    pub multi_label: Option<bool>,
    #[serde(default)]
    pub multiclass_strategy: Option<MulticlassStrategy>,
    pub level_save: Option<LevelSave>,
    pub librairie: Option<String>,
    /// Everything else: backend sub-records, `list_models_name`, user extras.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredRecord {
    pub fn read(path: &Path) -> ModelResult<Self> {
        store::read_json(path)
    }

    /// Typed access to an extra field; `None` when absent or null.
    pub fn extra_field<T: serde::de::DeserializeOwned>(&self, key: &str) -> ModelResult<Option<T>> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> ModelRecord {
        ModelRecord {
            package_version: PACKAGE_VERSION.to_string(),
            model_name: "m".into(),
            model_class: "ModelTfidfGbt".into(),
            model_type: ModelFamily::Classifier,
            model_dir: PathBuf::from("/tmp/m"),
            trained: true,
            nb_fit: 1,
            x_col: None,
            y_col: Some(vec!["y".into()]),
            list_classes: Some(vec![Label::from("a"), Label::from("b")]),
            dict_classes: Some(BTreeMap::from([(0, Label::from("a")), (1, Label::from("b"))])),
            multi_label: false,
            multiclass_strategy: MulticlassStrategy::Ovr,
            level_save: LevelSave::High,
            librairie: "gabarit-trees".into(),
            date: "01/01/2024 - 00:00:00".into(),
        }
    }

    #[test]
    fn record_overrides_extra() {
        let mut extra = Map::new();
        extra.insert("test".into(), json!(8));
        extra.insert("nb_fit".into(), json!(99));
        let document = record().into_document(extra, Map::new()).unwrap();

        assert_eq!(document["test"], json!(8));
        assert_eq!(document["nb_fit"], json!(1));
        assert_eq!(document["multiclass_strategy"], json!("ovr"));
        assert_eq!(document["dict_classes"], json!({"0": "a", "1": "b"}));
        assert_eq!(document["x_col"], Value::Null);
    }

    #[test]
    fn stored_record_distinguishes_null_from_absent() {
        let stored: StoredRecord = serde_json::from_value(json!({
            "x_col": null,
            "nb_fit": 2,
            "list_models_name": ["a", "b"],
        }))
        .unwrap();
        assert_eq!(stored.x_col, Some(None));
        assert_eq!(stored.y_col, None);
        assert_eq!(stored.nb_fit, Some(2));
        assert_eq!(stored.trained, None);
        let names: Option<Vec<String>> = stored.extra_field("list_models_name").unwrap();
        assert_eq!(names, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn full_document_reads_back() {
        let document = record().into_document(Map::new(), Map::new()).unwrap();
        let stored: StoredRecord = serde_json::from_value(Value::Object(document)).unwrap();
        assert_eq!(stored.multiclass_strategy, Some(MulticlassStrategy::Ovr));
        assert_eq!(stored.list_classes.unwrap().len(), 2);
        assert_eq!(stored.x_col, Some(None));
        assert!(stored.extra.contains_key("dict_classes"));
    }
}
