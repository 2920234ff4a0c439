//! Class labels and the ordered label space of a fitted classifier.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

// =============================================================================
// Label
// =============================================================================

/// A class label, either an integer or a string.
///
/// Ordering puts every integer label before every string label, then orders
/// by value. This ordering defines the positional meaning of probability
/// columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(value) => write!(f, "{value}"),
            Label::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Text(value)
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<i32> for Label {
    fn from(value: i32) -> Self {
        Label::Int(i64::from(value))
    }
}

// =============================================================================
// ClassSpace
// =============================================================================

/// Ordered set of classes observed at fit time.
///
/// Mono-label models use the sorted unique labels. Multi-label models use the
/// target column names in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSpace {
    classes: Vec<Label>,
}

impl ClassSpace {
    /// Sorted unique labels of `labels`.
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Label columns of a multi-label target, in column order.
    pub fn from_columns(columns: &[String]) -> Self {
        Self {
            classes: columns.iter().cloned().map(Label::Text).collect(),
        }
    }

    /// Rebuild a class space from a persisted `list_classes`.
    pub fn from_persisted(classes: Vec<Label>) -> Self {
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.classes
    }

    pub fn label(&self, index: usize) -> Option<&Label> {
        self.classes.get(index)
    }

    pub fn index_of(&self, label: &Label) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    /// Index → label mapping written as `dict_classes`.
    pub fn dict(&self) -> BTreeMap<usize, Label> {
        self.classes.iter().cloned().enumerate().collect()
    }

    /// Encode labels into class indices.
    pub fn encode(&self, labels: &[Label]) -> ModelResult<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.index_of(label)
                    .ok_or_else(|| ModelError::invalid_input(format!("unknown label `{label}`")))
            })
            .collect()
    }

    /// Decode an index, failing on out-of-range positions.
    pub fn decode(&self, index: usize) -> ModelResult<Label> {
        self.label(index).cloned().ok_or_else(|| {
            ModelError::invalid_input(format!(
                "class index {index} out of range for {} classes",
                self.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_sorted_and_deduplicated() {
        let labels: Vec<Label> = ["b", "a", "c", "a"].into_iter().map(Label::from).collect();
        let space = ClassSpace::from_labels(&labels);
        assert_eq!(space.as_slice(), &[Label::from("a"), Label::from("b"), Label::from("c")]);
        assert_eq!(space.encode(&labels).unwrap(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn integers_sort_before_strings() {
        let labels = vec![Label::from("x"), Label::from(3), Label::from(-1)];
        let space = ClassSpace::from_labels(&labels);
        assert_eq!(space.as_slice(), &[Label::Int(-1), Label::Int(3), Label::from("x")]);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let space = ClassSpace::from_labels(&[Label::from("a")]);
        let err = space.encode(&[Label::from("z")]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn label_json_is_untagged() {
        let json = serde_json::to_string(&vec![Label::from(1), Label::from("a")]).unwrap();
        assert_eq!(json, r#"[1,"a"]"#);
        let back: Vec<Label> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Label::Int(1), Label::from("a")]);
    }
}
