//! Integration tests for the shared fit/predict lifecycle.

use approx::assert_abs_diff_eq;
use ndarray::Axis;
use rstest::rstest;

use gabarit::backends::{ModelRidgeRegressor, ModelTfidfCos, ModelTfidfGbt, ModelTfidfNaive};
use gabarit::estimators::GbtParams;
use gabarit::text::TfidfParams;
use gabarit::utils::argmax;
use gabarit::{Inputs, Label, Model, ModelError, ModelOptions, Output, Prediction, Predictions};

// =============================================================================
// Fixtures
// =============================================================================

fn options(root: &std::path::Path) -> ModelOptions {
    ModelOptions::builder().models_root(root).build()
}

fn gbt(root: &std::path::Path) -> ModelTfidfGbt {
    let params = GbtParams::builder().n_estimators(20).learning_rate(0.3).build().unwrap();
    ModelTfidfGbt::new(&options(root), TfidfParams::default(), params).unwrap()
}

fn three_class_corpus() -> (Vec<&'static str>, Vec<&'static str>) {
    (
        vec![
            "the cat purrs on the sofa",
            "a cat chases the mouse",
            "the dog barks at the mailman",
            "my dog fetches the ball",
            "the bird sings at dawn",
        ],
        vec!["cat", "cat", "dog", "dog", "bird"],
    )
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn probabilities_follow_sorted_class_order() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let (x, y) = three_class_corpus();
    model.fit(x.clone().into(), y.into()).unwrap();

    assert_eq!(
        model.base().classes().as_slice(),
        &[Label::from("bird"), Label::from("cat"), Label::from("dog")]
    );
    let (labels, probas) = model.predict_with_proba(x.into()).unwrap();
    assert_eq!(probas.dim(), (5, 3));
    for row in probas.axis_iter(Axis(0)) {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
    let labels = labels.labels().unwrap();
    for (label, row) in labels.iter().zip(probas.axis_iter(Axis(0))) {
        assert_eq!(model.base().classes().label(argmax(row)), Some(label));
    }
}

#[test]
fn single_input_is_unwrapped_and_batch_is_not() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let (x, y) = three_class_corpus();
    model.fit(x.into(), y.into()).unwrap();

    let single = model.predict("the dog barks".into(), false).unwrap();
    assert!(matches!(single, Output::Single(Prediction::Label(_))));

    let batch = model.predict(Inputs::from(vec!["the dog barks"]), false).unwrap();
    assert_eq!(batch.batch().map(Predictions::len), Some(1));

    let proba = model.predict("the dog barks".into(), true).unwrap();
    let Some(Prediction::Probas(row)) = proba.single() else {
        panic!("expected a probability row");
    };
    assert_eq!(row.len(), 3);
}

#[test]
fn predict_before_fit_is_not_fitted() {
    let root = tempfile::tempdir().unwrap();
    let model = gbt(root.path());
    assert!(matches!(model.predict("hello".into(), false), Err(ModelError::NotFitted { .. })));
    assert!(matches!(
        model.predict_with_proba(vec!["hello"].into()),
        Err(ModelError::NotFitted { .. })
    ));
}

#[test]
fn fit_counter_tracks_retraining() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let (x, y) = three_class_corpus();
    model.fit(x.clone().into(), y.clone().into()).unwrap();
    model.fit(x.into(), y.into()).unwrap();
    assert_eq!(model.nb_fit(), 2);
    assert!(model.is_trained());
}

#[test]
fn refusing_backends_keep_their_first_fit() {
    let root = tempfile::tempdir().unwrap();
    let mut model = ModelTfidfNaive::with_defaults(&options(root.path())).unwrap();
    let (x, y) = three_class_corpus();
    model.fit(x.clone().into(), y.clone().into()).unwrap();
    assert!(matches!(model.fit(x.into(), y.into()), Err(ModelError::Refit { .. })));
    assert_eq!(model.nb_fit(), 1);
}

#[test]
fn mismatched_lengths_leave_the_model_untrained() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let err = model.fit(vec!["a b", "c d"].into(), vec!["x"].into()).unwrap_err();
    assert!(matches!(err, ModelError::InvalidInput(_)));
    assert!(!model.is_trained());
    assert_eq!(model.nb_fit(), 0);
}

#[rstest]
#[case("toto")]
#[case("OVR ")]
fn unknown_strategy_fails_construction(#[case] strategy: &str) {
    let root = tempfile::tempdir().unwrap();
    let options = ModelOptions::builder()
        .models_root(root.path())
        .multiclass_strategy(strategy)
        .build();
    assert!(matches!(ModelTfidfGbt::with_defaults(&options), Err(ModelError::Configuration(_))));
    assert!(matches!(ModelTfidfNaive::with_defaults(&options), Err(ModelError::Configuration(_))));
}

#[test]
fn super_documents_and_multi_label_are_exclusive() {
    let root = tempfile::tempdir().unwrap();
    let options = ModelOptions::builder().models_root(root.path()).multi_label(true).build();
    assert!(matches!(
        ModelTfidfCos::new(&options, TfidfParams::default(), true),
        Err(ModelError::Configuration(_))
    ));
    assert!(matches!(ModelTfidfNaive::with_defaults(&options), Err(ModelError::Configuration(_))));
}

#[test]
fn each_instance_gets_its_own_directory() {
    let root = tempfile::tempdir().unwrap();
    let a = gbt(root.path());
    let b = gbt(root.path());
    assert_ne!(a.model_dir(), b.model_dir());
    assert!(a.model_dir().is_dir());
}

#[test]
fn predict_position_ranks_true_labels() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let (x, y) = three_class_corpus();
    model.fit(x.clone().into(), y.clone().into()).unwrap();

    let truth: Vec<Label> = y.iter().map(|&l| Label::from(l)).collect();
    let positions = model.get_predict_position(x.into(), &truth).unwrap();
    assert!(positions.iter().all(|p| matches!(p, Some(1..=3))));

    let unknown = model
        .get_predict_position(Inputs::from(vec!["a cat"]), &[Label::from("fish")])
        .unwrap();
    assert_eq!(unknown, vec![None]);
}

#[test]
fn inverse_transform_of_probabilities() {
    let root = tempfile::tempdir().unwrap();
    let mut model = gbt(root.path());
    let (x, y) = three_class_corpus();
    model.fit(x.clone().into(), y.into()).unwrap();

    let output = model.predict(x.into(), true).unwrap();
    let probas = output.batch().unwrap();
    let labels = model.inverse_transform(probas).unwrap();
    assert_eq!(labels.len(), 5);
    assert!(labels.iter().all(|l| l.len() == 1));
}

#[test]
fn regressors_have_no_probabilities() {
    let root = tempfile::tempdir().unwrap();
    let mut model = ModelRidgeRegressor::with_defaults(&options(root.path())).unwrap();
    let frame = gabarit::Frame::from_named(&["a"], ndarray::array![[0.0], [1.0], [2.0]]).unwrap();
    model.fit(frame.clone().into(), vec![0.0, 1.0, 2.0].into()).unwrap();
    assert!(matches!(model.predict(frame.into(), true), Err(ModelError::Capability(_))));
}
