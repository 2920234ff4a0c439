//! Multiclass and multi-label decomposition.
//!
//! Backends hand a native multiclass estimator and a binary prototype to
//! [`StrategyEstimator`], which picks the decomposition requested at
//! construction:
//!
//! - `none`: the native estimator as-is
//! - `ovr`: [`OneVsRest`] over copies of the binary prototype
//! - `ovo`: [`OneVsOne`] over copies of the binary prototype
//!
//! In multi-label mode the chosen decomposition is cloned once per label
//! column and each clone solves a two-class problem.

mod ovo;
mod ovr;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

pub use ovo::OneVsOne;
pub use ovr::OneVsRest;

use crate::error::{ModelError, ModelResult};
use crate::model::MulticlassStrategy;

// =============================================================================
// Learner traits
// =============================================================================

/// Estimator for a 0/1 target.
pub trait BinaryLearner: Clone + Send + Sync {
    fn fit_binary(&mut self, x: ArrayView2<'_, f64>, y: &[bool]) -> ModelResult<()>;

    /// Probability of the positive class, one per row.
    fn predict_positive(&self, x: ArrayView2<'_, f64>) -> Array1<f64>;
}

/// Estimator that natively handles `n_classes >= 2`.
pub trait MulticlassLearner: Clone + Send + Sync {
    fn fit_multiclass(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()>;

    /// Probabilities `[n_samples, n_classes]`, rows summing to one.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64>;
}

// =============================================================================
// Rules
// =============================================================================

/// Strategy combinations a backend accepts, checked at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyRules {
    /// `ovr` / `ovo` accepted for mono-label models.
    pub multiclass_strategies: bool,
    pub multi_label: bool,
    /// `ovr` accepted together with `multi_label`.
    pub multi_label_ovr: bool,
    /// `ovo` accepted together with `multi_label`.
    pub multi_label_ovo: bool,
}

impl StrategyRules {
    /// Only `none`, mono-label.
    pub const MONO_LABEL_ONLY: Self = Self {
        multiclass_strategies: false,
        multi_label: false,
        multi_label_ovr: false,
        multi_label_ovo: false,
    };

    /// Every combination.
    pub const ALL: Self = Self {
        multiclass_strategies: true,
        multi_label: true,
        multi_label_ovr: true,
        multi_label_ovo: true,
    };

    pub fn check(&self, backend: &str, multi_label: bool, strategy: MulticlassStrategy) -> ModelResult<()> {
        if multi_label && !self.multi_label {
            return Err(ModelError::config(format!("{backend} does not support multi_label=true")));
        }
        let allowed = match (strategy, multi_label) {
            (MulticlassStrategy::None, _) => true,
            (_, false) => self.multiclass_strategies,
            (MulticlassStrategy::Ovr, true) => self.multi_label_ovr,
            (MulticlassStrategy::Ovo, true) => self.multi_label_ovo,
        };
        if allowed {
            Ok(())
        } else {
            Err(ModelError::config(format!(
                "{backend} does not support multiclass_strategy={strategy} with multi_label={multi_label}"
            )))
        }
    }
}

// =============================================================================
// Targets
// =============================================================================

/// Targets after label encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedTargets {
    Classes { indices: Vec<usize>, n_classes: usize },
    /// 0/1 matrix `[n_samples, n_labels]`.
    Indicators(Array2<u8>),
}

// =============================================================================
// Decomposition
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decomposition<N, B> {
    Native(N),
    OneVsRest(OneVsRest<B>),
    OneVsOne(OneVsOne<B>),
}

impl<N: MulticlassLearner, B: BinaryLearner> Decomposition<N, B> {
    pub fn new(strategy: MulticlassStrategy, native: N, binary: B) -> Self {
        match strategy {
            MulticlassStrategy::None => Decomposition::Native(native),
            MulticlassStrategy::Ovr => Decomposition::OneVsRest(OneVsRest::new(binary)),
            MulticlassStrategy::Ovo => Decomposition::OneVsOne(OneVsOne::new(binary)),
        }
    }
}

impl<N: MulticlassLearner, B: BinaryLearner> MulticlassLearner for Decomposition<N, B> {
    fn fit_multiclass(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()> {
        match self {
            Decomposition::Native(estimator) => estimator.fit_multiclass(x, y, n_classes),
            Decomposition::OneVsRest(estimator) => estimator.fit_multiclass(x, y, n_classes),
            Decomposition::OneVsOne(estimator) => estimator.fit_multiclass(x, y, n_classes),
        }
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        match self {
            Decomposition::Native(estimator) => estimator.predict_proba(x),
            Decomposition::OneVsRest(estimator) => estimator.predict_proba(x),
            Decomposition::OneVsOne(estimator) => estimator.predict_proba(x),
        }
    }
}

// =============================================================================
// StrategyEstimator
// =============================================================================

/// Per-label model; a label column with a single observed value needs no fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnModel<E> {
    Constant(bool),
    Fitted(E),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StrategyEstimator<N, B> {
    MonoLabel(Decomposition<N, B>),
    MultiLabel {
        prototype: Decomposition<N, B>,
        columns: Vec<ColumnModel<Decomposition<N, B>>>,
    },
}

impl<N: MulticlassLearner, B: BinaryLearner> StrategyEstimator<N, B> {
    pub fn new(multi_label: bool, strategy: MulticlassStrategy, native: N, binary: B) -> Self {
        let decomposition = Decomposition::new(strategy, native, binary);
        if multi_label {
            StrategyEstimator::MultiLabel {
                prototype: decomposition,
                columns: Vec::new(),
            }
        } else {
            StrategyEstimator::MonoLabel(decomposition)
        }
    }

    pub fn fit(&mut self, x: ArrayView2<'_, f64>, targets: &EncodedTargets) -> ModelResult<()> {
        match (self, targets) {
            (StrategyEstimator::MonoLabel(estimator), EncodedTargets::Classes { indices, n_classes }) => {
                estimator.fit_multiclass(x, indices, *n_classes)
            }
            (StrategyEstimator::MultiLabel { prototype, columns }, EncodedTargets::Indicators(values)) => {
                let fitted = values
                    .columns()
                    .into_iter()
                    .map(|column| {
                        let indices: Vec<usize> = column.iter().map(|&v| usize::from(v)).collect();
                        if indices.iter().all(|&v| v == indices[0]) {
                            return Ok(ColumnModel::Constant(indices.first() == Some(&1)));
                        }
                        let mut estimator = prototype.clone();
                        estimator.fit_multiclass(x, &indices, 2)?;
                        Ok(ColumnModel::Fitted(estimator))
                    })
                    .collect::<ModelResult<Vec<_>>>()?;
                *columns = fitted;
                Ok(())
            }
            (StrategyEstimator::MonoLabel(_), EncodedTargets::Indicators(_)) => Err(ModelError::invalid_input(
                "mono-label model received multi-label targets",
            )),
            (StrategyEstimator::MultiLabel { .. }, EncodedTargets::Classes { .. }) => Err(
                ModelError::invalid_input("multi-label model expects an indicator matrix as targets"),
            ),
        }
    }

    /// Mono-label: class probabilities `[n, n_classes]`.
    /// Multi-label: positive probability per label `[n, n_labels]`.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        match self {
            StrategyEstimator::MonoLabel(estimator) => estimator.predict_proba(x),
            StrategyEstimator::MultiLabel { columns, .. } => {
                let mut probas = Array2::zeros((x.nrows(), columns.len()));
                for (j, column) in columns.iter().enumerate() {
                    match column {
                        ColumnModel::Constant(value) => probas.column_mut(j).fill(if *value { 1.0 } else { 0.0 }),
                        ColumnModel::Fitted(estimator) => {
                            probas.column_mut(j).assign(&estimator.predict_proba(x).column(1));
                        }
                    }
                }
                probas
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Axis};
    use rstest::rstest;

    use super::*;
    use crate::estimators::{GbtParams, GradientBoosting, LinearModel, LinearParams};
    use crate::utils::argmax;

    type GbtStrategy = StrategyEstimator<GradientBoosting, GradientBoosting>;
    type LinearStrategy = StrategyEstimator<OneVsRest<LinearModel>, LinearModel>;

    fn gbt() -> GradientBoosting {
        GradientBoosting::new(GbtParams::builder().n_estimators(20).learning_rate(0.3).build().unwrap())
    }

    fn linear() -> LinearModel {
        LinearModel::logistic(LinearParams::builder().lambda(0.1).build().unwrap())
    }

    fn three_blobs() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [4.0, 0.0],
            [4.2, 0.1],
            [0.0, 4.0],
            [0.1, 4.2]
        ];
        (x, vec![0, 0, 1, 1, 2, 2])
    }

    #[rstest]
    #[case(MulticlassStrategy::None)]
    #[case(MulticlassStrategy::Ovr)]
    #[case(MulticlassStrategy::Ovo)]
    fn every_strategy_recovers_blobs(#[case] strategy: MulticlassStrategy) {
        let (x, y) = three_blobs();
        let mut model: GbtStrategy = StrategyEstimator::new(false, strategy, gbt(), gbt());
        model
            .fit(x.view(), &EncodedTargets::Classes { indices: y.clone(), n_classes: 3 })
            .unwrap();

        let probas = model.predict_proba(x.view());
        assert_eq!(probas.dim(), (6, 3));
        for row in probas.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
        let predicted: Vec<usize> = probas.rows().into_iter().map(argmax).collect();
        assert_eq!(predicted, y);
    }

    #[test]
    fn ovr_builds_one_estimator_per_class() {
        let (x, y) = three_blobs();
        let mut ovr = OneVsRest::new(linear());
        ovr.fit_multiclass(x.view(), &y, 3).unwrap();
        assert_eq!(ovr.estimators().len(), 3);

        let mut binary = OneVsRest::new(linear());
        binary.fit_multiclass(x.view(), &[0, 0, 0, 1, 1, 1], 2).unwrap();
        assert_eq!(binary.estimators().len(), 1);
    }

    #[test]
    fn ovo_builds_one_estimator_per_pair() {
        let (x, y) = three_blobs();
        let mut ovo = OneVsOne::new(linear());
        ovo.fit_multiclass(x.view(), &y, 3).unwrap();
        assert_eq!(ovo.pairs(), &[(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn multi_label_is_column_wise() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let indicators = array![[1, 0, 1], [1, 0, 1], [0, 1, 1], [0, 1, 1]];
        let mut model: LinearStrategy =
            StrategyEstimator::new(true, MulticlassStrategy::None, OneVsRest::new(linear()), linear());
        model.fit(x.view(), &EncodedTargets::Indicators(indicators)).unwrap();

        let probas = model.predict_proba(x.view());
        assert_eq!(probas.dim(), (4, 3));
        assert!(probas[[0, 0]] > 0.5 && probas[[3, 0]] < 0.5);
        assert!(probas[[0, 1]] < 0.5 && probas[[3, 1]] > 0.5);
        assert_eq!(probas.column(2).to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn target_shape_must_match_mode() {
        let x = array![[0.0], [1.0]];
        let mut model: GbtStrategy = StrategyEstimator::new(true, MulticlassStrategy::None, gbt(), gbt());
        let err = model
            .fit(x.view(), &EncodedTargets::Classes { indices: vec![0, 1], n_classes: 2 })
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[rstest]
    #[case(StrategyRules::MONO_LABEL_ONLY, true, MulticlassStrategy::None, false)]
    #[case(StrategyRules::MONO_LABEL_ONLY, false, MulticlassStrategy::Ovr, false)]
    #[case(StrategyRules::MONO_LABEL_ONLY, false, MulticlassStrategy::None, true)]
    #[case(StrategyRules::ALL, true, MulticlassStrategy::Ovo, true)]
    #[case(StrategyRules { multi_label_ovo: false, ..StrategyRules::ALL }, true, MulticlassStrategy::Ovo, false)]
    #[case(StrategyRules { multi_label_ovo: false, ..StrategyRules::ALL }, false, MulticlassStrategy::Ovo, true)]
    fn strategy_rules(
        #[case] rules: StrategyRules,
        #[case] multi_label: bool,
        #[case] strategy: MulticlassStrategy,
        #[case] ok: bool,
    ) {
        let result = rules.check("TestBackend", multi_label, strategy);
        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert!(matches!(err, ModelError::Configuration(_)));
        }
    }
}
