//! Regression tree grown from per-row gradients and hessians.
//!
//! Nodes are stored as parallel arrays (structure of arrays). A sample goes
//! to the left child when `x[feature] < threshold`.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ParamValidationError;

/// Gains at or below this are not worth a split.
const MIN_SPLIT_GAIN: f64 = 1e-12;

// =============================================================================
// Parameters
// =============================================================================

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve to a count in `1..=n_features`.
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2().max(0.0) as usize,
            MaxFeatures::Fraction(f) => (f * n) as usize,
        };
        k.clamp(1, n_features.max(1))
    }

    pub fn validate(self) -> Result<(), ParamValidationError> {
        match self {
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(ParamValidationError::InvalidMaxFeatures(f)),
            _ => Ok(()),
        }
    }
}

/// Growth parameters for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
    pub max_features: MaxFeatures,
}

// =============================================================================
// RegressionTree
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    split_features: Vec<u32>,
    thresholds: Vec<f64>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `x`.
    ///
    /// Leaf weights are `-G / (H + lambda)`; splits maximize
    /// `GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)`. Rows may repeat (bootstrap).
    pub fn grow<R: Rng + ?Sized>(
        x: ArrayView2<'_, f64>,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self::default();
        let root = tree.push_leaf();
        let min_leaf = params.min_samples_leaf.max(1);

        let mut pending = vec![(root, rows, 0usize)];
        while let Some((node, rows, depth)) = pending.pop() {
            let (g, h) = rows.iter().fold((0.0, 0.0), |(g, h), &r| (g + grad[r], h + hess[r]));
            tree.leaf_values[node] = leaf_weight(g, h, params.lambda);

            if depth >= params.max_depth || rows.len() < 2 * min_leaf {
                continue;
            }
            let Some(split) = best_split(x, grad, hess, &rows, (g, h), params, rng) else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&r| x[[r, split.feature]] < split.threshold);
            let left = tree.push_leaf();
            let right = tree.push_leaf();
            tree.split_features[node] = split.feature as u32;
            tree.thresholds[node] = split.threshold;
            tree.left_children[node] = left as u32;
            tree.right_children[node] = right as u32;
            tree.is_leaf[node] = false;

            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }
        tree
    }

    fn push_leaf(&mut self) -> usize {
        self.split_features.push(0);
        self.thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        self.is_leaf.len() - 1
    }

    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    /// Depth of the deepest leaf (a lone root has depth 0).
    pub fn depth(&self) -> usize {
        if self.is_leaf.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf[node] {
                deepest = deepest.max(depth);
            } else {
                stack.push((self.left_children[node] as usize, depth + 1));
                stack.push((self.right_children[node] as usize, depth + 1));
            }
        }
        deepest
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.is_leaf.is_empty() {
            return 0.0;
        }
        let mut node = 0usize;
        while !self.is_leaf[node] {
            let feature = self.split_features[node] as usize;
            node = if row[feature] < self.thresholds[node] {
                self.left_children[node] as usize
            } else {
                self.right_children[node] as usize
            };
        }
        self.leaf_values[node]
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

#[inline]
fn leaf_weight(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom > 0.0 {
        -g / denom
    } else {
        0.0
    }
}

#[inline]
fn split_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom > 0.0 {
        g * g / denom
    } else {
        0.0
    }
}

fn best_split<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    (g, h): (f64, f64),
    params: &TreeParams,
    rng: &mut R,
) -> Option<Split> {
    let n_features = x.ncols();
    if n_features == 0 {
        return None;
    }
    let k = params.max_features.resolve(n_features);
    let features: Vec<usize> = if k >= n_features {
        (0..n_features).collect()
    } else {
        rand::seq::index::sample(rng, n_features, k).into_vec()
    };

    let min_leaf = params.min_samples_leaf.max(1);
    let parent = split_score(g, h, params.lambda);
    let mut best: Option<Split> = None;
    let mut order = rows.to_vec();

    for feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let (mut gl, mut hl) = (0.0, 0.0);
        for i in 0..order.len() - 1 {
            let row = order[i];
            gl += grad[row];
            hl += hess[row];

            let n_left = i + 1;
            if n_left < min_leaf || order.len() - n_left < min_leaf {
                continue;
            }
            let value = x[[row, feature]];
            let next = x[[order[i + 1], feature]];
            if value >= next {
                continue;
            }

            let gain = split_score(gl, hl, params.lambda) + split_score(g - gl, h - hl, params.lambda) - parent;
            if gain > best.map_or(MIN_SPLIT_GAIN, |s| s.gain) {
                let mid = value + (next - value) / 2.0;
                let threshold = if mid > value { mid } else { next };
                best = Some(Split { feature, threshold, gain });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;

    fn squared_loss(y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (y.iter().map(|v| -v).collect(), vec![1.0; y.len()])
    }

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_leaf: 1,
            lambda: 0.0,
            max_features: MaxFeatures::All,
        }
    }

    #[test]
    fn learns_step_function() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let (grad, hess) = squared_loss(&[0.0, 0.0, 10.0, 10.0]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = RegressionTree::grow(x.view(), &grad, &hess, (0..4).collect(), &params(3), &mut rng);

        assert_eq!(tree.n_leaves(), 2);
        assert_relative_eq!(tree.predict_row(array![1.5].view()), 0.0);
        assert_relative_eq!(tree.predict_row(array![3.5].view()), 10.0);
        assert_relative_eq!(tree.thresholds[0], 2.5);
    }

    #[test]
    fn depth_zero_is_mean_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let (grad, hess) = squared_loss(&[1.0, 2.0, 6.0]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = RegressionTree::grow(x.view(), &grad, &hess, (0..3).collect(), &params(0), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_relative_eq!(tree.predict_row(array![0.0].view()), 3.0);
    }

    #[test]
    fn respects_max_depth_and_min_samples_leaf() {
        let x = Array2::from_shape_fn((32, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Vec<f64> = (0..32).map(|i| ((i * 7) % 11) as f64).collect();
        let (grad, hess) = squared_loss(&y);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let tree_params = TreeParams {
            min_samples_leaf: 4,
            ..params(2)
        };
        let tree = RegressionTree::grow(x.view(), &grad, &hess, (0..32).collect(), &tree_params, &mut rng);
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn constant_feature_never_splits() {
        let x = array![[1.0], [1.0], [1.0]];
        let (grad, hess) = squared_loss(&[0.0, 5.0, 10.0]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = RegressionTree::grow(x.view(), &grad, &hess, (0..3).collect(), &params(4), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::All.resolve(10), 10);
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(10), 3);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(10), 1);
        assert!(MaxFeatures::Fraction(1.5).validate().is_err());
    }
}
