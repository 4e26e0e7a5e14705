//! 히스토그램 기반 Gradient Boosted Decision Trees.
//!
//! 이진 분류(logloss)와 회귀(L2) 목적 함수를 지원하는 leaf-wise 부스팅 구현입니다.
//!
//! - 피처 값은 분위수 기반 bin으로 이산화되며 분할 임계값은 원래 값 공간에 저장됩니다.
//! - 트리는 gain이 가장 큰 leaf부터 `num_leaves`개까지 확장됩니다.
//! - `max_depth <= 0`이면 깊이 제한이 없습니다.
//! - `subsample_freq > 0`일 때만 행 샘플링(bagging)이 적용됩니다.
//! - `colsample_bytree < 1`이면 트리마다 피처를 샘플링합니다.
//! - 이진 분류에서 양성 샘플의 가중치는 `scale_pos_weight`입니다.
//!
//! 같은 파라미터와 시드, 같은 입력에 대해 결과는 결정적입니다.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pricecast_core::GbdtParams;

use super::error::{MlError, MlResult};

/// leaf 분할에 필요한 최소 hessian 합.
const MIN_SUM_HESSIAN: f64 = 1e-3;
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// 목적 함수.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Binary,
    Regression,
}

/// 트리 노드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// `row[feature] <= threshold`면 왼쪽
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// 회귀 트리 하나.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return *value,
            }
        }
        0.0
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

/// 학습된 부스팅 모델.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub objective: Objective,
    pub n_features: usize,
    pub init_score: f64,
    pub trees: Vec<Tree>,
    /// 피처별 누적 분할 gain
    pub feature_importance: Vec<f64>,
}

impl GbdtModel {
    /// 원시 점수 (이진 분류는 log-odds).
    pub fn predict_raw(&self, row: &[f64]) -> f64 {
        self.init_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// 이진 분류는 양성 확률, 회귀는 예측값.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let raw = self.predict_raw(row);
        match self.objective {
            Objective::Binary => sigmoid(raw),
            Objective::Regression => raw,
        }
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// 입력 차원을 확인한 뒤 예측합니다.
    pub fn predict_checked(&self, row: &[f64]) -> MlResult<f64> {
        if row.len() != self.n_features {
            return Err(MlError::FeatureMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let value = self.predict(row);
        if !value.is_finite() {
            return Err(MlError::Inference("non-finite model output".to_string()));
        }
        Ok(value)
    }
}

/// GBDT 학습기.
#[derive(Debug, Clone)]
pub struct GbdtTrainer {
    params: GbdtParams,
    objective: Objective,
    scale_pos_weight: f64,
}

impl GbdtTrainer {
    pub fn classifier(params: GbdtParams) -> Self {
        Self {
            params,
            objective: Objective::Binary,
            scale_pos_weight: 1.0,
        }
    }

    pub fn regressor(params: GbdtParams) -> Self {
        Self {
            params,
            objective: Objective::Regression,
            scale_pos_weight: 1.0,
        }
    }

    pub fn with_scale_pos_weight(mut self, weight: f64) -> Self {
        self.scale_pos_weight = weight;
        self
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    fn check_params(&self) -> MlResult<()> {
        let p = &self.params;
        if p.n_estimators == 0 {
            return Err(MlError::InvalidParams("n_estimators must be > 0".to_string()));
        }
        if !(p.learning_rate > 0.0) {
            return Err(MlError::InvalidParams("learning_rate must be > 0".to_string()));
        }
        if p.num_leaves < 2 {
            return Err(MlError::InvalidParams("num_leaves must be >= 2".to_string()));
        }
        if !(p.subsample > 0.0 && p.subsample <= 1.0) {
            return Err(MlError::InvalidParams("subsample must be in (0, 1]".to_string()));
        }
        if !(p.colsample_bytree > 0.0 && p.colsample_bytree <= 1.0) {
            return Err(MlError::InvalidParams(
                "colsample_bytree must be in (0, 1]".to_string(),
            ));
        }
        if p.max_bin < 2 {
            return Err(MlError::InvalidParams("max_bin must be >= 2".to_string()));
        }
        if !(self.scale_pos_weight > 0.0) || !self.scale_pos_weight.is_finite() {
            return Err(MlError::InvalidParams(
                "scale_pos_weight must be a positive finite number".to_string(),
            ));
        }
        Ok(())
    }

    /// 행렬 `x`(행 우선)와 타깃 `y`로 모델을 학습합니다.
    ///
    /// 이진 분류의 타깃은 0.0 / 1.0이어야 합니다.
    pub fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> MlResult<GbdtModel> {
        self.check_params()?;

        let n = x.len();
        if n == 0 {
            return Err(MlError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if y.len() != n {
            return Err(MlError::InvalidInput(format!(
                "row count mismatch: x={}, y={}",
                n,
                y.len()
            )));
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != n_features) {
            return Err(MlError::FeatureMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(MlError::InvalidInput("non-finite target".to_string()));
        }

        let binned = BinnedMatrix::build(x, n_features, self.params.max_bin);
        let weights: Vec<f64> = match self.objective {
            Objective::Binary => y
                .iter()
                .map(|v| if *v >= 0.5 { self.scale_pos_weight } else { 1.0 })
                .collect(),
            Objective::Regression => vec![1.0; n],
        };
        let init_score = self.init_score(y, &weights);
        if !init_score.is_finite() {
            return Err(MlError::Training(format!(
                "non-finite initial score {init_score}"
            )));
        }

        let mut scores = vec![init_score; n];
        let mut grads = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut bag: Vec<usize> = (0..n).collect();
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        let mut importance = vec![0.0; n_features];

        let bagging = self.params.subsample < 1.0 && self.params.subsample_freq > 0;
        let n_sampled_features = ((self.params.colsample_bytree * n_features as f64).round() as usize)
            .clamp(1, n_features.max(1));

        for iteration in 0..self.params.n_estimators {
            self.gradients(y, &weights, &scores, &mut grads, &mut hess);

            if bagging && iteration % self.params.subsample_freq == 0 {
                bag = (0..n)
                    .filter(|_| rng.gen::<f64>() < self.params.subsample)
                    .collect();
                if bag.is_empty() {
                    bag = (0..n).collect();
                }
            }

            let features: Vec<usize> = if n_sampled_features < n_features {
                let mut picked =
                    rand::seq::index::sample(&mut rng, n_features, n_sampled_features).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n_features).collect()
            };

            let tree = self.grow_tree(&binned, &bag, &features, &grads, &hess, &mut importance);
            for (i, row) in x.iter().enumerate() {
                scores[i] += tree.predict(row);
            }
            if scores.iter().any(|s| !s.is_finite()) {
                return Err(MlError::Training(format!(
                    "scores diverged at iteration {iteration}"
                )));
            }
            trees.push(tree);
        }

        debug!(
            objective = ?self.objective,
            rows = n,
            features = n_features,
            trees = trees.len(),
            "GBDT fit complete"
        );

        Ok(GbdtModel {
            objective: self.objective,
            n_features,
            init_score,
            trees,
            feature_importance: importance,
        })
    }

    fn init_score(&self, y: &[f64], weights: &[f64]) -> f64 {
        let total_w: f64 = weights.iter().sum();
        let mean = y.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total_w;
        match self.objective {
            Objective::Binary => {
                let p = mean.clamp(1e-15, 1.0 - 1e-15);
                (p / (1.0 - p)).ln()
            }
            Objective::Regression => mean,
        }
    }

    fn gradients(&self, y: &[f64], weights: &[f64], scores: &[f64], grads: &mut [f64], hess: &mut [f64]) {
        for i in 0..y.len() {
            match self.objective {
                Objective::Binary => {
                    let p = sigmoid(scores[i]);
                    grads[i] = (p - y[i]) * weights[i];
                    hess[i] = (p * (1.0 - p)).max(1e-16) * weights[i];
                }
                Objective::Regression => {
                    grads[i] = scores[i] - y[i];
                    hess[i] = 1.0;
                }
            }
        }
    }

    fn grow_tree(
        &self,
        binned: &BinnedMatrix,
        rows: &[usize],
        features: &[usize],
        grads: &[f64],
        hess: &[f64],
        importance: &mut [f64],
    ) -> Tree {
        let p = &self.params;
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];

        let root = LeafState::new(rows.to_vec(), 0, 0, grads, hess);
        let mut leaves = vec![self.with_best_split(root, binned, features, grads, hess)];

        while leaves.len() < p.num_leaves {
            let candidate = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, l)| l.best.as_ref().map(|s| (i, s.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            let Some((idx, _)) = candidate else {
                break;
            };

            let leaf = leaves.swap_remove(idx);
            let Some(split) = leaf.best else {
                break;
            };
            importance[split.feature] += split.gain;

            let bins = &binned.bins[split.feature];
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .copied()
                .partition(|r| usize::from(bins[*r]) <= split.bin);

            let left_node = nodes.len();
            nodes.push(TreeNode::Leaf { value: 0.0 });
            let right_node = nodes.len();
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: binned.edges[split.feature][split.bin],
                left: left_node,
                right: right_node,
            };

            let depth = leaf.depth + 1;
            let left = LeafState::new(left_rows, depth, left_node, grads, hess);
            let right = LeafState::new(right_rows, depth, right_node, grads, hess);
            leaves.push(self.with_best_split(left, binned, features, grads, hess));
            leaves.push(self.with_best_split(right, binned, features, grads, hess));
        }

        for leaf in &leaves {
            nodes[leaf.node] = TreeNode::Leaf {
                value: self.leaf_output(leaf.sum_g, leaf.sum_h) * p.learning_rate,
            };
        }

        Tree { nodes }
    }

    fn with_best_split(
        &self,
        mut leaf: LeafState,
        binned: &BinnedMatrix,
        features: &[usize],
        grads: &[f64],
        hess: &[f64],
    ) -> LeafState {
        let depth_ok = self.params.max_depth <= 0 || (leaf.depth as i32) < self.params.max_depth;
        if depth_ok {
            leaf.best = self.find_best_split(&leaf, binned, features, grads, hess);
        }
        leaf
    }

    fn find_best_split(
        &self,
        leaf: &LeafState,
        binned: &BinnedMatrix,
        features: &[usize],
        grads: &[f64],
        hess: &[f64],
    ) -> Option<SplitCandidate> {
        let min_child = self.params.min_child_samples.max(1);
        if leaf.rows.len() < 2 * min_child {
            return None;
        }

        let parent_score = self.score(leaf.sum_g, leaf.sum_h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let n_bins = binned.edges[feature].len() + 1;
            if n_bins < 2 {
                continue;
            }

            let mut hist = vec![(0.0f64, 0.0f64, 0usize); n_bins];
            let bins = &binned.bins[feature];
            for &r in &leaf.rows {
                let slot = &mut hist[usize::from(bins[r])];
                slot.0 += grads[r];
                slot.1 += hess[r];
                slot.2 += 1;
            }

            let (mut gl, mut hl, mut cl) = (0.0, 0.0, 0usize);
            for (bin, (g, h, c)) in hist.iter().enumerate().take(n_bins - 1) {
                gl += g;
                hl += h;
                cl += c;
                let cr = leaf.rows.len() - cl;
                if cl < min_child || cr < min_child {
                    continue;
                }
                let gr = leaf.sum_g - gl;
                let hr = leaf.sum_h - hl;
                if hl < MIN_SUM_HESSIAN || hr < MIN_SUM_HESSIAN {
                    continue;
                }

                let gain = self.score(gl, hl) + self.score(gr, hr) - parent_score;
                if gain > MIN_SPLIT_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }

    fn l1_threshold(&self, g: f64) -> f64 {
        let alpha = self.params.reg_alpha;
        if g > alpha {
            g - alpha
        } else if g < -alpha {
            g + alpha
        } else {
            0.0
        }
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let t = self.l1_threshold(g);
        t * t / (h + self.params.reg_lambda)
    }

    fn leaf_output(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.l1_threshold(g) / denom
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

#[derive(Debug)]
struct LeafState {
    rows: Vec<usize>,
    depth: usize,
    node: usize,
    sum_g: f64,
    sum_h: f64,
    best: Option<SplitCandidate>,
}

impl LeafState {
    fn new(rows: Vec<usize>, depth: usize, node: usize, grads: &[f64], hess: &[f64]) -> Self {
        let sum_g = rows.iter().map(|r| grads[*r]).sum();
        let sum_h = rows.iter().map(|r| hess[*r]).sum();
        Self {
            rows,
            depth,
            node,
            sum_g,
            sum_h,
            best: None,
        }
    }
}

/// 피처별 bin 경계와 이산화된 값.
struct BinnedMatrix {
    /// 피처별 오름차순 경계. `x <= edges[k]`인 가장 작은 k가 bin 번호
    edges: Vec<Vec<f64>>,
    /// `bins[feature][row]`
    bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn build(x: &[Vec<f64>], n_features: usize, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, usize::from(u16::MAX));
        let mut edges = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let column: Vec<f64> = x
                .iter()
                .map(|r| if r[f].is_finite() { r[f] } else { 0.0 })
                .collect();
            let feature_edges = bin_edges(&column, max_bin);
            let feature_bins = column
                .iter()
                .map(|v| feature_edges.partition_point(|e| e < v) as u16)
                .collect();
            edges.push(feature_edges);
            bins.push(feature_bins);
        }

        Self { edges, bins }
    }
}

fn bin_edges(column: &[f64], max_bin: usize) -> Vec<f64> {
    let mut sorted = column.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut unique = sorted.clone();
    unique.dedup();

    if unique.len() <= 1 {
        return Vec::new();
    }

    if unique.len() <= max_bin {
        return unique.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    // 분위수 경계 (마지막 값은 항상 마지막 bin에 남도록 제외)
    let n = sorted.len();
    let last = sorted[n - 1];
    let mut edges: Vec<f64> = (1..max_bin)
        .map(|j| sorted[(j * n / max_bin).min(n - 1)])
        .filter(|e| *e < last)
        .collect();
    edges.dedup();
    edges
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
