//! 带样本权重的 CART 分类树 (Gini 不纯度).
//!
//! 节点以扁平数组保存, 下标 0 为根. 叶节点保存类别概率 (按权重计),
//! 以便森林对概率取平均.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        proba: Vec<f32>,
    },
}

/// 单棵树的生长参数.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

struct Candidate {
    feature: usize,
    threshold: f32,
    gain: f64,
}

struct Frame {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

/// 决策树分类器.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// 在 `samples` 指定的样本上生长一棵树.
    ///
    /// `y[i]` 为类别下标, `w[i]` 为样本的有效权重 (bootstrap 次数乘以样本权重).
    /// `samples` 中的样本权重必须为正.
    pub(crate) fn fit(
        x: ArrayView2<'_, f32>,
        y: &[usize],
        w: &[f64],
        n_classes: usize,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { proba: Vec::new() }];
        let mut importances = vec![0.0; x.ncols()];
        let mut stack = vec![Frame {
            node: 0,
            samples,
            depth: 0,
        }];

        while let Some(Frame {
            node,
            samples,
            depth,
        }) = stack.pop()
        {
            let hist = class_weights(y, w, &samples, n_classes);
            let growable = depth < params.max_depth
                && samples.len() >= params.min_samples_split
                && hist.iter().filter(|c| **c > 0.0).count() > 1;
            let split = if growable {
                best_split(x, y, w, &samples, &hist, params, rng)
            } else {
                None
            };

            match split {
                Some(c) => {
                    importances[c.feature] += c.gain;
                    let (l, r): (Vec<usize>, Vec<usize>) = samples
                        .iter()
                        .partition(|&&i| x[(i, c.feature)] <= c.threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { proba: Vec::new() });
                    nodes.push(Node::Leaf { proba: Vec::new() });
                    nodes[node] = Node::Split {
                        feature: c.feature,
                        threshold: c.threshold,
                        left,
                        right,
                    };
                    stack.push(Frame {
                        node: right,
                        samples: r,
                        depth: depth + 1,
                    });
                    stack.push(Frame {
                        node: left,
                        samples: l,
                        depth: depth + 1,
                    });
                }
                None => nodes[node] = Node::Leaf { proba: to_proba(&hist) },
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        Self { nodes, importances }
    }

    /// 单个样本落入的叶节点的类别概率.
    pub fn predict_row(&self, row: ArrayView1<'_, f32>) -> &[f32] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// 归一化的不纯度下降特征重要性. 树只有根节点时全为 0.
    #[inline]
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// 叶节点个数.
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

fn class_weights(y: &[usize], w: &[f64], samples: &[usize], n_classes: usize) -> Vec<f64> {
    let mut ans = vec![0.0; n_classes];
    for &i in samples {
        ans[y[i]] += w[i];
    }
    ans
}

fn to_proba(hist: &[f64]) -> Vec<f32> {
    let total: f64 = hist.iter().sum();
    if total > 0.0 {
        hist.iter().map(|c| (c / total) as f32).collect()
    } else {
        vec![1.0 / hist.len() as f32; hist.len()]
    }
}

/// `Σ h_k² / W`. 加权 Gini 不纯度为 `W - sq_over_total`.
#[inline]
fn sq_over_total(hist: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        hist.iter().map(|c| c * c).sum::<f64>() / total
    }
}

/// 在随机选取的至少 `max_features` 个非常数特征上, 按排序扫描寻找不纯度下降最大的划分.
/// 增益相同时保留先找到的划分.
fn best_split(
    x: ArrayView2<'_, f32>,
    y: &[usize],
    w: &[f64],
    samples: &[usize],
    hist: &[f64],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<Candidate> {
    let n_features = x.ncols();
    let total: f64 = hist.iter().sum();
    let parent = sq_over_total(hist, total);
    let mut best: Option<Candidate> = None;
    let mut sorted = samples.to_vec();

    // 按随机顺序考察特征, 常数特征不计入 `max_features`.
    let mut visited = 0;
    for feature in index::sample(rng, n_features, n_features).into_iter() {
        if visited >= params.max_features && best.is_some() {
            break;
        }
        sorted.sort_by(|&a, &b| x[(a, feature)].total_cmp(&x[(b, feature)]));
        if x[(sorted[0], feature)] == x[(sorted[sorted.len() - 1], feature)] {
            continue;
        }
        visited += 1;
        let mut left = vec![0.0; hist.len()];
        let mut left_total = 0.0;
        for (p, pair) in sorted.windows(2).enumerate() {
            let (i, next) = (pair[0], pair[1]);
            left[y[i]] += w[i];
            left_total += w[i];
            let (a, b) = (x[(i, feature)], x[(next, feature)]);
            let n_left = p + 1;
            if a == b || n_left < params.min_samples_leaf || sorted.len() - n_left < params.min_samples_leaf {
                continue;
            }
            let right: Vec<f64> = hist.iter().zip(&left).map(|(h, l)| h - l).collect();
            let gain = sq_over_total(&left, left_total) + sq_over_total(&right, total - left_total) - parent;
            if gain > best.as_ref().map_or(1e-12, |c| c.gain) {
                let mid = a + (b - a) / 2.0;
                best = Some(Candidate {
                    feature,
                    threshold: if mid < b { mid } else { a },
                    gain,
                });
            }
        }
    }
    best
}
