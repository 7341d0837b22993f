//! Passive-aggressive (PA-I) 一对多线性分类器, 支持逐批增量训练.

use super::{class_indices, Classifier};
use crate::consts::SEED;
use crate::error::ensure_len;
use crate::CascadeResult;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// PA-I 线性分类器. 每个类别一个 "该类 vs. 其余" 的超平面.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassiveAggressive {
    classes: Vec<u8>,
    weights: Array2<f32>,
    bias: Array1<f32>,
    c: f32,
    epochs: usize,
    seed: u64,
}

impl PassiveAggressive {
    /// 创建零初始化的模型. 默认激进度 `C = 1`, `fit` 遍历数据 5 轮.
    pub fn new(classes: &[u8], n_features: usize) -> Self {
        Self {
            classes: classes.to_vec(),
            weights: Array2::zeros((classes.len(), n_features)),
            bias: Array1::zeros(classes.len()),
            c: 1.0,
            epochs: 5,
            seed: SEED,
        }
    }

    /// 清零参数后, 以随机顺序遍历数据若干轮.
    pub fn fit(&mut self, x: ArrayView2<'_, f32>, y: &[u8]) -> CascadeResult<()> {
        let yk = self.check(x, y)?;
        self.weights.fill(0.0);
        self.bias.fill(0.0);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..yk.len()).collect();
        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            order.iter().for_each(|&i| self.update(x.row(i), yk[i]));
        }
        Ok(())
    }

    /// 在现有参数上按顺序遍历数据一轮.
    pub fn partial_fit(&mut self, x: ArrayView2<'_, f32>, y: &[u8]) -> CascadeResult<()> {
        let yk = self.check(x, y)?;
        for (row, k) in x.outer_iter().zip(yk) {
            self.update(row, k);
        }
        Ok(())
    }

    fn check(&self, x: ArrayView2<'_, f32>, y: &[u8]) -> CascadeResult<Vec<usize>> {
        ensure_len("labels", x.nrows(), y.len())?;
        ensure_len("feature columns", self.weights.ncols(), x.ncols())?;
        class_indices(y, &self.classes)
    }

    fn update(&mut self, row: ArrayView1<'_, f32>, k: usize) {
        let sq_norm = row.dot(&row) + 1.0;
        for (c, (mut w, b)) in self
            .weights
            .outer_iter_mut()
            .zip(self.bias.iter_mut())
            .enumerate()
        {
            let t = if c == k { 1.0 } else { -1.0 };
            let loss = 1.0 - t * (w.dot(&row) + *b);
            if loss > 0.0 {
                let tau = (loss / sq_norm).min(self.c);
                w.scaled_add(tau * t, &row);
                *b += tau * t;
            }
        }
    }

    /// 各类别的决策函数值, 形状 `(n, n_classes)`.
    pub fn decision_function(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut ans = x.dot(&self.weights.t());
        ans += &self.bias.view().insert_axis(Axis(0));
        ans
    }
}

impl Classifier for PassiveAggressive {
    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    /// 对决策函数值做 softmax.
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut ans = self.decision_function(x);
        for mut row in ans.outer_iter_mut() {
            let max = row.fold(f32::NEG_INFINITY, |a, b| a.max(*b));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        ans
    }
}
