//! 随机森林: bootstrap 采样 + 每次划分随机选取特征子集, 对树的叶节点概率取平均.

use super::tree::{DecisionTree, TreeParams};
use super::{argmax, class_indices, Classifier};
use crate::consts::{N_TREES, SEED};
use crate::error::ensure_len;
use crate::{CascadeError, CascadeResult};
use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 森林超参数.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// 树的棵数.
    pub n_trees: usize,

    /// 最大深度. `None` 表示不限.
    pub max_depth: Option<usize>,

    /// 内部节点至少包含的样本数.
    pub min_samples_split: usize,

    /// 叶节点至少包含的样本数.
    pub min_samples_leaf: usize,

    /// 每次划分考察的特征数. `None` 表示 `sqrt(n_features)`.
    pub max_features: Option<usize>,

    /// 随机种子. 第 `t` 棵树的种子由 `(seed, t)` 导出.
    pub seed: u64,

    /// 并行训练的工作线程数. `0` 表示由 `rayon` 决定.
    pub workers: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: N_TREES,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: SEED,
            workers: 0,
        }
    }
}

/// 第 `t` 棵树的种子. 与调度顺序无关.
#[inline]
fn tree_seed(seed: u64, t: usize) -> u64 {
    seed ^ (t as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// 随机森林分类器.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    classes: Vec<u8>,
    n_features: usize,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
    oob_score: Option<f64>,
}

struct Grown {
    tree: DecisionTree,
    in_bag: Vec<bool>,
}

impl RandomForest {
    /// 训练.
    ///
    /// `classes` 显式给出模型类别 (升序), `y` 中的每个标签都必须属于其中;
    /// 样本中未出现的类别也会占据一列, 其概率恒为 0.
    /// `weights` 为 `None` 时所有样本权重为 1.
    ///
    /// # 错误
    ///
    /// 1. 特征行数与标签或权重长度不一致: [`CascadeError::ShapeMismatch`];
    /// 2. 权重不是正的有限实数: [`CascadeError::InvalidWeight`];
    /// 3. 没有样本或没有特征: [`CascadeError::EmptyTrainingSet`];
    /// 4. 标签不属于 `classes`, 或 `n_trees` 为 0: [`CascadeError::InvalidConfig`].
    pub fn fit(
        x: ArrayView2<'_, f32>,
        y: &[u8],
        weights: Option<&[f64]>,
        classes: &[u8],
        config: &ForestConfig,
    ) -> CascadeResult<Self> {
        let (n, d) = x.dim();
        ensure_len("labels", n, y.len())?;
        if let Some(w) = weights {
            ensure_len("sample weights", n, w.len())?;
            if let Some(i) = w.iter().position(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(CascadeError::InvalidWeight(i));
            }
        }
        if n == 0 || d == 0 {
            return Err(CascadeError::EmptyTrainingSet);
        }
        if config.n_trees == 0 {
            return Err(CascadeError::InvalidConfig("a forest needs at least one tree".into()));
        }
        let yk = class_indices(y, classes)?;
        let params = TreeParams {
            max_depth: config.max_depth.unwrap_or(usize::MAX),
            min_samples_split: config.min_samples_split.max(2),
            min_samples_leaf: config.min_samples_leaf.max(1),
            max_features: config
                .max_features
                .unwrap_or_else(|| (d as f64).sqrt() as usize)
                .clamp(1, d),
        };

        let grow = |t: usize| -> Grown {
            let mut rng = StdRng::seed_from_u64(tree_seed(config.seed, t));
            let mut counts = vec![0u32; n];
            for _ in 0..n {
                counts[rng.gen_range(0..n)] += 1;
            }
            let w: Vec<f64> = counts
                .iter()
                .enumerate()
                .map(|(i, &c)| f64::from(c) * weights.map_or(1.0, |w| w[i]))
                .collect();
            let samples = (0..n).filter(|&i| counts[i] > 0).collect();
            let tree = DecisionTree::fit(x, &yk, &w, classes.len(), samples, &params, &mut rng);
            Grown {
                tree,
                in_bag: counts.into_iter().map(|c| c > 0).collect(),
            }
        };

        let grown: Vec<Grown> = grow_all(config, grow)?;

        let mut importances = vec![0.0; d];
        for g in grown.iter() {
            importances
                .iter_mut()
                .zip(g.tree.importances())
                .for_each(|(a, b)| *a += b);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        let oob_score = oob_accuracy(x, &yk, classes.len(), &grown);
        if let Some(s) = oob_score {
            debug!("OOB accuracy: {:.2}%", s * 100.0);
        }

        Ok(Self {
            classes: classes.to_vec(),
            n_features: d,
            trees: grown.into_iter().map(|g| g.tree).collect(),
            importances,
            oob_score,
        })
    }

    /// 树的棵数.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// 袋外样本准确率. 没有任何样本落在袋外时为 `None`.
    #[inline]
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 在固定线程数的线程池上并行生长所有树, 按树的下标收集结果.
        fn grow_all<F>(config: &ForestConfig, grow: F) -> CascadeResult<Vec<Grown>>
        where
            F: Fn(usize) -> Grown + Sync + Send,
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .build()
                .map_err(|e| CascadeError::InvalidConfig(format!("cannot build thread pool: {e}")))?;
            Ok(pool.install(|| (0..config.n_trees).into_par_iter().map(grow).collect()))
        }
    } else {
        fn grow_all<F>(config: &ForestConfig, grow: F) -> CascadeResult<Vec<Grown>>
        where
            F: Fn(usize) -> Grown,
        {
            Ok((0..config.n_trees).map(grow).collect())
        }
    }
}

/// 用不包含该样本的树投票, 统计袋外准确率.
fn oob_accuracy(x: ArrayView2<'_, f32>, yk: &[usize], n_classes: usize, grown: &[Grown]) -> Option<f64> {
    let mut acc = vec![0.0f32; n_classes];
    let (mut hit, mut seen) = (0usize, 0usize);
    for (i, row) in x.outer_iter().enumerate() {
        acc.iter_mut().for_each(|v| *v = 0.0);
        let mut voted = false;
        for g in grown.iter().filter(|g| !g.in_bag[i]) {
            acc.iter_mut()
                .zip(g.tree.predict_row(row))
                .for_each(|(a, p)| *a += p);
            voted = true;
        }
        if voted {
            seen += 1;
            hit += usize::from(argmax(ndarray::ArrayView1::from(&acc[..])) == yk[i]);
        }
    }
    (seen > 0).then(|| hit as f64 / seen as f64)
}

impl Classifier for RandomForest {
    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut ans = Array2::zeros((x.nrows(), self.classes.len()));
        let scale = 1.0 / self.trees.len() as f32;
        for (row, mut out) in x.outer_iter().zip(ans.outer_iter_mut()) {
            for tree in self.trees.iter() {
                out.iter_mut()
                    .zip(tree.predict_row(row))
                    .for_each(|(a, p)| *a += p * scale);
            }
        }
        ans
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// 两簇数据: 第 0 个特征决定标签, 第 1 个特征是常数.
    fn blobs(n: usize) -> (Array2<f32>, Vec<u8>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
            0 if i % 2 == 0 => (i % 7) as f32,
            0 => 20.0 + (i % 5) as f32,
            _ => 1.0,
        });
        let y = (0..n).map(|i| if i % 2 == 0 { 0 } else { 2 }).collect();
        (x, y)
    }

    #[test]
    fn test_fit_predict() {
        let (x, y) = blobs(40);
        let cfg = ForestConfig {
            n_trees: 5,
            ..Default::default()
        };
        let f = RandomForest::fit(x.view(), &y, None, &[0, 1, 2], &cfg).unwrap();
        assert_eq!(f.n_classes(), 3);
        assert_eq!(f.predict(x.view()), y);

        let p = f.predict_proba(x.view());
        assert!(p.outer_iter().all(|r| f64_eq(r.sum() as f64, 1.0)));
        assert!(p.column(1).iter().all(|v| *v == 0.0));
        assert_eq!(f.proba_of(x.view(), 3), vec![0.0; 40]);

        let imp = f.feature_importances().unwrap();
        assert!(f64_eq(imp[0], 1.0));
        assert_eq!(f.oob_score(), Some(1.0));
    }

    #[test]
    fn test_seed_determinism() {
        let (x, y) = blobs(30);
        let cfg = ForestConfig {
            n_trees: 4,
            workers: 2,
            ..Default::default()
        };
        let w: Vec<f64> = (0..30).map(|i| 1.0 + i as f64).collect();
        let a = RandomForest::fit(x.view(), &y, Some(&w), &[0, 2], &cfg).unwrap();
        let b = RandomForest::fit(x.view(), &y, Some(&w), &[0, 2], &cfg).unwrap();
        assert_eq!(a.predict_proba(x.view()), b.predict_proba(x.view()));
    }

    #[test]
    fn test_fail_fast() {
        let (x, y) = blobs(10);
        let cfg = ForestConfig::default();
        assert!(matches!(
            RandomForest::fit(x.view(), &y[..9], None, &[0, 2], &cfg),
            Err(CascadeError::ShapeMismatch("labels", 10, 9))
        ));
        let mut w = vec![1.0; 10];
        w[3] = f64::NAN;
        assert!(matches!(
            RandomForest::fit(x.view(), &y, Some(&w), &[0, 2], &cfg),
            Err(CascadeError::InvalidWeight(3))
        ));
        w[3] = 0.0;
        assert!(matches!(
            RandomForest::fit(x.view(), &y, Some(&w), &[0, 2], &cfg),
            Err(CascadeError::InvalidWeight(3))
        ));
        assert!(matches!(
            RandomForest::fit(x.view(), &y, None, &[0, 1], &cfg),
            Err(CascadeError::InvalidConfig(_))
        ));
    }
}
