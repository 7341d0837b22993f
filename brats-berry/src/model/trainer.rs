//! 基础模型训练流程与类别平衡权重.

use super::{Classifier, ForestConfig, ModelKey, ModelStore, RandomForest};
use crate::consts::label::{BACKGROUND, EDEMA, ENHANCING, NECROSIS, NON_ENHANCING};
use crate::CascadeResult;
use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// [`train`] 的可选参数.
#[derive(Debug, Clone, Copy)]
pub struct TrainOptions<'a> {
    /// 森林超参数.
    pub config: &'a ForestConfig,

    /// 样本权重. `None` 表示不加权.
    pub weights: Option<&'a [f64]>,

    /// 训练完成后写入的缓存位置.
    pub cache: Option<(&'a ModelStore, &'a ModelKey)>,
}

impl<'a> TrainOptions<'a> {
    /// 不加权、不缓存.
    pub fn new(config: &'a ForestConfig) -> Self {
        Self {
            config,
            weights: None,
            cache: None,
        }
    }

    /// 设置样本权重.
    pub fn with_weights(mut self, weights: Option<&'a [f64]>) -> Self {
        self.weights = weights;
        self
    }

    /// 设置缓存位置.
    pub fn with_cache(mut self, store: &'a ModelStore, key: &'a ModelKey) -> Self {
        self.cache = Some((store, key));
        self
    }
}

/// 训练随机森林.
///
/// 训练后按重要性降序把特征排名写入日志; 给定缓存位置时把模型存盘,
/// 存盘失败只记录警告.
///
/// # 错误
///
/// 见 [`RandomForest::fit`]. 所有形状与权重检查在训练开始前完成.
pub fn train(
    x: ArrayView2<'_, f32>,
    y: &[u8],
    classes: &[u8],
    opts: TrainOptions<'_>,
) -> CascadeResult<RandomForest> {
    let t0 = Instant::now();
    info!(
        "Training a forest of {} trees on {} samples x {} features, classes {:?}",
        opts.config.n_trees,
        x.nrows(),
        x.ncols(),
        classes
    );
    let model = RandomForest::fit(x, y, opts.weights, classes, opts.config)?;

    if let Some(imp) = model.feature_importances() {
        let ranking: Vec<usize> = (0..imp.len())
            .sorted_by(|&a, &b| imp[b].total_cmp(&imp[a]))
            .collect();
        info!("Features by importance: {ranking:?}");
        debug!(
            "Importances: [{}]",
            ranking.iter().map(|&i| format!("{:.4}", imp[i])).join(", ")
        );
    }
    if let Some(s) = model.oob_score() {
        info!("OOB score: {:.2}%", s * 100.0);
    }

    if let Some((store, key)) = opts.cache {
        match store.save(key, &model) {
            Ok(p) => info!("Saved {} to {}", key.stage.name(), p.display()),
            Err(e) => warn!("Cannot cache {}: {e}", key.stage.name()),
        }
    }
    info!("Training/loading took {:.2} seconds", t0.elapsed().as_secs_f64());
    Ok(model)
}

/// 整个数据集上各标签的体素个数, 下标即标签值.
///
/// 用于计算类别平衡权重: 样本中各类的比例被调整为与整个数据集一致.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFrequencies {
    /// 各标签体素个数.
    pub counts: [u64; 5],
}

impl ClassFrequencies {
    /// 以标签计数初始化.
    pub fn from_counts(counts: [u64; 5]) -> Self {
        Self { counts }
    }

    /// 第一阶段的类别分组: 背景 / 肿瘤.
    pub fn detection_groups() -> Vec<Vec<u8>> {
        vec![vec![BACKGROUND], vec![NECROSIS, EDEMA, NON_ENHANCING, ENHANCING]]
    }

    /// 第二阶段的类别分组: 四个子区域各自一组.
    pub fn subtyping_groups() -> Vec<Vec<u8>> {
        vec![vec![NECROSIS], vec![EDEMA], vec![NON_ENHANCING], vec![ENHANCING]]
    }

    /// 单阶段模型的类别分组: 五个标签各自一组.
    pub fn single_stage_groups() -> Vec<Vec<u8>> {
        (BACKGROUND..=ENHANCING).map(|l| vec![l]).collect()
    }

    /// 各分组在整个数据集中的比例.
    pub fn global(&self, groups: &[Vec<u8>]) -> Vec<f64> {
        let sums: Vec<u64> = groups
            .iter()
            .map(|g| g.iter().map(|&l| self.counts.get(l as usize).copied().unwrap_or(0)).sum())
            .collect();
        normalize(&sums)
    }

    /// 按分组计算 `labels` 的类别平衡权重, 并记录两种比例.
    pub fn weights(&self, labels: &[u8], groups: &[Vec<u8>]) -> Vec<f64> {
        let global = self.global(groups);
        let sample = group_frequencies(labels, groups);
        info!("Class frequencies: {}", percent(&global));
        info!("Sample frequencies: {}", percent(&sample));
        class_balance_weights(labels, groups, &global)
    }
}

fn normalize(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    counts
        .iter()
        .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
        .collect()
}

fn percent(freqs: &[f64]) -> String {
    freqs.iter().map(|f| format!("{:.2}%", f * 100.0)).join(" ")
}

/// `labels` 中各分组的比例. 不属于任何分组的标签不计入.
pub fn group_frequencies(labels: &[u8], groups: &[Vec<u8>]) -> Vec<f64> {
    let mut counts = vec![0u64; groups.len()];
    for &l in labels {
        if let Some(k) = groups.iter().position(|g| g.contains(&l)) {
            counts[k] += 1;
        }
    }
    normalize(&counts)
}

/// 类别平衡权重: 属于分组 `k` 的样本权重为 `global_freqs[k] / sample_freq(k)`.
///
/// 两种比例任一为 0 的分组, 以及不属于任何分组的样本, 权重为 1.
pub fn class_balance_weights(labels: &[u8], groups: &[Vec<u8>], global_freqs: &[f64]) -> Vec<f64> {
    let sample = group_frequencies(labels, groups);
    let per_group: Vec<f64> = sample
        .iter()
        .zip(global_freqs)
        .map(|(&s, &g)| if s > 0.0 && g > 0.0 { g / s } else { 1.0 })
        .collect();
    labels
        .iter()
        .map(|l| {
            groups
                .iter()
                .position(|g| g.contains(l))
                .map_or(1.0, |k| per_group[k])
        })
        .collect()
}
