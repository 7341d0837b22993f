//! 基础模型: 带样本权重的随机森林、在线线性分类器、训练流程与模型缓存.

mod forest;
mod online;
mod store;
mod trainer;
mod tree;

pub use forest::{ForestConfig, RandomForest};
pub use online::PassiveAggressive;
pub use store::{ModelKey, ModelStore, Stage};
pub use trainer::{class_balance_weights, train, ClassFrequencies, TrainOptions};
pub use tree::DecisionTree;

use ndarray::{Array2, ArrayView1, ArrayView2};

/// 概率输出的多类分类器.
///
/// `predict_proba` 的第 `k` 列对应 `classes()[k]`; 每行之和为 1.
pub trait Classifier: Sync {
    /// 模型类别 (标签值), 升序.
    fn classes(&self) -> &[u8];

    /// 特征维数.
    fn n_features(&self) -> usize;

    /// 预测每个样本属于各类别的概率, 形状 `(n, n_classes)`.
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32>;

    /// 类别个数.
    #[inline]
    fn n_classes(&self) -> usize {
        self.classes().len()
    }

    /// 按最大概率预测标签. 平局时取靠前的类别.
    fn predict(&self, x: ArrayView2<'_, f32>) -> Vec<u8> {
        let classes = self.classes();
        self.predict_proba(x)
            .outer_iter()
            .map(|row| classes[argmax(row)])
            .collect()
    }

    /// 每个样本属于标签 `label` 的概率. 模型没有该类别时全为 0.
    fn proba_of(&self, x: ArrayView2<'_, f32>, label: u8) -> Vec<f32> {
        match self.classes().iter().position(|c| *c == label) {
            Some(k) => self.predict_proba(x).column(k).to_vec(),
            None => vec![0.0; x.nrows()],
        }
    }

    /// 特征重要性 (和为 1). 不支持时返回 `None`.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// 最大值所在下标, 平局时取第一个. 空数组返回 0.
pub fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best
}

/// 把标签映射为 `classes` 中的下标.
pub(crate) fn class_indices(labels: &[u8], classes: &[u8]) -> crate::CascadeResult<Vec<usize>> {
    let mut lut = [usize::MAX; 256];
    for (k, &c) in classes.iter().enumerate() {
        lut[c as usize] = k;
    }
    labels
        .iter()
        .map(|&l| match lut[l as usize] {
            usize::MAX => Err(crate::CascadeError::InvalidConfig(format!(
                "label {l} is not one of the model classes {classes:?}"
            ))),
            k => Ok(k),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax(array![0.2f32, 0.4, 0.4].view()), 1);
        assert_eq!(argmax(array![0.5f32, 0.5].view()), 0);
    }

    #[test]
    fn test_class_indices() {
        assert_eq!(class_indices(&[4, 1, 2], &[1, 2, 3, 4]).unwrap(), vec![3, 0, 1]);
        assert!(class_indices(&[0], &[1, 2, 3, 4]).is_err());
    }
}
