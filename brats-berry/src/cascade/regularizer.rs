use crate::post_proc::{build_proximity_graph, close_labels, smooth_labels, PotentialMatrix};
use crate::{CascadeResult, Idx3d};
use ndarray::ArrayView2;

/// 子区域分类之后的空间正则化方式.
#[derive(Debug, Clone, PartialEq)]
pub enum Regularizer {
    /// 在肿瘤体素的邻近图上以成对势函数平滑标签.
    Smoothing(PotentialMatrix),

    /// 对肿瘤体素再做一次逐标签闭运算 (不去除分量).
    Closing {
        /// 结构元半径.
        radius: usize,
    },
}

impl Regularizer {
    /// 方法名, 用于图片文件名与日志.
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::Smoothing(_) => "MRF",
            Self::Closing { .. } => "closing",
        }
    }

    /// 对肿瘤体素的子区域标签做正则化.
    ///
    /// `coords`, `labels` 与 `proba` 的行一一对应, `classes` 为 `proba` 各列对应的标签.
    pub fn apply(
        &self,
        coords: &[Idx3d],
        dims: Idx3d,
        labels: &[u8],
        proba: ArrayView2<'_, f32>,
        classes: &[u8],
    ) -> CascadeResult<Vec<u8>> {
        match self {
            Self::Smoothing(potential) => {
                let edges = build_proximity_graph(coords);
                let k = smooth_labels(proba, &edges, potential)?;
                Ok(k.into_iter().map(|k| classes[k]).collect())
            }
            Self::Closing { radius } => close_labels(coords, dims, labels, *radius),
        }
    }
}
