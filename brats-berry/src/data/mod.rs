//! 数据接口: 患者体素批次、多患者拼接、数据提供者与三维标签体积.

mod bounds;
mod npz;
mod phantom;
mod provider;
mod volume;

pub use bounds::{concat_with_bounds, PatientBounds};
pub use npz::NpzProvider;
pub use phantom::PhantomProvider;
pub use provider::{DataProvider, FeatureVariant, LoadSpec};
pub use volume::{Area3d, LabelVolume};

use crate::consts::label::is_tumor;
use crate::error::ensure_len;
use crate::{CascadeError, CascadeResult, Idx3d};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use std::path::{Path, PathBuf};

/// 单个患者的体素样本.
///
/// `features` 的第 `i` 行、`labels[i]` 与 `coords[i]` 描述同一个体素.
/// 三者长度一致且坐标均位于 `dims` 内, 这由 [`PatientBatch::new`] 保证.
#[derive(Debug, Clone)]
pub struct PatientBatch {
    /// 患者编号.
    pub id: u32,

    /// 特征矩阵, 形状 `(n, d)`.
    pub features: Array2<f32>,

    /// 体素标签, 取值 `0..=4`.
    pub labels: Vec<u8>,

    /// 体素坐标.
    pub coords: Vec<Idx3d>,

    /// 体积尺寸.
    pub dims: Idx3d,
}

impl PatientBatch {
    /// 构造并检查形状.
    pub fn new(
        id: u32,
        features: Array2<f32>,
        labels: Vec<u8>,
        coords: Vec<Idx3d>,
        dims: Idx3d,
    ) -> CascadeResult<Self> {
        let n = features.nrows();
        ensure_len("labels", n, labels.len())?;
        ensure_len("coordinates", n, coords.len())?;
        let (z, h, w) = dims;
        if let Some(i) = coords
            .iter()
            .position(|&(z0, h0, w0)| z0 >= z || h0 >= h || w0 >= w)
        {
            return Err(CascadeError::CoordOutOfBounds(i));
        }
        Ok(Self {
            id,
            features,
            labels,
            coords,
            dims,
        })
    }

    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// 是否不含任何体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 特征维数.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// 真实肿瘤体素个数.
    pub fn tumor_voxels(&self) -> usize {
        self.labels.iter().filter(|p| is_tumor(**p)).count()
    }

    /// 按体素子集保留样本 (顺序不变).
    pub fn retain(self, keep: &[usize]) -> CascadeResult<Self> {
        let features = self.features.select(Axis(0), keep);
        let labels = keep.iter().map(|&i| self.labels[i]).collect();
        let coords = keep.iter().map(|&i| self.coords[i]).collect();
        Self::new(self.id, features, labels, coords, self.dims)
    }
}

/// 多个患者按顺序拼接后的样本.
#[derive(Debug, Clone)]
pub struct Cohort {
    /// 患者编号, 与 `bounds` 中的患者一一对应.
    pub ids: Vec<u32>,

    /// 拼接后的特征矩阵.
    pub features: Array2<f32>,

    /// 拼接后的标签.
    pub labels: Vec<u8>,

    /// 拼接后的坐标.
    pub coords: Vec<Idx3d>,

    /// 每个患者的体积尺寸.
    pub dims: Vec<Idx3d>,

    /// 患者下标边界.
    pub bounds: PatientBounds,
}

impl Cohort {
    /// 按输入顺序拼接患者批次. 各患者特征维数必须一致.
    pub fn concat(batches: Vec<PatientBatch>) -> CascadeResult<Self> {
        let n_features = batches.first().map_or(0, PatientBatch::n_features);
        for b in batches.iter() {
            ensure_len("feature columns", n_features, b.n_features())?;
        }
        let views: Vec<ArrayView2<f32>> = batches.iter().map(|b| b.features.view()).collect();
        let features = if views.is_empty() {
            Array2::zeros((0, 0))
        } else {
            concatenate(Axis(0), &views).map_err(|_| {
                CascadeError::InvalidConfig("cannot concatenate feature matrices".into())
            })?
        };
        let (labels, bounds) = concat_with_bounds(&batches.iter().map(|b| &b.labels[..]).collect::<Vec<_>>());
        let (coords, _) = concat_with_bounds(&batches.iter().map(|b| &b.coords[..]).collect::<Vec<_>>());
        Ok(Self {
            ids: batches.iter().map(|b| b.id).collect(),
            dims: batches.iter().map(|b| b.dims).collect(),
            features,
            labels,
            coords,
            bounds,
        })
    }

    /// 样本总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// 是否不含任何样本?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 患者个数.
    #[inline]
    pub fn n_patients(&self) -> usize {
        self.bounds.n_patients()
    }
}

/// 统计标签直方图. 下标即标签值, 超出 `0..=4` 的标签被忽略.
pub fn label_histogram(labels: &[u8]) -> [u64; 5] {
    let mut ans = [0; 5];
    for &l in labels {
        if let Some(c) = ans.get_mut(l as usize) {
            *c += 1;
        }
    }
    ans
}

/// 各患者中真实肿瘤体素个数的最小值. 没有患者时返回 `None`.
pub fn min_tumor_voxels(labels: &[u8], bounds: &PatientBounds) -> Option<usize> {
    bounds
        .ranges()
        .map(|r| labels[r].iter().filter(|p| is_tumor(**p)).count())
        .min()
}

/// 返回 `$HOME/dataset/{it...}`. 无法确定用户主目录时返回 `None`.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}
