//! 数据提供者接口与通用的读取后处理 (降采样分辨率、体素采样).

use super::{label_histogram, Cohort, PatientBatch};
use crate::consts::SEED;
use crate::{CascadeError, CascadeResult};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// 特征变体.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureVariant {
    /// 基础特征.
    #[default]
    Base,

    /// 基础特征 + 梯度方向直方图特征.
    Hog,
}

impl FeatureVariant {
    /// 对应的 npz 数组名.
    pub const fn array_name(&self) -> &'static str {
        match self {
            Self::Base => "features.npy",
            Self::Hog => "features_hog.npy",
        }
    }

    /// 模型文件名后缀.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Base => "",
            Self::Hog => "_hog",
        }
    }
}

/// 读取患者数据的方式.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSpec {
    /// 每患者最多保留的体素个数. `None` 表示保留全部.
    pub voxel_cap: Option<usize>,

    /// 空间降采样步长, 至少为 1.
    pub resolution: usize,

    /// 特征变体.
    pub variant: FeatureVariant,

    /// 采样时是否在各标签间均分名额.
    pub stratified: bool,

    /// 采样随机种子. 实际种子还会混入患者编号.
    pub seed: u64,
}

impl Default for LoadSpec {
    fn default() -> Self {
        Self::full()
    }
}

impl LoadSpec {
    /// 读取全部体素.
    pub fn full() -> Self {
        Self {
            voxel_cap: None,
            resolution: 1,
            variant: FeatureVariant::Base,
            stratified: false,
            seed: SEED,
        }
    }

    /// 每患者最多读取 `cap` 个体素.
    pub fn capped(cap: usize) -> Self {
        Self {
            voxel_cap: Some(cap),
            ..Self::full()
        }
    }

    /// 设置体素上限.
    pub fn with_voxel_cap(mut self, cap: Option<usize>) -> Self {
        self.voxel_cap = cap;
        self
    }

    /// 设置分辨率.
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    /// 设置特征变体.
    pub fn with_variant(mut self, variant: FeatureVariant) -> Self {
        self.variant = variant;
        self
    }

    /// 设置是否分层采样.
    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    /// 设置采样种子.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 模型文件名中描述分辨率与特征变体的后缀, 如 `_res2_hog`.
    pub fn model_suffix(&self) -> String {
        let mut ans = String::new();
        if self.resolution != 1 {
            ans.push_str(&format!("_res{}", self.resolution));
        }
        ans.push_str(self.variant.suffix());
        ans
    }

    /// 对读出的全分辨率患者数据依次应用分辨率与采样设置.
    ///
    /// 各 [`DataProvider`] 实现在读取原始数据后调用该方法.
    pub fn apply(&self, batch: PatientBatch) -> CascadeResult<PatientBatch> {
        if self.resolution == 0 {
            return Err(CascadeError::InvalidConfig("resolution must be positive".into()));
        }
        let batch = downsample(batch, self.resolution)?;
        match self.voxel_cap {
            Some(cap) if cap < batch.len() => {
                let mut rng = StdRng::seed_from_u64(self.seed ^ u64::from(batch.id).rotate_left(32));
                let keep = if self.stratified {
                    stratified_indices(&batch.labels, cap, &mut rng)
                } else {
                    let mut v = index::sample(&mut rng, batch.len(), cap).into_vec();
                    v.sort_unstable();
                    v
                };
                debug!("patient {}: sampled {} of {} voxels", batch.id, keep.len(), batch.len());
                batch.retain(&keep)
            }
            _ => Ok(batch),
        }
    }
}

/// 仅保留坐标各分量均为 `r` 的倍数的体素, 并将坐标与尺寸缩小 `r` 倍.
fn downsample(batch: PatientBatch, r: usize) -> CascadeResult<PatientBatch> {
    if r == 1 {
        return Ok(batch);
    }
    let keep: Vec<usize> = batch
        .coords
        .iter()
        .enumerate()
        .filter(|(_, (z, h, w))| z % r == 0 && h % r == 0 && w % r == 0)
        .map(|(i, _)| i)
        .collect();
    let (z, h, w) = batch.dims;
    let dims = (z.div_ceil(r), h.div_ceil(r), w.div_ceil(r));
    let PatientBatch {
        id,
        features,
        labels,
        coords,
        ..
    } = batch.retain(&keep)?;
    let coords = coords.into_iter().map(|(z, h, w)| (z / r, h / r, w / r)).collect();
    PatientBatch::new(id, features, labels, coords, dims)
}

/// 在出现的各标签间均分 `cap` 个名额, 某标签体素不足时名额顺延给其余标签.
/// 返回的下标升序排列.
fn stratified_indices(labels: &[u8], cap: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); 256];
    for (i, &l) in labels.iter().enumerate() {
        groups[l as usize].push(i);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    // 先处理体素少的标签, 剩余名额留给后面的标签.
    groups.sort_by_key(Vec::len);

    let mut ans = Vec::with_capacity(cap);
    let mut left = cap;
    let n_groups = groups.len();
    for (k, g) in groups.into_iter().enumerate() {
        let quota = left / (n_groups - k);
        if g.len() <= quota {
            left -= g.len();
            ans.extend(g);
        } else {
            left -= quota;
            ans.extend(index::sample(rng, g.len(), quota).into_iter().map(|j| g[j]));
        }
    }
    ans.sort_unstable();
    ans
}

/// 按患者编号提供体素数据.
pub trait DataProvider: Sync {
    /// 读取单个患者.
    fn load_patient(&self, id: u32, spec: &LoadSpec) -> CascadeResult<PatientBatch>;

    /// 按顺序读取并拼接多个患者.
    fn load_patients(&self, ids: &[u32], spec: &LoadSpec) -> CascadeResult<Cohort> {
        let batches = ids
            .iter()
            .map(|&id| self.load_patient(id, spec))
            .collect::<CascadeResult<Vec<_>>>()?;
        Cohort::concat(batches)
    }

    /// 统计若干患者全部体素 (不采样) 的标签个数, 下标即标签值.
    fn class_counts(&self, ids: &[u32]) -> CascadeResult<[u64; 5]> {
        let spec = LoadSpec::full();
        let mut ans = [0; 5];
        for &id in ids {
            let h = label_histogram(&self.load_patient(id, &spec)?.labels);
            ans.iter_mut().zip(h).for_each(|(a, b)| *a += b);
        }
        Ok(ans)
    }
}
