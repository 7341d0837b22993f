//! 实验配置.
//!
//! 配置以 JSON 文件给出, 缺省的字段取 [`ExperimentConfig::default`] 中的值.

use crate::cascade::{CascadeParams, Regularizer};
use crate::consts::{
    DEFAULT_RADIUS, DEFAULT_THRESHOLD, MIN_TUMOR_VOXELS, N_TREES, ONLINE_VOXEL_CAP, POTENTIAL_FACTORS,
    RADIUS_CANDIDATES, SEED, SUB_LABEL_ORDER, THRESHOLD_CANDIDATES, VOXEL_CAP,
};
use crate::data::{FeatureVariant, LoadSpec};
use crate::model::{ForestConfig, ModelKey, Stage};
use crate::post_proc::PotentialMatrix;
use crate::{CascadeError, CascadeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 子区域分类之后的正则化方式.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizerKind {
    /// 成对势函数平滑.
    #[default]
    Smoothing,

    /// 第二轮逐标签闭运算.
    Closing,
}

/// 一次实验的全部设置.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// 训练集患者编号.
    pub train_ids: Vec<u32>,

    /// 开发集患者编号, 用于校准. 为空时使用默认超参数.
    pub dev_ids: Vec<u32>,

    /// 测试集患者编号.
    pub test_ids: Vec<u32>,

    /// 随机种子.
    pub seed: u64,

    /// 森林规模.
    pub n_trees: usize,

    /// 树的最大深度.
    pub max_depth: Option<usize>,

    /// 训练时每患者最多采样的体素个数.
    pub voxel_cap: Option<usize>,

    /// 在线学习时每患者最多采样的体素个数.
    pub online_voxel_cap: usize,

    /// 空间降采样步长.
    pub resolution: usize,

    /// 特征变体.
    pub variant: FeatureVariant,

    /// 是否分层采样并以类别平衡权重训练.
    pub stratified: bool,

    /// 正则化方式.
    pub regularizer: RegularizerKind,

    /// 忽略缓存, 总是重新训练.
    pub fresh_models: bool,

    /// 是否为每个测试患者绘图.
    pub plot: bool,

    /// 势函数扫描时是否为所有开发集患者绘图 (否则只画前几个).
    pub plot_all_dev: bool,

    /// 检测到的肿瘤体素下限.
    pub floor: usize,

    /// 训练森林的线程数. `0` 表示由 `rayon` 决定.
    pub workers: usize,

    /// 模型缓存目录.
    pub model_dir: PathBuf,

    /// 结果与图片目录.
    pub results_dir: PathBuf,

    /// 阈值候选.
    pub thresholds: Vec<f32>,

    /// 闭运算半径候选.
    pub radii: Vec<usize>,

    /// 势函数倍率候选.
    pub potential_factors: Vec<f64>,

    /// 二次势函数的子区域秩次.
    pub potential_order: Vec<u8>,

    /// 整个数据集的各标签体素个数. 缺省时由训练集统计.
    pub class_counts: Option<[u64; 5]>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            train_ids: (1..=20).collect(),
            dev_ids: (21..=25).collect(),
            test_ids: (26..=30).collect(),
            seed: SEED,
            n_trees: N_TREES,
            max_depth: None,
            voxel_cap: Some(VOXEL_CAP),
            online_voxel_cap: ONLINE_VOXEL_CAP,
            resolution: 1,
            variant: FeatureVariant::Base,
            stratified: false,
            regularizer: RegularizerKind::Smoothing,
            fresh_models: false,
            plot: false,
            plot_all_dev: false,
            floor: MIN_TUMOR_VOXELS,
            workers: 0,
            model_dir: PathBuf::from("models"),
            results_dir: PathBuf::from("results"),
            thresholds: THRESHOLD_CANDIDATES.to_vec(),
            radii: RADIUS_CANDIDATES.to_vec(),
            potential_factors: POTENTIAL_FACTORS.to_vec(),
            potential_order: SUB_LABEL_ORDER.to_vec(),
            class_counts: None,
        }
    }
}

impl ExperimentConfig {
    /// 读取 JSON 配置文件并检查.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CascadeResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// 检查配置.
    ///
    /// # 错误
    ///
    /// 以下情况返回 [`CascadeError::InvalidConfig`]:
    ///
    /// 1. 训练集或测试集为空;
    /// 2. 开发集与训练集或测试集相交;
    /// 3. 森林规模或分辨率为 0;
    /// 4. 势函数秩次个数不是 4;
    /// 5. 阈值、半径候选列表为空, 或以平滑正则化时势函数系数列表为空.
    pub fn validate(&self) -> CascadeResult<()> {
        let invalid = |msg: &str| Err(CascadeError::InvalidConfig(msg.to_string()));
        if self.train_ids.is_empty() {
            return invalid("empty training cohort");
        }
        if self.test_ids.is_empty() {
            return invalid("empty test cohort");
        }
        let seen: HashSet<u32> = self.train_ids.iter().chain(self.test_ids.iter()).copied().collect();
        if let Some(id) = self.dev_ids.iter().find(|id| seen.contains(id)) {
            return Err(CascadeError::InvalidConfig(format!(
                "development patient {id} also used for training or testing"
            )));
        }
        if self.n_trees == 0 {
            return invalid("a forest needs at least one tree");
        }
        if self.resolution == 0 {
            return invalid("resolution must be positive");
        }
        if self.potential_order.len() != SUB_LABEL_ORDER.len() {
            return invalid("potential order must rank the four sub-regions");
        }
        if self.thresholds.is_empty() {
            return invalid("no threshold candidates");
        }
        if self.radii.is_empty() {
            return invalid("no radius candidates");
        }
        if self.regularizer == RegularizerKind::Smoothing && self.potential_factors.is_empty() {
            return invalid("no potential factor candidates");
        }
        Ok(())
    }

    /// 训练集的读取方式.
    pub fn train_spec(&self) -> LoadSpec {
        LoadSpec::full()
            .with_voxel_cap(self.voxel_cap)
            .with_resolution(self.resolution)
            .with_variant(self.variant)
            .with_stratified(self.stratified)
            .with_seed(self.seed)
    }

    /// 开发集与测试集的读取方式: 读取全部体素.
    pub fn eval_spec(&self) -> LoadSpec {
        LoadSpec::full()
            .with_resolution(self.resolution)
            .with_variant(self.variant)
            .with_seed(self.seed)
    }

    /// 在线学习时训练集的读取方式.
    pub fn online_spec(&self) -> LoadSpec {
        self.eval_spec().with_voxel_cap(Some(self.online_voxel_cap))
    }

    /// 森林超参数.
    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            seed: self.seed,
            workers: self.workers,
            ..Default::default()
        }
    }

    /// 某一阶段模型的缓存指纹.
    pub fn model_key(&self, stage: Stage) -> ModelKey {
        ModelKey {
            stage,
            seed: self.seed,
            n_train: self.train_ids.len(),
            n_test: self.test_ids.len(),
            n_trees: self.n_trees,
            voxel_cap: self.voxel_cap,
            suffix: self.train_spec().model_suffix(),
        }
    }

    /// 势函数扫描的候选矩阵.
    pub fn potential_candidates(&self) -> Vec<PotentialMatrix> {
        PotentialMatrix::candidates(&self.potential_order, &self.potential_factors)
    }

    /// 未校准时的级联超参数.
    pub fn default_params(&self) -> CascadeParams {
        CascadeParams {
            threshold: DEFAULT_THRESHOLD,
            radius: DEFAULT_RADIUS,
            regularizer: self.regularizer(PotentialMatrix::calibrated_default(), DEFAULT_RADIUS),
            floor: self.floor,
        }
    }

    /// 按配置的正则化方式构造正则化器.
    pub fn regularizer(&self, potential: PotentialMatrix, radius: usize) -> Regularizer {
        match self.regularizer {
            RegularizerKind::Smoothing => Regularizer::Smoothing(potential),
            RegularizerKind::Closing => Regularizer::Closing { radius },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"train_ids": [1, 2], "test_ids": [3], "dev_ids": [], "regularizer": "closing"}"#)
                .unwrap();
        assert_eq!(config.train_ids, vec![1, 2]);
        assert_eq!(config.regularizer, RegularizerKind::Closing);
        assert_eq!(config.n_trees, N_TREES);
        assert_eq!(config.thresholds, THRESHOLD_CANDIDATES.to_vec());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.default_params().regularizer,
            Regularizer::Closing { radius: DEFAULT_RADIUS }
        );
    }

    #[test]
    fn test_validate() {
        assert!(ExperimentConfig::default().validate().is_ok());
        let overlap = ExperimentConfig {
            dev_ids: vec![1],
            ..Default::default()
        };
        assert!(matches!(overlap.validate(), Err(CascadeError::InvalidConfig(_))));
        let no_trees = ExperimentConfig {
            n_trees: 0,
            ..Default::default()
        };
        assert!(no_trees.validate().is_err());

        let no_thresholds = ExperimentConfig {
            thresholds: vec![],
            ..Default::default()
        };
        assert!(matches!(no_thresholds.validate(), Err(CascadeError::InvalidConfig(_))));
        let no_radii = ExperimentConfig {
            radii: vec![],
            ..Default::default()
        };
        assert!(no_radii.validate().is_err());
        let no_factors = ExperimentConfig {
            potential_factors: vec![],
            ..Default::default()
        };
        assert!(no_factors.validate().is_err());
        // 闭运算正则化不使用势函数.
        let closing = ExperimentConfig {
            regularizer: RegularizerKind::Closing,
            ..no_factors
        };
        assert!(closing.validate().is_ok());
    }

    #[test]
    fn test_model_key() {
        let config = ExperimentConfig {
            resolution: 2,
            variant: FeatureVariant::Hog,
            ..Default::default()
        };
        let k1 = config.model_key(Stage::Detection);
        assert_eq!(k1.suffix, "_res2_hog");
        assert_eq!(k1.n_train, 20);
        assert_eq!(k1.for_stage(Stage::Subtyping), config.model_key(Stage::Subtyping));
        assert_ne!(k1.digest().unwrap(), config.model_key(Stage::Subtyping).digest().unwrap());
    }
}
