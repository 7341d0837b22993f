//! 以配置指纹寻址的模型磁盘缓存.
//!
//! 模型用 `bincode` 序列化后经 zlib 压缩存盘. 文件名由 [`ModelKey`] 的
//! `bincode` 字节的 SHA-256 摘要决定, 因此同一配置总是对应同一文件.

use crate::CascadeResult;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// 模型所处的级联阶段.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// 第一阶段: 肿瘤 vs. 非肿瘤.
    Detection,

    /// 第二阶段: 四个肿瘤子区域.
    Subtyping,

    /// 单阶段五分类对照模型.
    SingleStage,
}

impl Stage {
    /// 文件名前缀.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Detection => "model1",
            Self::Subtyping => "model2",
            Self::SingleStage => "model0",
        }
    }
}

/// 模型缓存的配置指纹.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    /// 级联阶段.
    pub stage: Stage,

    /// 随机种子.
    pub seed: u64,

    /// 训练集患者数.
    pub n_train: usize,

    /// 测试集患者数.
    pub n_test: usize,

    /// 树的棵数.
    pub n_trees: usize,

    /// 每患者体素上限.
    pub voxel_cap: Option<usize>,

    /// 分辨率与特征变体后缀, 见 [`LoadSpec::model_suffix`](crate::data::LoadSpec::model_suffix).
    pub suffix: String,
}

impl ModelKey {
    /// 同一配置下另一阶段的指纹.
    pub fn for_stage(&self, stage: Stage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }

    /// 十六进制 SHA-256 摘要.
    pub fn digest(&self) -> CascadeResult<String> {
        let bytes = bincode::serialize(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// 模型缓存目录.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// 以目录 `dir` 初始化. 目录在首次写入时创建.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 指纹对应的文件路径.
    pub fn path(&self, key: &ModelKey) -> CascadeResult<PathBuf> {
        Ok(self
            .dir
            .join(format!("{}-{}.bin.zz", key.stage.name(), key.digest()?)))
    }

    /// 读取缓存的模型.
    ///
    /// 文件不存在时返回 `None`; 文件损坏或无法解码时记录警告并返回 `None`,
    /// 调用方应重新训练.
    pub fn load<M: DeserializeOwned>(&self, key: &ModelKey) -> Option<M> {
        let path = match self.path(key) {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot fingerprint {key:?}: {e}");
                return None;
            }
        };
        let file = File::open(&path).ok()?;
        match bincode::deserialize_from(ZlibDecoder::new(BufReader::new(file))) {
            Ok(m) => {
                info!("Loaded {} from {}", key.stage.name(), path.display());
                Some(m)
            }
            Err(e) => {
                warn!("Ignoring corrupt model file {}: {e}", path.display());
                None
            }
        }
    }

    /// 保存模型, 返回文件路径. 已有文件会被覆盖.
    pub fn save<M: Serialize>(&self, key: &ModelKey, model: &M) -> CascadeResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key)?;
        let mut e = ZlibEncoder::new(BufWriter::new(File::create(&path)?), Compression::default());
        bincode::serialize_into(&mut e, model)?;
        e.finish()?.into_inner().map_err(|e| e.into_error())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ModelKey {
        ModelKey {
            stage: Stage::Detection,
            seed: 42,
            n_train: 10,
            n_test: 5,
            n_trees: 30,
            voxel_cap: Some(30000),
            suffix: String::new(),
        }
    }

    #[test]
    fn test_digest_distinguishes_keys() {
        let k = key();
        assert_eq!(k.digest().unwrap(), key().digest().unwrap());
        assert_eq!(k.digest().unwrap().len(), 64);
        assert_ne!(k.digest().unwrap(), k.for_stage(Stage::Subtyping).digest().unwrap());
        let mut k2 = key();
        k2.suffix.push_str("_hog");
        assert_ne!(k.digest().unwrap(), k2.digest().unwrap());
    }

    #[test]
    fn test_store_round_trip_and_corruption() {
        let dir = std::env::temp_dir().join(format!("brats-berry-store-{}", std::process::id()));
        let store = ModelStore::new(&dir);
        let k = key();
        assert!(store.load::<Vec<f32>>(&k).is_none());

        let path = store.save(&k, &vec![1.0f32, 2.5]).unwrap();
        assert_eq!(store.load::<Vec<f32>>(&k), Some(vec![1.0, 2.5]));

        fs::write(&path, b"not a model").unwrap();
        assert!(store.load::<Vec<f32>>(&k).is_none());
        fs::remove_dir_all(&dir).unwrap();
    }
}
