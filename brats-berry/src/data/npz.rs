use super::{DataProvider, LoadSpec, PatientBatch};
use crate::{CascadeError, CascadeResult, Idx3d};
use ndarray::{Ix1, Ix2, OwnedRepr};
use ndarray_npy::NpzReader;
use std::fs::File;
use std::path::{Path, PathBuf};

/// 从目录中的 npz 归档读取患者数据.
///
/// 患者 `id` 对应文件 `{dir}/pat{id}.npz`, 其中包含:
///
/// - `features`: `f32`, 形状 `(n, d)`;
/// - `features_hog`: 可选, 同上;
/// - `labels`: `u8`, 长度 `n`;
/// - `coords`: `i64`, 形状 `(n, 3)`, 每行为 `(z, h, w)`;
/// - `dims`: `i64`, 长度 3.
#[derive(Debug, Clone)]
pub struct NpzProvider {
    dir: PathBuf,
}

impl NpzProvider {
    /// 以目录 `dir` 初始化. 不检查目录是否存在.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 患者归档路径.
    pub fn patient_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("pat{id}.npz"))
    }
}

fn to_idx(v: i64, i: usize) -> CascadeResult<usize> {
    usize::try_from(v).map_err(|_| CascadeError::CoordOutOfBounds(i))
}

impl DataProvider for NpzProvider {
    fn load_patient(&self, id: u32, spec: &LoadSpec) -> CascadeResult<PatientBatch> {
        let mut npz = NpzReader::new(File::open(self.patient_path(id))?)?;
        let features = npz.by_name::<OwnedRepr<f32>, Ix2>(spec.variant.array_name())?;
        let labels = npz.by_name::<OwnedRepr<u8>, Ix1>("labels.npy")?.to_vec();
        let raw_coords = npz.by_name::<OwnedRepr<i64>, Ix2>("coords.npy")?;
        let raw_dims = npz.by_name::<OwnedRepr<i64>, Ix1>("dims.npy")?;

        if raw_coords.ncols() != 3 {
            return Err(CascadeError::ShapeMismatch("coordinate columns", 3, raw_coords.ncols()));
        }
        if raw_dims.len() != 3 {
            return Err(CascadeError::ShapeMismatch("volume dimensions", 3, raw_dims.len()));
        }
        let coords = raw_coords
            .outer_iter()
            .enumerate()
            .map(|(i, r)| Ok((to_idx(r[0], i)?, to_idx(r[1], i)?, to_idx(r[2], i)?)))
            .collect::<CascadeResult<Vec<Idx3d>>>()?;
        let dims = raw_dims
            .iter()
            .map(|&d| {
                usize::try_from(d)
                    .map_err(|_| CascadeError::InvalidConfig(format!("negative volume size {d}")))
            })
            .collect::<CascadeResult<Vec<usize>>>()?;

        spec.apply(PatientBatch::new(id, features, labels, coords, (dims[0], dims[1], dims[2]))?)
    }
}
