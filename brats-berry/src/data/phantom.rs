use super::{DataProvider, FeatureVariant, LoadSpec, PatientBatch};
use crate::consts::label::{BACKGROUND, EDEMA, ENHANCING, NECROSIS, NON_ENHANCING};
use crate::{CascadeResult, Idx3d};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 各标签的特征中心. 行下标即标签值.
const SIGNATURES: [[f32; 4]; 5] = [
    [0.0, 0.0, 0.0, 0.0],
    [1.0, -1.0, 0.5, 0.0],
    [1.0, 1.0, 0.0, 0.0],
    [1.0, 0.0, -1.0, 0.5],
    [1.0, 0.5, 1.0, 1.0],
];

/// 合成的确定性患者数据, 用于端到端测试与无数据集时的演示.
///
/// 每个患者的 "大脑" 是内切于体积的椭球, 其中有一个球形肿瘤,
/// 由内到外依次为坏死、非增强、增强和水肿四层. 特征为标签中心加均匀噪声.
/// 同一患者编号总是生成相同的数据.
#[derive(Debug, Clone)]
pub struct PhantomProvider {
    dims: Idx3d,
    noise: f32,
}

impl Default for PhantomProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PhantomProvider {
    /// 合成数据的推荐肿瘤体素下限.
    pub const MIN_TUMOR_VOXELS: usize = 50;

    /// 以默认尺寸 `(16, 32, 32)` 与噪声幅度 `0.35` 初始化.
    pub fn new() -> Self {
        Self {
            dims: (16, 32, 32),
            noise: 0.35,
        }
    }

    /// 设置体积尺寸.
    pub fn with_dims(mut self, dims: Idx3d) -> Self {
        self.dims = dims;
        self
    }

    /// 设置噪声幅度.
    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// 肿瘤球心与半径.
    fn tumor(&self, id: u32) -> ([f64; 3], f64) {
        let (z, h, w) = self.dims;
        let mut rng = StdRng::seed_from_u64(u64::from(id));
        let radius = (z.min(h).min(w) as f64 / 4.0).max(2.0) + (id % 3) as f64;
        let jitter = |rng: &mut StdRng, n: usize| n as f64 / 2.0 + rng.gen_range(-1.0..=1.0) * n as f64 / 8.0;
        ([jitter(&mut rng, z), jitter(&mut rng, h), jitter(&mut rng, w)], radius)
    }

    /// 体素的真实标签. 体素不在大脑内时返回 `None`.
    pub fn truth_label(&self, id: u32, (z, h, w): Idx3d) -> Option<u8> {
        let (dz, dh, dw) = self.dims;
        let norm = |p: usize, n: usize| (p as f64 + 0.5 - n as f64 / 2.0) / (n as f64 / 2.0);
        if norm(z, dz).powi(2) + norm(h, dh).powi(2) + norm(w, dw).powi(2) > 1.0 {
            return None;
        }
        Some(match self.tumor_distance(id, (z, h, w)) {
            d if d < 0.3 => NECROSIS,
            d if d < 0.5 => NON_ENHANCING,
            d if d < 0.7 => ENHANCING,
            d if d < 1.0 => EDEMA,
            _ => BACKGROUND,
        })
    }

    /// 到肿瘤球心的距离与半径之比.
    fn tumor_distance(&self, id: u32, (z, h, w): Idx3d) -> f64 {
        let (c, r) = self.tumor(id);
        let d2 = (z as f64 - c[0]).powi(2) + (h as f64 - c[1]).powi(2) + (w as f64 - c[2]).powi(2);
        d2.sqrt() / r
    }
}

impl DataProvider for PhantomProvider {
    fn load_patient(&self, id: u32, spec: &LoadSpec) -> CascadeResult<PatientBatch> {
        let (dz, dh, dw) = self.dims;
        let mut coords = Vec::with_capacity(dz * dh * dw);
        let mut labels = Vec::with_capacity(dz * dh * dw);
        for z in 0..dz {
            for h in 0..dh {
                for w in 0..dw {
                    if let Some(l) = self.truth_label(id, (z, h, w)) {
                        coords.push((z, h, w));
                        labels.push(l);
                    }
                }
            }
        }

        let n_features = match spec.variant {
            FeatureVariant::Base => 4,
            FeatureVariant::Hog => 6,
        };
        let mut rng = StdRng::seed_from_u64(u64::from(id).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut features = Array2::zeros((labels.len(), n_features));
        for (i, mut row) in features.outer_iter_mut().enumerate() {
            let sig = &SIGNATURES[labels[i] as usize];
            for (j, v) in row.iter_mut().enumerate() {
                let center = match j {
                    0..=3 => sig[j],
                    4 => self.tumor_distance(id, coords[i]).min(2.0) as f32,
                    _ => 0.0,
                };
                *v = center + rng.gen_range(-self.noise..=self.noise);
            }
        }
        spec.apply(PatientBatch::new(id, features, labels, coords, self.dims)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::label_histogram;

    #[test]
    fn test_phantom_deterministic() {
        let p = PhantomProvider::new();
        let a = p.load_patient(3, &LoadSpec::full()).unwrap();
        let b = p.load_patient(3, &LoadSpec::full()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.features, b.features);
        assert!(a.len() < 16 * 32 * 32);

        let h = label_histogram(&a.labels);
        assert!(h.iter().all(|c| *c > 0));
        assert!(a.tumor_voxels() > PhantomProvider::MIN_TUMOR_VOXELS);
    }

    #[test]
    fn test_phantom_variants() {
        let p = PhantomProvider::new().with_dims((8, 16, 16));
        let hog = LoadSpec::capped(100).with_variant(FeatureVariant::Hog);
        let b = p.load_patient(1, &hog).unwrap();
        assert_eq!(b.n_features(), 6);
        assert_eq!(b.len(), 100);
    }
}
