use super::Regularizer;
use crate::consts::label::{BACKGROUND, TUMOR};
use crate::consts::{DEFAULT_RADIUS, DEFAULT_THRESHOLD, MIN_TUMOR_VOXELS};
use crate::data::PatientBatch;
use crate::error::ensure_len;
use crate::model::{argmax, Classifier};
use crate::post_proc::{close_and_filter, PotentialMatrix};
use crate::report::Reporter;
use crate::{CascadeError, CascadeResult, Idx3d};
use binary_heap_plus::BinaryHeap;
use log::info;
use ndarray::{Array2, Axis};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// 校准得到的级联超参数.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeParams {
    /// 肿瘤概率阈值.
    pub threshold: f32,

    /// 检测后闭运算半径.
    pub radius: usize,

    /// 子区域分类后的正则化方式.
    pub regularizer: Regularizer,

    /// 检测到的肿瘤体素下限.
    pub floor: usize,
}

impl Default for CascadeParams {
    /// 未校准时的默认值: 阈值 0.6, 半径 6, 以默认势函数平滑, 下限 3000.
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            radius: DEFAULT_RADIUS,
            regularizer: Regularizer::Smoothing(PotentialMatrix::calibrated_default()),
            floor: MIN_TUMOR_VOXELS,
        }
    }
}

/// 单个患者的级联预测结果. 各字段与患者体素一一对应.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePrediction {
    /// 检测并修整后的肿瘤掩码.
    pub detected: Vec<bool>,

    /// 子区域分类后、正则化前的标签.
    pub before: Vec<u8>,

    /// 最终标签.
    pub labels: Vec<u8>,

    /// 是否触发了最小体积兜底.
    pub fallback: bool,
}

/// 肿瘤体素上的子区域分类结果.
#[derive(Debug, Clone)]
pub struct Subtyped {
    /// 肿瘤体素在患者中的下标 (升序).
    pub tumor_idx: Vec<usize>,

    /// 肿瘤体素的子区域概率.
    pub proba: Array2<f32>,

    /// 整个患者的标签: 肿瘤体素为子区域标签, 其余为背景.
    pub labels: Vec<u8>,
}

/// 二值化肿瘤概率; 结果少于 `floor` 个体素时改为取概率最高的 `floor` 个体素
/// (体素不足 `floor` 个时全部取), 概率相同时下标小者优先.
///
/// 返回掩码以及是否触发了兜底.
pub fn detect_with_floor(tumor_proba: &[f32], threshold: f32, floor: usize) -> (Vec<bool>, bool) {
    let mask: Vec<bool> = tumor_proba.iter().map(|&p| p >= threshold).collect();
    if mask.iter().filter(|m| **m).count() >= floor {
        return (mask, false);
    }

    let mut heap = BinaryHeap::with_capacity_min(floor);
    for (i, &p) in tumor_proba.iter().enumerate() {
        let key = (OrderedFloat(p), Reverse(i));
        if heap.len() < floor {
            heap.push(key);
        } else if heap.peek().map_or(false, |top| key > *top) {
            heap.pop();
            heap.push(key);
        }
    }
    let mut ans = vec![false; tumor_proba.len()];
    heap.into_iter().for_each(|(_, Reverse(i))| ans[i] = true);
    (ans, true)
}

/// 两阶段级联预测器.
///
/// 第一阶段模型必须包含类别 [`TUMOR`], 第二阶段模型的类别即子区域标签.
pub struct TwoStagePredictor<'a> {
    detector: &'a dyn Classifier,
    subtyper: &'a dyn Classifier,
}

impl<'a> TwoStagePredictor<'a> {
    /// 初始化. 两个模型的特征维数必须一致.
    pub fn new(detector: &'a dyn Classifier, subtyper: &'a dyn Classifier) -> CascadeResult<Self> {
        if !detector.classes().contains(&TUMOR) {
            return Err(CascadeError::InvalidConfig(format!(
                "detection model classes {:?} lack the tumor label",
                detector.classes()
            )));
        }
        ensure_len("feature columns", detector.n_features(), subtyper.n_features())?;
        Ok(Self { detector, subtyper })
    }

    fn check(&self, batch: &PatientBatch) -> CascadeResult<()> {
        ensure_len("feature columns", self.detector.n_features(), batch.n_features())
    }

    /// 每个体素的肿瘤概率.
    pub fn tumor_proba(&self, batch: &PatientBatch) -> CascadeResult<Vec<f32>> {
        self.check(batch)?;
        Ok(self.detector.proba_of(batch.features.view(), TUMOR))
    }

    /// 第一阶段模型的默认预测 (最大概率类别) 是否为肿瘤.
    pub fn default_detection(&self, batch: &PatientBatch) -> CascadeResult<Vec<bool>> {
        self.check(batch)?;
        let pred = self.detector.predict(batch.features.view());
        Ok(pred.into_iter().map(|l| l == TUMOR).collect())
    }

    /// 闭运算并去除小连通分量.
    pub fn refine(batch: &PatientBatch, mask: &[bool], radius: usize) -> CascadeResult<Vec<bool>> {
        close_and_filter(&batch.coords, batch.dims, mask, true, true, radius)
    }

    /// 在掩码为真的体素上做子区域分类. 没有肿瘤体素时返回 `None`, 且不调用第二阶段模型.
    pub fn subtype(&self, batch: &PatientBatch, detected: &[bool]) -> CascadeResult<Option<Subtyped>> {
        self.check(batch)?;
        ensure_len("detection mask", batch.len(), detected.len())?;
        let tumor_idx: Vec<usize> = (0..detected.len()).filter(|&i| detected[i]).collect();
        if tumor_idx.is_empty() {
            return Ok(None);
        }
        let proba = self
            .subtyper
            .predict_proba(batch.features.select(Axis(0), &tumor_idx).view());
        let classes = self.subtyper.classes();
        let mut labels = vec![BACKGROUND; batch.len()];
        for (&i, row) in tumor_idx.iter().zip(proba.outer_iter()) {
            labels[i] = classes[argmax(row)];
        }
        Ok(Some(Subtyped {
            tumor_idx,
            proba,
            labels,
        }))
    }

    /// 对子区域分类结果做空间正则化, 返回整个患者的标签.
    pub fn regularize(
        &self,
        batch: &PatientBatch,
        subtyped: &Subtyped,
        regularizer: &Regularizer,
    ) -> CascadeResult<Vec<u8>> {
        let coords: Vec<Idx3d> = subtyped.tumor_idx.iter().map(|&i| batch.coords[i]).collect();
        let sub: Vec<u8> = subtyped.tumor_idx.iter().map(|&i| subtyped.labels[i]).collect();
        let smoothed = regularizer.apply(
            &coords,
            batch.dims,
            &sub,
            subtyped.proba.view(),
            self.subtyper.classes(),
        )?;
        let mut ans = subtyped.labels.clone();
        for (&i, l) in subtyped.tumor_idx.iter().zip(smoothed) {
            ans[i] = l;
        }
        Ok(ans)
    }

    /// 完整的两阶段预测.
    ///
    /// 在检测、子区域分类和正则化之后分别记录混淆矩阵与重叠度.
    /// 修整后没有肿瘤体素时, 跳过后两步并返回全背景结果.
    pub fn predict(
        &self,
        batch: &PatientBatch,
        params: &CascadeParams,
        reporter: &Reporter,
    ) -> CascadeResult<CascadePrediction> {
        let proba = self.tumor_proba(batch)?;
        let (mask, fallback) = detect_with_floor(&proba, params.threshold, params.floor);
        if fallback {
            info!(
                "Patient {} having too few voxels ({} < {})",
                batch.id,
                proba.iter().filter(|p| **p >= params.threshold).count(),
                params.floor
            );
        }
        let detected = Self::refine(batch, &mask, params.radius)?;
        let detected_map: Vec<u8> = detected.iter().map(|&d| u8::from(d) * TUMOR).collect();
        reporter.confusion("Confusion matrix (detection)", &batch.labels, &detected_map)?;

        let Some(subtyped) = self.subtype(batch, &detected)? else {
            info!("Patient {}: no tumor voxels left after refinement", batch.id);
            let zeros = vec![BACKGROUND; batch.len()];
            return Ok(CascadePrediction {
                detected,
                before: zeros.clone(),
                labels: zeros,
                fallback,
            });
        };
        reporter.confusion("Confusion matrix", &batch.labels, &subtyped.labels)?;
        reporter.patient_scores("Dice scores:", &batch.labels, &subtyped.labels)?;

        let labels = self.regularize(batch, &subtyped, &params.regularizer)?;
        reporter.confusion("Confusion matrix (pp)", &batch.labels, &labels)?;
        reporter.patient_scores("Dice scores (pp):", &batch.labels, &labels)?;

        Ok(CascadePrediction {
            detected,
            before: subtyped.labels,
            labels,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, ArrayView2};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 第 0 个特征即肿瘤概率.
    struct FeatureDetector;

    impl Classifier for FeatureDetector {
        fn classes(&self) -> &[u8] {
            &[0, 1]
        }

        fn n_features(&self) -> usize {
            2
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            Array2::from_shape_fn((x.nrows(), 2), |(i, k)| {
                if k == 1 {
                    x[(i, 0)]
                } else {
                    1.0 - x[(i, 0)]
                }
            })
        }
    }

    /// 第 1 个特征决定子区域 (>= 0.5 为增强区, 否则为水肿), 并统计调用次数.
    #[derive(Default)]
    struct SpySubtyper {
        calls: AtomicUsize,
    }

    impl Classifier for SpySubtyper {
        fn classes(&self) -> &[u8] {
            &[1, 2, 3, 4]
        }

        fn n_features(&self) -> usize {
            2
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Array2::from_shape_fn((x.nrows(), 4), |(i, k)| {
                let enh = x[(i, 1)] >= 0.5;
                match (k, enh) {
                    (3, true) | (1, false) => 0.7,
                    _ => 0.1,
                }
            })
        }
    }

    fn line_batch(tumor_p: &[f32], sub: &[f32]) -> PatientBatch {
        let n = tumor_p.len();
        let features = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { tumor_p[i] } else { sub[i] });
        let labels = vec![0; n];
        let coords = (0..n).map(|i| (0, 0, i)).collect();
        PatientBatch::new(0, features, labels, coords, (1, 1, n)).unwrap()
    }

    #[test]
    fn test_fallback_exact_floor() {
        let p = [0.9, 0.1, 0.3, 0.3, 0.2, 0.05];
        let (mask, fallback) = detect_with_floor(&p, 0.5, 3);
        assert!(fallback);
        assert_eq!(mask.iter().filter(|m| **m).count(), 3);
        // 0.3 平局时两者都入选, 0.2 落选.
        assert_eq!(mask, vec![true, false, true, true, false, false]);

        let (mask, fallback) = detect_with_floor(&p, 0.5, 4);
        assert!(fallback);
        assert_eq!(mask, vec![true, false, true, true, true, false]);

        let (mask, _) = detect_with_floor(&[0.3, 0.3, 0.3], 0.5, 2);
        assert_eq!(mask, vec![true, true, false]);

        let (mask, fallback) = detect_with_floor(&[0.1, 0.2], 0.5, 3);
        assert!(fallback);
        assert_eq!(mask, vec![true, true]);

        let (mask, fallback) = detect_with_floor(&p, 0.25, 3);
        assert!(!fallback);
        assert_eq!(mask, vec![true, false, true, true, false, false]);
    }

    #[test]
    fn test_empty_tumor_skips_subtyping() {
        let spy = SpySubtyper::default();
        let predictor = TwoStagePredictor::new(&FeatureDetector, &spy).unwrap();
        let batch = line_batch(&[0.1, 0.2, 0.0, 0.3], &[0.9; 4]);
        let params = CascadeParams {
            floor: 0,
            radius: 1,
            ..Default::default()
        };
        let out = predictor.predict(&batch, &params, &Reporter::default()).unwrap();
        assert_eq!(out.labels, vec![0; 4]);
        assert_eq!(out.before, vec![0; 4]);
        assert!(!out.fallback);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_two_stage_predict() {
        let spy = SpySubtyper::default();
        let predictor = TwoStagePredictor::new(&FeatureDetector, &spy).unwrap();
        let batch = line_batch(&[0.9, 0.8, 0.9, 0.1, 0.1], &[0.9, 0.1, 0.9, 0.0, 0.0]);
        let params = CascadeParams {
            floor: 2,
            radius: 1,
            regularizer: Regularizer::Smoothing(PotentialMatrix::new(4, vec![0.0; 16]).unwrap()),
            ..Default::default()
        };
        let out = predictor.predict(&batch, &params, &Reporter::default()).unwrap();
        assert_eq!(out.detected, vec![true, true, true, false, false]);
        assert_eq!(out.before, vec![4, 2, 4, 0, 0]);
        assert_eq!(out.labels, out.before);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);

        // 强平滑把中间的孤立标签改为邻居的标签.
        let strong = CascadeParams {
            regularizer: Regularizer::Smoothing(PotentialMatrix::quadratic_base(&[2, 1, 3, 4])),
            ..params
        };
        let out = predictor.predict(&batch, &strong, &Reporter::default()).unwrap();
        assert_eq!(out.labels, vec![4, 4, 4, 0, 0]);
    }

    struct NoTumor;

    impl Classifier for NoTumor {
        fn classes(&self) -> &[u8] {
            &[0, 2]
        }

        fn n_features(&self) -> usize {
            3
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            Array2::zeros((x.nrows(), 2))
        }
    }

    #[test]
    fn test_rejects_mismatched_models() {
        let spy = SpySubtyper::default();
        assert!(matches!(
            TwoStagePredictor::new(&NoTumor, &spy),
            Err(CascadeError::InvalidConfig(_))
        ));
        assert!(matches!(
            TwoStagePredictor::new(&FeatureDetector, &NoTumor),
            Err(CascadeError::ShapeMismatch(..))
        ));
    }
}
