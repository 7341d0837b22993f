use super::{calibrate, mask_to_labels, Calibrated, PatientSweep, Sweep};
use crate::cascade::TwoStagePredictor;
use crate::data::PatientBatch;
use crate::report::Reporter;
use crate::CascadeResult;

/// 扫描检测阈值.
///
/// 每个阈值下的流程为: 二值化肿瘤概率, 再以半径 `radius` 闭运算并去除小分量.
/// 不使用最小体积兜底.
pub fn sweep_threshold(
    predictor: &TwoStagePredictor<'_>,
    dev: &[PatientBatch],
    thresholds: &[f32],
    radius: usize,
    reporter: &mut Reporter,
) -> CascadeResult<Calibrated<f32>> {
    let sweep = Sweep {
        name: "threshold",
        candidates: thresholds,
        describe: |_, th| format!("th={th:.2}"),
        plots: None,
    };
    calibrate(&sweep, dev, reporter, |batch| {
        let proba = predictor.tumor_proba(batch)?;
        let candidates = thresholds
            .iter()
            .map(|&th| {
                let mask: Vec<bool> = proba.iter().map(|&p| p >= th).collect();
                TwoStagePredictor::refine(batch, &mask, radius).map(|m| mask_to_labels(&m))
            })
            .collect::<CascadeResult<_>>()?;
        Ok(PatientSweep {
            baseline: None,
            candidates,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::OverlapMetric;
    use crate::model::Classifier;
    use ndarray::{Array2, ArrayView2};

    /// 第 0 个特征即肿瘤概率.
    struct FeatureDetector;

    impl Classifier for FeatureDetector {
        fn classes(&self) -> &[u8] {
            &[0, 1]
        }

        fn n_features(&self) -> usize {
            1
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            Array2::from_shape_fn((x.nrows(), 2), |(i, k)| if k == 1 { x[(i, 0)] } else { 1.0 - x[(i, 0)] })
        }
    }

    struct FourClass;

    impl Classifier for FourClass {
        fn classes(&self) -> &[u8] {
            &[1, 2, 3, 4]
        }

        fn n_features(&self) -> usize {
            1
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            Array2::from_elem((x.nrows(), 4), 0.25)
        }
    }

    /// 预测恰好一个肿瘤体素时得 1.2 分, 否则 1.0 分.
    struct SingleVoxelMetric;

    impl OverlapMetric for SingleVoxelMetric {
        fn columns(&self) -> Vec<&'static str> {
            vec!["single"]
        }

        fn score_patient(&self, _truth: &[u8], pred: &[u8]) -> Vec<f64> {
            if pred.iter().filter(|&&p| p != 0).count() == 1 {
                vec![1.2]
            } else {
                vec![1.0]
            }
        }
    }

    fn dev() -> Vec<PatientBatch> {
        // 两个相距很远的体素, 肿瘤概率分别为 0.55 与 0.65.
        let mut p = vec![0.0f32; 8];
        p[0] = 0.55;
        p[7] = 0.65;
        let coords = (0..8).map(|i| (0, 0, i)).collect();
        let features = Array2::from_shape_vec((8, 1), p).unwrap();
        vec![PatientBatch::new(3, features, vec![0; 8], coords, (1, 1, 8)).unwrap()]
    }

    #[test]
    fn test_threshold_sweep_picks_higher_score() {
        let predictor = TwoStagePredictor::new(&FeatureDetector, &FourClass).unwrap();
        let mut reporter = Reporter::new(Box::new(SingleVoxelMetric));
        let ans = sweep_threshold(&predictor, &dev(), &[0.5, 0.6], 0, &mut reporter).unwrap();
        assert_eq!(ans.best, 0.6);
        assert_eq!(ans.index, 1);
        assert_eq!(ans.scores, vec![1.0, 1.2]);
    }

    #[test]
    fn test_threshold_sweep_tie_keeps_first() {
        let predictor = TwoStagePredictor::new(&FeatureDetector, &FourClass).unwrap();
        let mut reporter = Reporter::new(Box::new(SingleVoxelMetric));
        // 两个阈值都只留下 0.65 那个体素.
        let ans = sweep_threshold(&predictor, &dev(), &[0.6, 0.62], 0, &mut reporter).unwrap();
        assert_eq!(ans.best, 0.6);
        assert_eq!(ans.scores, vec![1.2, 1.2]);
    }
}
