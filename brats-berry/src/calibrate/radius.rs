use super::{calibrate, mask_to_labels, Calibrated, PatientSweep, Sweep};
use crate::cascade::TwoStagePredictor;
use crate::data::PatientBatch;
use crate::post_proc::close_multi_radii;
use crate::report::Reporter;
use crate::CascadeResult;

/// 扫描检测后的闭运算半径.
///
/// 检测使用第一阶段模型的默认预测. 每个半径下闭运算并去除小分量;
/// 不做闭运算的结果作为基线记录.
pub fn sweep_radius(
    predictor: &TwoStagePredictor<'_>,
    dev: &[PatientBatch],
    radii: &[usize],
    reporter: &mut Reporter,
) -> CascadeResult<Calibrated<usize>> {
    let sweep = Sweep {
        name: "radius",
        candidates: radii,
        describe: |_, r| format!("radius={r}"),
        plots: None,
    };
    calibrate(&sweep, dev, reporter, |batch| {
        let mask = predictor.default_detection(batch)?;
        let candidates = close_multi_radii(&batch.coords, batch.dims, &mask, radii, true)?
            .iter()
            .map(|m| mask_to_labels(m))
            .collect();
        Ok(PatientSweep {
            baseline: Some(mask_to_labels(&mask)),
            candidates,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::TUMOR;
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

    /// `w <= 3` 的长方体肿瘤, 检测结果在 `(1, 2, 2)` 处有一个空洞.
    fn holed_block() -> Vec<PatientBatch> {
        let dims = (3, 5, 7);
        let mut coords = Vec::new();
        for z in 0..dims.0 {
            for h in 0..dims.1 {
                for w in 0..dims.2 {
                    coords.push((z, h, w));
                }
            }
        }
        let labels: Vec<u8> = coords.iter().map(|&(_, _, w)| if w <= 3 { TUMOR } else { 0 }).collect();
        let detected: Vec<f32> = coords
            .iter()
            .map(|&p| if p.2 <= 3 && p != (1, 2, 2) { 1.0 } else { 0.0 })
            .collect();
        let features = Array2::from_shape_vec((coords.len(), 1), detected).unwrap();
        vec![PatientBatch::new(9, features, labels, coords, dims).unwrap()]
    }

    #[test]
    fn test_radius_sweep_prefers_filled_hole() {
        let predictor = TwoStagePredictor::new(&FeatureDetector, &FeatureDetector).unwrap();
        let mut reporter = Reporter::default();
        // 半径 0 不闭合空洞, 半径 1 与 2 都恰好还原长方体.
        let ans = sweep_radius(&predictor, &holed_block(), &[0, 1, 2], &mut reporter).unwrap();
        assert_eq!(ans.best, 1);
        assert_eq!(ans.index, 1);
        assert_eq!(ans.score, 3.0);
        assert!(ans.scores[0] < ans.scores[1]);
        assert_eq!(ans.scores[1], ans.scores[2]);
        // 基线即未闭合的检测结果.
        assert_eq!(ans.baseline, Some(ans.scores[0]));
    }

    #[test]
    fn test_radius_sweep_tie_keeps_first() {
        let predictor = TwoStagePredictor::new(&FeatureDetector, &FeatureDetector).unwrap();
        let ans = sweep_radius(&predictor, &holed_block(), &[2, 1], &mut Reporter::default()).unwrap();
        assert_eq!(ans.best, 2);
        assert_eq!(ans.index, 0);
        assert_eq!(ans.scores, vec![3.0, 3.0]);
        assert!(ans.baseline.unwrap() < 3.0);
    }
}
