use super::{calibrate, Calibrated, PatientSweep, Sweep, SweepPlots};
use crate::cascade::{Regularizer, TwoStagePredictor};
use crate::consts::label::BACKGROUND;
use crate::data::PatientBatch;
use crate::post_proc::PotentialMatrix;
use crate::report::{Plotter, Reporter};
use crate::CascadeResult;
use log::info;

/// 扫描平滑势函数.
///
/// 流程为: 默认检测, 以半径 `radius` 修整, 子区域分类, 再以各候选势函数平滑;
/// 不平滑的结果作为基线记录. 给定 `plots = Some((plotter, n))` 时绘制前 `n` 个患者在每个
/// 候选势函数下的结果, 方法名为 `MRF-{k}` (`k` 从 1 开始).
pub fn sweep_potential(
    predictor: &TwoStagePredictor<'_>,
    dev: &[PatientBatch],
    potentials: &[PotentialMatrix],
    radius: usize,
    reporter: &mut Reporter,
    plots: Option<(&Plotter, usize)>,
) -> CascadeResult<Calibrated<PotentialMatrix>> {
    let sweep = Sweep {
        name: "potential",
        candidates: potentials,
        describe: |k, _| format!("MRF-{}", k + 1),
        plots: plots.map(|(plotter, patients)| SweepPlots {
            plotter,
            method: "MRF",
            patients,
        }),
    };
    let best = calibrate(&sweep, dev, reporter, |batch| {
        let mask = predictor.default_detection(batch)?;
        let detected = TwoStagePredictor::refine(batch, &mask, radius)?;
        let Some(subtyped) = predictor.subtype(batch, &detected)? else {
            let zeros = vec![BACKGROUND; batch.len()];
            return Ok(PatientSweep {
                baseline: Some(zeros.clone()),
                candidates: vec![zeros; potentials.len()],
            });
        };
        let candidates = potentials
            .iter()
            .map(|p| predictor.regularize(batch, &subtyped, &Regularizer::Smoothing(p.clone())))
            .collect::<CascadeResult<_>>()?;
        Ok(PatientSweep {
            baseline: Some(subtyped.labels),
            candidates,
        })
    })?;
    info!("Best potential matrix:\n{}", best.best);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::EDEMA;
    use crate::consts::SUB_LABEL_ORDER;
    use crate::metric::OverlapMetric;
    use crate::model::Classifier;
    use ndarray::{Array2, ArrayView2};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    /// 总是倾向水肿, 并统计调用次数.
    #[derive(Default)]
    struct EdemaSubtyper {
        calls: AtomicUsize,
    }

    impl Classifier for EdemaSubtyper {
        fn classes(&self) -> &[u8] {
            &[1, 2, 3, 4]
        }

        fn n_features(&self) -> usize {
            1
        }

        fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Array2::from_shape_fn((x.nrows(), 4), |(_, k)| if k == 1 { 0.7 } else { 0.1 })
        }
    }

    /// 预测全为背景时得 1 分, 否则得 0 分.
    struct AllBackground;

    impl OverlapMetric for AllBackground {
        fn columns(&self) -> Vec<&'static str> {
            vec!["background"]
        }

        fn score_patient(&self, _truth: &[u8], pred: &[u8]) -> Vec<f64> {
            vec![if pred.iter().all(|&p| p == BACKGROUND) { 1.0 } else { 0.0 }]
        }
    }

    fn line(id: u32, tumor_p: f32, labels: Vec<u8>) -> PatientBatch {
        let n = labels.len();
        let features = Array2::from_elem((n, 1), tumor_p);
        let coords = (0..n).map(|i| (0, 0, i)).collect();
        PatientBatch::new(id, features, labels, coords, (1, 1, n)).unwrap()
    }

    fn candidates() -> Vec<PotentialMatrix> {
        PotentialMatrix::candidates(&SUB_LABEL_ORDER, &[0.02, 0.04, 0.08])
    }

    #[test]
    fn test_potential_sweep_tie_keeps_first() {
        let spy = EdemaSubtyper::default();
        let predictor = TwoStagePredictor::new(&FeatureDetector, &spy).unwrap();
        let dev = [line(1, 0.9, vec![EDEMA; 4]), line(2, 0.1, vec![0; 4])];
        let potentials = candidates();
        let ans = sweep_potential(&predictor, &dev, &potentials, 0, &mut Reporter::default(), None).unwrap();
        // 一致的水肿标签在任何势函数下都保持不变.
        assert_eq!(ans.scores, vec![6.0; 3]);
        assert_eq!(ans.index, 0);
        assert_eq!(ans.best, potentials[0]);
        assert_eq!(ans.baseline, Some(6.0));
        // 第二个患者没有肿瘤, 不调用第二阶段模型.
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_potential_sweep_without_tumor() {
        let spy = EdemaSubtyper::default();
        let predictor = TwoStagePredictor::new(&FeatureDetector, &spy).unwrap();
        let dev = [line(3, 0.2, vec![EDEMA, EDEMA, 0, 0])];
        let mut reporter = Reporter::new(Box::new(AllBackground));
        let ans = sweep_potential(&predictor, &dev, &candidates(), 1, &mut reporter, None).unwrap();
        assert_eq!(ans.scores, vec![1.0; 3]);
        assert_eq!(ans.baseline, Some(1.0));
        assert_eq!(ans.index, 0);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }
}
