use crate::data::{concat_with_bounds, PatientBatch};
use crate::error::ensure_len;
use crate::report::{Plotter, Reporter};
use crate::{CascadeError, CascadeResult};
use log::{debug, info};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 一次扫描的描述.
pub struct Sweep<'a, C> {
    /// 扫描名称, 用于日志与错误信息.
    pub name: &'static str,

    /// 候选值, 按扫描顺序排列.
    pub candidates: &'a [C],

    /// 第 `k` 个候选值的显示名.
    pub describe: fn(usize, &C) -> String,

    /// 绘制前若干个开发集患者的 "正则化前 | 正则化后" 图.
    /// 图片方法名为 `"{method}-{k + 1}"`.
    pub plots: Option<SweepPlots<'a>>,
}

/// 扫描时的可视化设置.
#[derive(Debug, Clone, Copy)]
pub struct SweepPlots<'a> {
    /// 绘图器.
    pub plotter: &'a Plotter,

    /// 方法名前缀.
    pub method: &'static str,

    /// 绘制的患者个数.
    pub patients: usize,
}

/// 单个开发集患者在所有候选值下的预测.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientSweep {
    /// 不做该步处理时的预测. 只记录日志, 不参与选择.
    pub baseline: Option<Vec<u8>>,

    /// 第 `k` 项为第 `k` 个候选值下的预测.
    pub candidates: Vec<Vec<u8>>,
}

/// 扫描结果.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrated<C> {
    /// 最优候选值.
    pub best: C,

    /// 最优候选值的下标.
    pub index: usize,

    /// 最优得分.
    pub score: f64,

    /// 每个候选值的得分.
    pub scores: Vec<f64>,

    /// 基线得分 (如有).
    pub baseline: Option<f64>,
}

/// 在开发集上扫描候选值.
///
/// `pipeline` 对单个患者给出所有候选值下的预测; 启用 `rayon` 时患者间并行,
/// 结果仍按开发集顺序拼接.
///
/// # 错误
///
/// 1. 候选列表为空时在运行任何流程前返回 [`CascadeError::EmptyCandidates`];
/// 2. 某个患者给出的预测个数与候选值个数不一致时返回
///   [`CascadeError::ShapeMismatch`];
/// 3. `pipeline` 的错误原样返回.
pub fn calibrate<C, F>(
    sweep: &Sweep<'_, C>,
    dev: &[PatientBatch],
    reporter: &mut Reporter,
    pipeline: F,
) -> CascadeResult<Calibrated<C>>
where
    C: Clone,
    F: Fn(&PatientBatch) -> CascadeResult<PatientSweep> + Sync + Send,
{
    if sweep.candidates.is_empty() {
        return Err(CascadeError::EmptyCandidates(sweep.name));
    }
    info!(
        "Calibrating {} over {} candidates on {} patients",
        sweep.name,
        sweep.candidates.len(),
        dev.len()
    );

    let results = run_patients(dev, &pipeline)?;
    for r in results.iter() {
        ensure_len("sweep predictions", sweep.candidates.len(), r.candidates.len())?;
    }

    if let Some(p) = sweep.plots.as_ref() {
        plot_patients(sweep, p, dev, &results);
    }

    let truths: Vec<&[u8]> = dev.iter().map(|b| b.labels.as_slice()).collect();
    let (truth, bounds) = concat_with_bounds(&truths);

    let baseline = if results.iter().all(|r| r.baseline.is_some()) && !results.is_empty() {
        let parts: Vec<&[u8]> = results
            .iter()
            .filter_map(|r| r.baseline.as_deref())
            .collect();
        let (pred, _) = concat_with_bounds(&parts);
        let label = format!("Overall dice scores ({} baseline):", sweep.name);
        Some(reporter.cohort_scores(&label, &truth, &pred, &bounds)?.total())
    } else {
        None
    };

    let mut scores = Vec::with_capacity(sweep.candidates.len());
    let mut index = 0;
    for (k, c) in sweep.candidates.iter().enumerate() {
        let name = (sweep.describe)(k, c);
        let parts: Vec<&[u8]> = results.iter().map(|r| r.candidates[k].as_slice()).collect();
        let (pred, _) = concat_with_bounds(&parts);
        reporter.confusion(&format!("Overall confusion matrix ({name})"), &truth, &pred)?;
        let s = reporter
            .cohort_scores(&format!("Overall dice scores ({name}):"), &truth, &pred, &bounds)?
            .total();
        debug!("{} candidate {name}: score = {s:.4}", sweep.name);
        if k > 0 && beats(s, scores[index]) {
            index = k;
        }
        scores.push(s);
    }

    let best = sweep.candidates[index].clone();
    info!(
        "Best {}: {} (score = {:.4})",
        sweep.name,
        (sweep.describe)(index, &best),
        scores[index]
    );
    Ok(Calibrated {
        best,
        index,
        score: scores[index],
        scores,
        baseline,
    })
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 在全局线程池上并行处理各患者, 按输入顺序收集.
        fn run_patients<F>(dev: &[PatientBatch], pipeline: &F) -> CascadeResult<Vec<PatientSweep>>
        where
            F: Fn(&PatientBatch) -> CascadeResult<PatientSweep> + Sync + Send,
        {
            dev.par_iter().map(pipeline).collect()
        }
    } else {
        fn run_patients<F>(dev: &[PatientBatch], pipeline: &F) -> CascadeResult<Vec<PatientSweep>>
        where
            F: Fn(&PatientBatch) -> CascadeResult<PatientSweep>,
        {
            dev.iter().map(pipeline).collect()
        }
    }
}

/// 严格大于: 平分时保留先出现者. NaN 不会胜出, 但任何非 NaN 得分都胜过 NaN.
#[inline]
fn beats(s: f64, best: f64) -> bool {
    s > best || (best.is_nan() && !s.is_nan())
}

fn plot_patients<C>(sweep: &Sweep<'_, C>, plots: &SweepPlots<'_>, dev: &[PatientBatch], results: &[PatientSweep]) {
    for (batch, r) in dev.iter().zip(results).take(plots.patients) {
        let zeros = vec![0; batch.len()];
        let before = r.baseline.as_deref().unwrap_or(&zeros);
        for (k, after) in r.candidates.iter().enumerate() {
            let method = format!("{}-{}", plots.method, k + 1);
            plots.plotter.plot_or_warn(
                batch.id,
                &method,
                &batch.coords,
                batch.dims,
                &batch.labels,
                before,
                after,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn batch(id: u32, labels: Vec<u8>) -> PatientBatch {
        let n = labels.len();
        let coords = (0..n).map(|i| (0, 0, i)).collect();
        PatientBatch::new(id, Array2::zeros((n, 1)), labels, coords, (1, 1, n)).unwrap()
    }

    fn describe(_: usize, c: &u8) -> String {
        c.to_string()
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let sweep: Sweep<'_, u8> = Sweep {
            name: "empty",
            candidates: &[],
            describe,
            plots: None,
        };
        let dev = [batch(0, vec![0, 1])];
        let ans = calibrate(&sweep, &dev, &mut Reporter::default(), |_| {
            panic!("pipeline must not run without candidates")
        });
        assert!(matches!(ans, Err(CascadeError::EmptyCandidates("empty"))));
    }

    #[test]
    fn test_tie_first_wins() {
        let sweep = Sweep {
            name: "tie",
            candidates: &[7u8, 8, 9],
            describe,
            plots: None,
        };
        let dev = [batch(0, vec![0, 4]), batch(1, vec![2, 0, 0])];
        // 所有候选值给出相同预测.
        let ans = calibrate(&sweep, &dev, &mut Reporter::default(), |b| {
            Ok(PatientSweep {
                baseline: None,
                candidates: vec![b.labels.clone(); 3],
            })
        })
        .unwrap();
        assert_eq!(ans.best, 7);
        assert_eq!(ans.index, 0);
        assert_eq!(ans.scores, vec![6.0; 3]);
        assert_eq!(ans.baseline, None);
    }

    #[test]
    fn test_best_and_baseline() {
        let sweep = Sweep {
            name: "pick",
            candidates: &[1u8, 2, 3],
            describe,
            plots: None,
        };
        let dev = [batch(0, vec![0, 4, 4]), batch(1, vec![0, 0, 2])];
        // 只有第 2 个候选值完全正确; 基线全背景.
        let ans = calibrate(&sweep, &dev, &mut Reporter::default(), |b| {
            let zeros = vec![0; b.len()];
            Ok(PatientSweep {
                baseline: Some(zeros.clone()),
                candidates: vec![zeros.clone(), b.labels.clone(), zeros],
            })
        })
        .unwrap();
        assert_eq!(ans.best, 2);
        assert_eq!(ans.index, 1);
        assert_eq!(ans.score, 6.0);
        assert!(ans.baseline.unwrap() < 6.0);
    }

    /// 全背景预测得 NaN, 否则得 1.
    struct NanOnEmpty;

    impl crate::metric::OverlapMetric for NanOnEmpty {
        fn columns(&self) -> Vec<&'static str> {
            vec!["nan"]
        }

        fn score_patient(&self, _truth: &[u8], pred: &[u8]) -> Vec<f64> {
            if pred.iter().all(|p| *p == 0) {
                vec![f64::NAN]
            } else {
                vec![1.0]
            }
        }
    }

    #[test]
    fn test_nan_score_never_kept() {
        let sweep = Sweep {
            name: "nan",
            candidates: &[1u8, 2, 3],
            describe,
            plots: None,
        };
        let dev = [batch(0, vec![0, 4])];
        let mut reporter = Reporter::new(Box::new(NanOnEmpty));
        let ans = calibrate(&sweep, &dev, &mut reporter, |b| {
            let zeros = vec![0; b.len()];
            Ok(PatientSweep {
                baseline: None,
                candidates: vec![zeros.clone(), b.labels.clone(), zeros],
            })
        })
        .unwrap();
        assert!(ans.scores[0].is_nan());
        assert!(ans.scores[2].is_nan());
        assert_eq!(ans.index, 1);
        assert_eq!(ans.score, 1.0);

        assert!(beats(0.5, f64::NAN));
        assert!(!beats(f64::NAN, 0.5));
        assert!(!beats(f64::NAN, f64::NAN));
        assert!(!beats(1.0, 1.0));
    }

    #[test]
    fn test_prediction_count_checked() {
        let sweep = Sweep {
            name: "short",
            candidates: &[1u8, 2],
            describe,
            plots: None,
        };
        let dev = [batch(0, vec![0, 4])];
        let ans = calibrate(&sweep, &dev, &mut Reporter::default(), |b| {
            Ok(PatientSweep {
                baseline: None,
                candidates: vec![b.labels.clone()],
            })
        });
        assert!(matches!(ans, Err(CascadeError::ShapeMismatch(..))));
    }
}
