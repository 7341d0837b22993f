//! 评价与报告: 混淆矩阵、按患者分组的重叠度、结果流与可视化.

mod plot;

pub use plot::Plotter;

use crate::data::PatientBounds;
use crate::metric::{overlap_scores, ConfusionMatrix, DiceScores, OverlapMetric, OverlapScores};
use crate::{CascadeResult, Idx3d};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// 评价结果的汇报者.
///
/// 所有结果写入日志; 全体患者的汇总得分还会追加到可选的结果流中.
/// 结果流写入失败与绘图失败都只记录警告, 不中断运行.
pub struct Reporter {
    metric: Box<dyn OverlapMetric>,
    sink: Option<Box<dyn Write + Send>>,
    plotter: Option<Plotter>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Box::new(DiceScores))
    }
}

impl Reporter {
    /// 只写日志的汇报者.
    pub fn new(metric: Box<dyn OverlapMetric>) -> Self {
        Self {
            metric,
            sink: None,
            plotter: None,
        }
    }

    /// 设置结果流.
    pub fn with_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 以追加模式打开结果文件作为结果流, 必要时创建其所在目录.
    pub fn with_results_file<P: AsRef<Path>>(self, path: P) -> CascadeResult<Self> {
        if let Some(dir) = path.as_ref().parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(self.with_sink(Box::new(file)))
    }

    /// 设置可视化.
    pub fn with_plotter(mut self, plotter: Option<Plotter>) -> Self {
        self.plotter = plotter;
        self
    }

    /// 是否会绘图?
    #[inline]
    pub fn plots(&self) -> bool {
        self.plotter.is_some()
    }

    /// 使用的重叠度指标.
    #[inline]
    pub fn metric(&self) -> &dyn OverlapMetric {
        self.metric.as_ref()
    }

    /// 计算并记录混淆矩阵.
    pub fn confusion(&self, label: &str, truth: &[u8], pred: &[u8]) -> CascadeResult<ConfusionMatrix> {
        let cm = ConfusionMatrix::from_labels(truth, pred)?;
        info!("{label}:\n{cm}");
        Ok(cm)
    }

    /// 记录单个患者 (或不分组数据) 的重叠度, 不写入结果流.
    pub fn patient_scores(&self, label: &str, truth: &[u8], pred: &[u8]) -> CascadeResult<OverlapScores> {
        overlap_scores(self.metric(), truth, pred, None, None, label)
    }

    /// 按患者分组记录重叠度, 并写入结果流.
    pub fn cohort_scores(
        &mut self,
        label: &str,
        truth: &[u8],
        pred: &[u8],
        bounds: &PatientBounds,
    ) -> CascadeResult<OverlapScores> {
        let sink = self.sink.as_mut().map(|w| w.as_mut() as &mut dyn Write);
        overlap_scores(self.metric.as_ref(), truth, pred, Some(bounds), sink, label)
    }

    /// 记录准确率与全背景基线.
    pub fn accuracy(&self, truth: &[u8], pred: &[u8]) -> CascadeResult<f64> {
        let cm = ConfusionMatrix::from_labels(truth, pred)?;
        info!("Accuracy:\t{:.2}%", cm.accuracy() * 100.0);
        info!("Majority vote:\t{:.2}%", cm.majority_baseline() * 100.0);
        Ok(cm.accuracy())
    }

    /// 向结果流写入一行文本.
    pub fn record(&mut self, line: &str) {
        if let Some(w) = self.sink.as_mut() {
            if let Err(e) = writeln!(w, "{line}").and_then(|_| w.flush()) {
                warn!("Cannot write to the results stream: {e}");
            }
        }
    }

    /// 设置了可视化时绘制单个患者.
    #[allow(clippy::too_many_arguments)]
    pub fn plot(
        &self,
        id: u32,
        method: &str,
        coords: &[Idx3d],
        dims: Idx3d,
        truth: &[u8],
        before: &[u8],
        after: &[u8],
    ) {
        if let Some(p) = self.plotter.as_ref() {
            p.plot_or_warn(id, method, coords, dims, truth, before, after);
        }
    }
}
