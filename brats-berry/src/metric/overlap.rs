//! 按患者分组的区域重叠度.

use crate::consts::label::{is_tumor, ENHANCING, NECROSIS, NON_ENHANCING};
use crate::data::PatientBounds;
use crate::error::ensure_len;
use crate::CascadeResult;
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt;
use std::io::Write;

/// BraTS 评价区域.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    /// 全肿瘤: 标签 1, 2, 3, 4.
    Whole,

    /// 肿瘤核心: 标签 1, 3, 4.
    Core,

    /// 增强肿瘤: 标签 4.
    Enhancing,
}

impl Region {
    /// 全部区域, 即得分表的列顺序.
    pub const ALL: [Region; 3] = [Region::Whole, Region::Core, Region::Enhancing];

    /// 标签是否属于该区域?
    #[inline]
    pub const fn contains(&self, label: u8) -> bool {
        match self {
            Self::Whole => is_tumor(label),
            Self::Core => matches!(label, NECROSIS | NON_ENHANCING | ENHANCING),
            Self::Enhancing => label == ENHANCING,
        }
    }

    /// 区域名.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Whole => "whole",
            Self::Core => "core",
            Self::Enhancing => "enhancing",
        }
    }
}

/// 单个患者的区域重叠度.
pub trait OverlapMetric: Sync {
    /// 各列的名称.
    fn columns(&self) -> Vec<&'static str>;

    /// 单个患者各列的得分. `truth` 与 `pred` 等长.
    fn score_patient(&self, truth: &[u8], pred: &[u8]) -> Vec<f64>;
}

/// 各 BraTS 区域的 Dice 系数 `2|A∩B| / (|A| + |B|)`. 两集合均为空时为 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceScores;

impl OverlapMetric for DiceScores {
    fn columns(&self) -> Vec<&'static str> {
        Region::ALL.iter().map(Region::name).collect()
    }

    fn score_patient(&self, truth: &[u8], pred: &[u8]) -> Vec<f64> {
        Region::ALL
            .iter()
            .map(|r| {
                let (mut both, mut a, mut b) = (0u64, 0u64, 0u64);
                for (&t, &p) in truth.iter().zip(pred) {
                    let (in_t, in_p) = (r.contains(t), r.contains(p));
                    a += u64::from(in_t);
                    b += u64::from(in_p);
                    both += u64::from(in_t && in_p);
                }
                if a + b == 0 {
                    1.0
                } else {
                    2.0 * both as f64 / (a + b) as f64
                }
            })
            .collect()
    }
}

/// 得分表: 每个患者一行, 每个区域一列.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapScores {
    /// 列名.
    pub columns: Vec<&'static str>,

    /// 按患者顺序排列的得分.
    pub per_patient: Vec<Vec<f64>>,
}

impl OverlapScores {
    /// 所有患者、所有列的得分之和. 校准时以它为目标.
    pub fn total(&self) -> f64 {
        self.per_patient.iter().flatten().sum()
    }

    /// 各列在患者间的均值. 没有患者时为空.
    pub fn column_means(&self) -> Vec<f64> {
        if self.per_patient.is_empty() {
            return Vec::new();
        }
        let n = self.per_patient.len() as f64;
        (0..self.columns.len())
            .map(|c| self.per_patient.iter().map(|r| r[c]).sum::<f64>() / n)
            .collect()
    }
}

impl fmt::Display for OverlapScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let means = self.column_means();
        let cols = self
            .columns
            .iter()
            .zip(means.iter())
            .map(|(c, m)| format!("{c}={m:.4}"))
            .join("\t");
        write!(f, "{cols}\tsum={:.4}\tpatients={}", self.total(), self.per_patient.len())
    }
}

/// 按患者分组计算重叠度.
///
/// `bounds` 为 `None` 时整段数据视为一个患者. 结果写入日志, 给定 `sink`
/// 时再追加一行 `"{label}\t{scores}"`; 写入失败只记录警告.
///
/// # 错误
///
/// `truth` 与 `pred` 长度不一致, 或与 `bounds` 的样本总数不一致时返回
/// [`ShapeMismatch`](crate::CascadeError::ShapeMismatch).
pub fn overlap_scores(
    metric: &dyn OverlapMetric,
    truth: &[u8],
    pred: &[u8],
    bounds: Option<&PatientBounds>,
    sink: Option<&mut dyn Write>,
    label: &str,
) -> CascadeResult<OverlapScores> {
    ensure_len("predicted labels", truth.len(), pred.len())?;
    let whole = PatientBounds::from_lengths([truth.len()]);
    let bounds = bounds.unwrap_or(&whole);
    ensure_len("patient bounds total", truth.len(), bounds.total())?;

    let per_patient: Vec<Vec<f64>> = bounds
        .ranges()
        .map(|r| metric.score_patient(&truth[r.clone()], &pred[r]))
        .collect();
    for (i, row) in per_patient.iter().enumerate() {
        debug!("{label} patient #{i}: {}", row.iter().map(|v| format!("{v:.4}")).join(" "));
    }
    let scores = OverlapScores {
        columns: metric.columns(),
        per_patient,
    };
    info!("{label} {scores}");
    if let Some(w) = sink {
        if let Err(e) = writeln!(w, "{label}\t{scores}") {
            warn!("Cannot write scores `{label}`: {e}");
        }
    }
    Ok(scores)
}
