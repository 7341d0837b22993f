use crate::consts::label::{ALL_LABELS, BACKGROUND};
use crate::error::ensure_len;
use crate::CascadeResult;
use std::fmt;

/// 五类标签的混淆矩阵. 行为真实标签, 列为预测标签.
///
/// 超出 `0..=4` 的标签被忽略.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: [[u64; 5]; 5],
}

impl ConfusionMatrix {
    /// 统计.
    pub fn from_labels(truth: &[u8], pred: &[u8]) -> CascadeResult<Self> {
        ensure_len("predicted labels", truth.len(), pred.len())?;
        let mut counts = [[0; 5]; 5];
        for (&t, &p) in truth.iter().zip(pred) {
            if let Some(c) = counts.get_mut(t as usize).and_then(|r| r.get_mut(p as usize)) {
                *c += 1;
            }
        }
        Ok(Self { counts })
    }

    /// 真实标签为 `t` 且预测为 `p` 的个数. 越界时 panic.
    #[inline]
    pub fn get(&self, t: u8, p: u8) -> u64 {
        self.counts[t as usize][p as usize]
    }

    /// 计入的样本总数.
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// 准确率. 没有样本时为 0.
    pub fn accuracy(&self) -> f64 {
        let hit: u64 = (0..5).map(|i| self.counts[i][i]).sum();
        ratio(hit, self.total())
    }

    /// 全部预测为背景时的准确率.
    pub fn majority_baseline(&self) -> f64 {
        ratio(self.counts[BACKGROUND as usize].iter().sum(), self.total())
    }
}

fn ratio(a: u64, b: u64) -> f64 {
    if b == 0 {
        0.0
    } else {
        a as f64 / b as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        write!(f, "{:>3}", "")?;
        for l in ALL_LABELS {
            write!(f, " {l:>width$}")?;
        }
        for (t, row) in ALL_LABELS.iter().zip(self.counts.iter()) {
            write!(f, "\n{t:>3}")?;
            for c in row {
                write!(f, " {c:>width$}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 4, 4, 9], &[0, 1, 1, 4, 2, 0]).unwrap();
        assert_eq!(cm.total(), 5);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(4, 2), 1);
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
        assert!((cm.majority_baseline() - 0.4).abs() < 1e-12);
        assert_eq!(cm.to_string().lines().count(), 6);
        assert!(ConfusionMatrix::from_labels(&[0], &[]).is_err());
    }
}
