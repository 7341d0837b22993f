use crate::consts::{DEFAULT_POTENTIAL_FACTOR, SUB_LABEL_ORDER};
use crate::error::ensure_len;
use crate::CascadeResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 成对势函数矩阵. `get(a, b)` 是相邻两体素分别取第 `a`, `b` 类时获得的奖励.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialMatrix {
    n: usize,
    data: Vec<f64>,
}

impl PotentialMatrix {
    /// 由行优先的 `n × n` 数据构造.
    pub fn new(n: usize, data: Vec<f64>) -> CascadeResult<Self> {
        ensure_len("potential matrix entries", n * n, data.len())?;
        Ok(Self { n, data })
    }

    /// 二次型基矩阵.
    ///
    /// 先取 `m[i][j] = (order[i] - order[j])²`, 再变换为 `(max - m) / max`,
    /// 因此对角线为 1, 秩次相差越大的类别之间奖励越小.
    /// 若所有秩次相同, 则结果全为 1.
    pub fn quadratic_base(order: &[u8]) -> Self {
        let n = order.len();
        let raw: Vec<f64> = order
            .iter()
            .flat_map(|&a| order.iter().map(move |&b| (f64::from(a) - f64::from(b)).powi(2)))
            .collect();
        let max = raw.iter().copied().fold(0.0, f64::max);
        let data = if max > 0.0 {
            raw.iter().map(|v| (max - v) / max).collect()
        } else {
            vec![1.0; n * n]
        };
        Self { n, data }
    }

    /// 所有元素乘以 `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            n: self.n,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// 未校准时使用的势函数: `0.04 ×` 子区域秩次 `[2, 1, 3, 4]` 的二次型基矩阵.
    pub fn calibrated_default() -> Self {
        Self::quadratic_base(&SUB_LABEL_ORDER).scaled(DEFAULT_POTENTIAL_FACTOR)
    }

    /// 势函数扫描的候选矩阵, 与 `factors` 一一对应.
    pub fn candidates(order: &[u8], factors: &[f64]) -> Vec<Self> {
        let base = Self::quadratic_base(order);
        factors.iter().map(|&f| base.scaled(f)).collect()
    }

    /// 类别个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    /// 越界时 panic.
    #[inline]
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.data[a * self.n + b]
    }

    /// 第 `a` 行.
    #[inline]
    pub fn row(&self, a: usize) -> &[f64] {
        &self.data[a * self.n..(a + 1) * self.n]
    }

    /// 是否对称?
    pub fn is_symmetric(&self) -> bool {
        (0..self.n).all(|a| (0..a).all(|b| self.get(a, b) == self.get(b, a)))
    }
}

impl fmt::Display for PotentialMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in 0..self.n {
            let row: Vec<String> = self.row(a).iter().map(|v| format!("{v:.8}")).collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}
