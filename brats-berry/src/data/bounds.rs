//! 多患者拼接数组中的患者下标边界.

use std::ops::Range;

/// 患者下标边界列表.
///
/// 形如 `[0, n0, n0 + n1, ...]`. 第 `i` 个患者的样本位于
/// `bounds[i]..bounds[i + 1]`; 最后一个元素总是拼接后的样本总数.
/// 列表总是以 `0` 开头且单调不减, 该性质由构造方式保证.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientBounds(Vec<usize>);

impl Default for PatientBounds {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl PatientBounds {
    /// 创建不含任何患者的边界列表 `[0]`.
    #[inline]
    pub fn new() -> Self {
        Self(vec![0])
    }

    /// 按每个患者的样本个数依次构造.
    pub fn from_lengths<I: IntoIterator<Item = usize>>(it: I) -> Self {
        let mut ans = Self::new();
        it.into_iter().for_each(|n| ans.push(n));
        ans
    }

    /// 追加一个有 `len` 个样本的患者.
    #[inline]
    pub fn push(&mut self, len: usize) {
        let last = self.total();
        self.0.push(last + len);
    }

    /// 样本总数.
    #[inline]
    pub fn total(&self) -> usize {
        // 非空由构造保证.
        *self.0.last().unwrap_or(&0)
    }

    /// 患者个数.
    #[inline]
    pub fn n_patients(&self) -> usize {
        self.0.len() - 1
    }

    /// 第 `i` 个患者的样本下标区间. 越界时 panic.
    #[inline]
    pub fn range(&self, i: usize) -> Range<usize> {
        self.0[i]..self.0[i + 1]
    }

    /// 按患者顺序迭代所有样本下标区间.
    pub fn ranges(&self) -> impl ExactSizeIterator<Item = Range<usize>> + '_ {
        self.0.windows(2).map(|w| w[0]..w[1])
    }

    /// 底层边界数组.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// 拼接若干患者的数组, 同时返回边界列表. 拼接顺序即输入顺序.
pub fn concat_with_bounds<T: Clone, S: AsRef<[T]>>(parts: &[S]) -> (Vec<T>, PatientBounds) {
    let total = parts.iter().map(|p| p.as_ref().len()).sum();
    let mut data = Vec::with_capacity(total);
    let mut bounds = PatientBounds::new();
    for p in parts {
        data.extend_from_slice(p.as_ref());
        bounds.push(p.as_ref().len());
    }
    (data, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_invariant() {
        let parts = vec![vec![1u8; 3], vec![], vec![2u8; 5], vec![0u8; 1]];
        let (data, bounds) = concat_with_bounds(&parts);

        assert_eq!(bounds.as_slice(), &[0, 3, 3, 8, 9]);
        assert_eq!(bounds.total(), data.len());
        assert_eq!(bounds.n_patients(), parts.len());
        assert!(bounds.as_slice().windows(2).all(|w| w[0] <= w[1]));
        for (r, p) in bounds.ranges().zip(parts.iter()) {
            assert_eq!(r.len(), p.len());
            assert_eq!(&data[r], p.as_slice());
        }
    }

    #[test]
    fn test_empty_bounds() {
        let b = PatientBounds::new();
        assert_eq!(b.total(), 0);
        assert_eq!(b.n_patients(), 0);
        assert_eq!(b.ranges().len(), 0);
        assert_eq!(PatientBounds::from_lengths([2, 2]).range(1), 2..4);
    }
}
