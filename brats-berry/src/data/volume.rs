//! 由稀疏体素坐标重建的三维标签体积.

use crate::consts::label::is_tumor;
use crate::error::ensure_len;
use crate::{CascadeError, CascadeResult, Idx3d};
use ndarray::{Array3, ArrayView2, Axis};
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

/// 单个连通区域.
pub type Area3d = Vec<Idx3d>;

/// 三维标签体积, 按 `(z, h, w)` 访问. 标签值以 `u8` 保存.
///
/// 患者数据以 "体素列表" 的形式流转 (特征行、标签、坐标一一对应),
/// 只有形态学等空间操作才需要把它们散射回规则网格.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVolume {
    data: Array3<u8>,
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl LabelVolume {
    /// 创建形状为 `dims` 的全背景体积.
    #[inline]
    pub fn zeros(dims: Idx3d) -> Self {
        Self {
            data: Array3::zeros(dims),
        }
    }

    /// 将 `values[i]` 写到 `coords[i]` 处, 其余体素为背景.
    ///
    /// # 错误
    ///
    /// `coords` 与 `values` 不等长时返回 [`ShapeMismatch`](CascadeError::ShapeMismatch),
    /// 坐标越界时返回 [`CoordOutOfBounds`](CascadeError::CoordOutOfBounds).
    pub fn scatter(dims: Idx3d, coords: &[Idx3d], values: &[u8]) -> CascadeResult<Self> {
        ensure_len("voxel values", coords.len(), values.len())?;
        let mut ans = Self::zeros(dims);
        for (i, (&pos, &v)) in coords.iter().zip(values).enumerate() {
            if !ans.check(&pos) {
                return Err(CascadeError::CoordOutOfBounds(i));
            }
            ans[pos] = v;
        }
        Ok(ans)
    }

    /// 按 `coords` 的顺序读出体素值. 越界时 panic.
    #[inline]
    pub fn gather(&self, coords: &[Idx3d]) -> Vec<u8> {
        coords.iter().map(|&p| self[p]).collect()
    }

    /// 体积形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取第 `z_index` 层水平切片. 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, u8> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 肿瘤体素最多的水平切片下标. 若不存在肿瘤则返回 `None`.
    pub fn busiest_slice(&self) -> Option<usize> {
        self.data
            .axis_iter(Axis(0))
            .map(|s| s.iter().filter(|p| is_tumor(**p)).count())
            .enumerate()
            .filter(|(_, c)| *c > 0)
            // 平局时取下标最小者.
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(z, _)| z)
    }

    /// 获取 `pos` 前后上下左右六个点的坐标.
    ///
    /// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
    pub fn diamond_neighbours(&self, (z, h, w): Idx3d) -> Vec<Idx3d> {
        [
            (z.wrapping_sub(1), h, w),
            (z.saturating_add(1), h, w),
            (z, h.wrapping_sub(1), w),
            (z, h.saturating_add(1), w),
            (z, h, w.wrapping_sub(1)),
            (z, h, w.saturating_add(1)),
        ]
        .into_iter()
        .filter(|p| self.check(p))
        .collect()
    }

    /// 按照 6-相邻规则获取所有满足谓词 `pred` 的连通区域.
    /// 区域按其第一个体素 (行优先序) 排列.
    pub fn areas(&self, pred: fn(u8) -> bool) -> Vec<Area3d> {
        let mut ans = Vec::with_capacity(1);
        let mut visited = Array3::<bool>::default(self.shape());
        let mut bfs_q = VecDeque::with_capacity(16);

        for (pos, &v) in self.data.indexed_iter() {
            if visited[pos] || !pred(v) {
                continue;
            }
            visited[pos] = true;
            bfs_q.push_back(pos);
            let mut this_area = Area3d::with_capacity(16);
            while let Some(cur) = bfs_q.pop_front() {
                this_area.push(cur);
                for neigh in self.diamond_neighbours(cur) {
                    if !visited[neigh] && pred(self[neigh]) {
                        visited[neigh] = true;
                        bfs_q.push_back(neigh);
                    }
                }
            }
            ans.push(this_area);
        }
        ans
    }
}
