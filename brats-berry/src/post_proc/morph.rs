//! 基于欧氏距离变换的三维球形结构元形态学.
//!
//! 半径为 `r` 的结构元是离散球 `{d : |d|² <= r²}`. 运算在向外填充 `r`
//! 个体素的体积上进行, 因此膨胀不会被体积边界截断, 闭运算满足幂等性.

use crate::consts::COMPONENT_KEEP_RATIO;
use crate::data::LabelVolume;
use crate::error::ensure_len;
use crate::{CascadeError, CascadeResult, Idx3d};
use ndarray::{Array3, Axis};

/// 视为无穷远的平方距离.
const FAR: f64 = 1e20;

/// 一维平方距离变换 (下包络抛物线). `v`, `z` 为工作区, 长度分别至少为 `n` 和 `n + 1`.
fn dt_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    let cross = |q: usize, p: usize| {
        ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q as f64 - p as f64))
    };
    let mut k = 0;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = cross(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = cross(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, out) in d.iter_mut().enumerate().take(n) {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q.abs_diff(v[k]) as f64;
        *out = dq * dq + f[v[k]];
    }
}

/// 每个体素到最近的值为 `target` 的体素的平方欧氏距离.
/// 不存在这样的体素时结果不小于 `1e19`.
pub fn squared_distance_to(vol: &Array3<bool>, target: bool) -> Array3<f64> {
    let mut dist = vol.mapv(|b| if b == target { 0.0 } else { FAR });
    let n = vol.shape().iter().copied().max().unwrap_or(0);
    let (mut f, mut d) = (vec![0.0; n], vec![0.0; n]);
    let (mut v, mut z) = (vec![0; n], vec![0.0; n + 1]);
    for axis in 0..3 {
        for mut lane in dist.lanes_mut(Axis(axis)) {
            let len = lane.len();
            if len == 0 {
                continue;
            }
            f[..len].iter_mut().zip(lane.iter()).for_each(|(a, b)| *a = *b);
            dt_1d(&f[..len], &mut d[..len], &mut v, &mut z);
            lane.iter_mut().zip(&d[..len]).for_each(|(a, b)| *a = b.min(FAR));
        }
    }
    dist
}

/// 将体素列表上的掩码散射到向外填充 `pad` 的体积中.
fn padded(dims: Idx3d, coords: &[Idx3d], mask: &[bool], pad: usize) -> Array3<bool> {
    let (z, h, w) = dims;
    let mut vol = Array3::from_elem((z + 2 * pad, h + 2 * pad, w + 2 * pad), false);
    for (&(z0, h0, w0), _) in coords.iter().zip(mask).filter(|(_, m)| **m) {
        vol[(z0 + pad, h0 + pad, w0 + pad)] = true;
    }
    vol
}

/// 给定前景的平方距离场, 计算半径 `r` 的闭运算.
fn close_from_distance(to_fg: &Array3<f64>, r: usize) -> Array3<bool> {
    let r2 = (r * r) as f64;
    let dilated = to_fg.mapv(|d| d <= r2);
    let to_bg = squared_distance_to(&dilated, false);
    to_bg.mapv(|d| d > r2)
}

/// 检查逐体素数据与坐标等长, 且坐标都位于 `dims` 内.
fn check_voxels(coords: &[Idx3d], dims: Idx3d, values: usize) -> CascadeResult<()> {
    ensure_len("voxel mask", coords.len(), values)?;
    let (z, h, w) = dims;
    match coords.iter().position(|&(a, b, c)| a >= z || b >= h || c >= w) {
        Some(i) => Err(CascadeError::CoordOutOfBounds(i)),
        None => Ok(()),
    }
}

/// 在体素列表上读出填充体积的值.
fn gather_padded(vol: &Array3<bool>, coords: &[Idx3d], pad: usize) -> Vec<bool> {
    coords
        .iter()
        .map(|&(z, h, w)| vol[(z + pad, h + pad, w + pad)])
        .collect()
}

/// 对体素列表上的二值掩码做闭运算和/或小连通分量去除.
///
/// 结果与 `coords` 一一对应. 不在 `coords` 中的体素视为背景,
/// 闭运算新增的前景只在 `coords` 范围内报告.
///
/// # 错误
///
/// `coords` 与 `mask` 不等长时返回 [`ShapeMismatch`](CascadeError::ShapeMismatch),
/// 坐标不在 `dims` 内时返回 [`CoordOutOfBounds`](CascadeError::CoordOutOfBounds).
pub fn close_and_filter(
    coords: &[Idx3d],
    dims: Idx3d,
    mask: &[bool],
    do_closing: bool,
    do_component_removal: bool,
    radius: usize,
) -> CascadeResult<Vec<bool>> {
    check_voxels(coords, dims, mask.len())?;
    let closed = if do_closing && radius > 0 {
        let vol = padded(dims, coords, mask, radius);
        let closed = close_from_distance(&squared_distance_to(&vol, true), radius);
        gather_padded(&closed, coords, radius)
    } else {
        mask.to_vec()
    };
    if do_component_removal {
        remove_small_components(coords, dims, &closed, COMPONENT_KEEP_RATIO)
    } else {
        Ok(closed)
    }
}

/// 以多个半径分别做闭运算 (可选去除小分量), 膨胀所需的距离场只计算一次.
///
/// 返回值的第 `k` 项对应 `radii[k]`. 错误同 [`close_and_filter`].
pub fn close_multi_radii(
    coords: &[Idx3d],
    dims: Idx3d,
    mask: &[bool],
    radii: &[usize],
    do_component_removal: bool,
) -> CascadeResult<Vec<Vec<bool>>> {
    check_voxels(coords, dims, mask.len())?;
    let pad = radii.iter().copied().max().unwrap_or(0);
    let to_fg = squared_distance_to(&padded(dims, coords, mask, pad), true);
    radii
        .iter()
        .map(|&r| {
            let closed = gather_padded(&close_from_distance(&to_fg, r), coords, pad);
            if do_component_removal {
                remove_small_components(coords, dims, &closed, COMPONENT_KEEP_RATIO)
            } else {
                Ok(closed)
            }
        })
        .collect()
}

/// 逐标签闭运算 (不去除分量). 标签按升序处理, 后处理的标签覆盖先处理的;
/// 背景标签 `0` 不参与闭运算. 错误同 [`close_and_filter`].
pub fn close_labels(coords: &[Idx3d], dims: Idx3d, labels: &[u8], radius: usize) -> CascadeResult<Vec<u8>> {
    check_voxels(coords, dims, labels.len())?;
    let mut present = [false; 256];
    labels.iter().for_each(|&l| present[l as usize] = true);

    let mut ans = labels.to_vec();
    for l in (1..=u8::MAX).filter(|&l| present[l as usize]) {
        let mask: Vec<bool> = labels.iter().map(|&p| p == l).collect();
        let closed = close_and_filter(coords, dims, &mask, true, false, radius)?;
        ans.iter_mut()
            .zip(closed)
            .filter(|(_, c)| *c)
            .for_each(|(a, _)| *a = l);
    }
    Ok(ans)
}

/// 去除体积小于最大前景连通分量 `keep_ratio` 倍的分量 (6-相邻). 错误同 [`close_and_filter`].
pub fn remove_small_components(
    coords: &[Idx3d],
    dims: Idx3d,
    mask: &[bool],
    keep_ratio: f64,
) -> CascadeResult<Vec<bool>> {
    let values: Vec<u8> = mask.iter().map(|&m| u8::from(m)).collect();
    let vol = LabelVolume::scatter(dims, coords, &values)?;
    let areas = vol.areas(|p| p != 0);
    let largest = areas.iter().map(Vec::len).max().unwrap_or(0);

    let mut kept = LabelVolume::zeros(dims);
    for area in areas.iter().filter(|a| a.len() as f64 >= keep_ratio * largest as f64) {
        area.iter().for_each(|&p| kept[p] = 1);
    }
    Ok(kept.gather(coords).into_iter().map(|v| v != 0).collect())
}
