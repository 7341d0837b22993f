//! 基于成对势函数的标签平滑 (迭代条件众数, ICM).

use super::{Edge, PotentialMatrix};
use crate::error::ensure_len;
use crate::model::argmax;
use crate::CascadeResult;
use ndarray::ArrayView2;

/// ICM 最多扫描的轮数.
pub const MAX_SWEEPS: usize = 10;

/// 防止 `ln(0)`.
const EPS: f64 = 1e-10;

/// 在邻近图上平滑标签, 返回从 0 开始的类别下标.
///
/// 体素 `i` 取类别 `k` 的得分为 `ln p[i][k] + Σ_{j ~ i} potential[k][label_j]`.
/// 从逐体素最大概率出发, 按下标顺序逐个把体素改为得分最高的类别 (平局取靠前者),
/// 直到一轮扫描中没有体素改变或达到 [`MAX_SWEEPS`] 轮.
///
/// # 错误
///
/// 势函数矩阵的大小与概率矩阵的列数不一致时返回 [`ShapeMismatch`](crate::CascadeError::ShapeMismatch).
///
/// # 注意
///
/// 边的端点必须是合法的行下标, 否则程序 panic.
pub fn smooth_labels(
    proba: ArrayView2<'_, f32>,
    edges: &[Edge],
    potential: &PotentialMatrix,
) -> CascadeResult<Vec<usize>> {
    let (n, k) = proba.dim();
    ensure_len("potential matrix size", k, potential.size())?;

    let mut neighbours = vec![Vec::new(); n];
    for &(a, b) in edges {
        neighbours[a].push(b);
        neighbours[b].push(a);
    }
    let unary = proba.mapv(|p| (f64::from(p) + EPS).ln());
    let mut labels: Vec<usize> = proba.outer_iter().map(argmax).collect();

    let mut score = vec![0.0; k];
    for _ in 0..MAX_SWEEPS {
        let mut changed = 0;
        for i in 0..n {
            score.iter_mut().zip(unary.row(i)).for_each(|(s, u)| *s = *u);
            for &j in neighbours[i].iter() {
                let lj = labels[j];
                score
                    .iter_mut()
                    .enumerate()
                    .for_each(|(c, s)| *s += potential.get(c, lj));
            }
            let mut best = 0;
            for c in 1..k {
                if score[c] > score[best] {
                    best = c;
                }
            }
            if best != labels[i] {
                labels[i] = best;
                changed += 1;
            }
        }
        if changed == 0 {
            break;
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post_proc::build_proximity_graph;
    use ndarray::array;

    #[test]
    fn test_zero_potential_is_argmax() {
        let p = array![[0.1f32, 0.9], [0.6, 0.4], [0.5, 0.5]];
        let pot = PotentialMatrix::new(2, vec![0.0; 4]).unwrap();
        let labels = smooth_labels(p.view(), &[(0, 1), (1, 2)], &pot).unwrap();
        assert_eq!(labels, vec![1, 0, 0]);
    }

    #[test]
    fn test_smoothing_flips_outlier() {
        // 一条线上 5 个体素, 中间体素略偏向类别 1, 其余强烈偏向类别 0.
        let coords: Vec<_> = (0..5).map(|w| (0, 0, w)).collect();
        let p = array![[0.9f32, 0.1], [0.9, 0.1], [0.45, 0.55], [0.9, 0.1], [0.9, 0.1]];
        let edges = build_proximity_graph(&coords);
        let pot = PotentialMatrix::quadratic_base(&[1, 2]).scaled(0.5);
        assert_eq!(smooth_labels(p.view(), &edges, &pot).unwrap(), vec![0; 5]);

        let wrong = PotentialMatrix::calibrated_default();
        assert!(smooth_labels(p.view(), &edges, &wrong).is_err());
    }
}
