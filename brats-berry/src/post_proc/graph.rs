use crate::Idx3d;
use std::collections::HashMap;

/// 邻近图的一条无向边, 保存两端体素在列表中的下标.
pub type Edge = (usize, usize);

/// 以 6-相邻规则在体素列表上建立邻近图.
///
/// 每条无向边只出现一次, 且 `(i, j)` 满足 `coords[j]` 在某一轴上比 `coords[i]` 大 1.
/// 边按 `i` 升序, 同一 `i` 按 `z`, `h`, `w` 轴的顺序排列. 重复的坐标只保留最后一次出现.
pub fn build_proximity_graph(coords: &[Idx3d]) -> Vec<Edge> {
    let index: HashMap<Idx3d, usize> = coords.iter().enumerate().map(|(i, &p)| (p, i)).collect();
    let mut edges = Vec::with_capacity(coords.len() * 3);
    for (i, &(z, h, w)) in coords.iter().enumerate() {
        for next in [(z + 1, h, w), (z, h + 1, w), (z, h, w + 1)] {
            if let Some(&j) = index.get(&next) {
                edges.push((i, j));
            }
        }
    }
    edges
}
