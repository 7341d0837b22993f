//! 评价指标: 按患者分组的区域重叠度与混淆矩阵.

mod confusion;
mod overlap;

pub use confusion::ConfusionMatrix;
pub use overlap::{overlap_scores, DiceScores, OverlapMetric, OverlapScores, Region};
