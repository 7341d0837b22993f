//! 两阶段级联预测: 检测 → 形态学修整 → 子区域分类 → 空间正则化.

mod predictor;
mod regularizer;

pub use predictor::{detect_with_floor, CascadeParams, CascadePrediction, Subtyped, TwoStagePredictor};
pub use regularizer::Regularizer;
