//! 后处理超参数校准.
//!
//! 三种扫描共享 [`calibrate`]: 对每个候选值在整个开发集上运行部分流程,
//! 按患者分组计算重叠度, 以所有患者、所有区域的得分之和为目标.
//! 得分严格更大时才替换当前最优, 因此平分时先出现的候选值获胜.

mod potential;
mod radius;
mod sweep;
mod threshold;

pub use potential::sweep_potential;
pub use radius::sweep_radius;
pub use sweep::{calibrate, Calibrated, PatientSweep, Sweep, SweepPlots};
pub use threshold::sweep_threshold;

/// 把肿瘤掩码转为二分类标签.
#[inline]
pub(crate) fn mask_to_labels(mask: &[bool]) -> Vec<u8> {
    use crate::consts::label::TUMOR;
    mask.iter().map(|&m| u8::from(m) * TUMOR).collect()
}
