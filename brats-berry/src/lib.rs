#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 在 BraTS 风格的体素特征数据上实现两阶段肿瘤子区域分类级联,
//! 以及空间正则化后处理与其超参数校准.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 特征提取不在本 crate 范围内. 数据以 "每患者一个 npz 归档" 的形式提供,
//!   归档内已包含体素特征矩阵、标签、坐标和体积尺寸 (见 [`data::NpzProvider`]).
//! 2. 标签约定为 BraTS 五类: 0 为背景, 1..=4 为四个肿瘤子区域.
//!
//! # 流程
//!
//! ### 基础模型训练 ✅
//!
//! 带样本权重的随机森林 (bagging 决策树集成), 按配置指纹缓存到磁盘.
//!
//! 实现位于 `brats-berry/src/model`.
//!
//! ### 两阶段预测 ✅
//!
//! 1. 二分类检测肿瘤 (校准阈值 + 最小体积兜底);
//! 2. 三维形态学闭运算 + 小连通分量去除;
//! 3. 在检测到的体素上做四类子区域分类;
//! 4. 空间正则化: 成对势函数标签平滑, 或第二轮闭运算.
//!
//! 实现位于 `brats-berry/src/cascade`.
//!
//! ### 超参数校准 ✅
//!
//! 在开发集上分别扫描检测阈值、闭运算半径和平滑势函数,
//! 以所有患者、所有区域 Dice 之和为目标, 平分时先出现者获胜.
//!
//! 实现位于 `brats-berry/src/calibrate`.
//!
//! ### 在线学习对照 ✅
//!
//! 逐患者增量训练的 passive-aggressive 线性分类器, 用于与集成方法对比.
//!
//! 实现位于 `brats-berry/src/model/online.rs` 与 `brats-berry/src/experiment/online.rs`.

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod calibrate;
pub mod cascade;
pub mod config;
pub mod consts;
pub mod data;
mod error;
pub mod experiment;
pub mod metric;
pub mod model;
pub mod post_proc;
pub mod prelude;
pub mod report;

pub use error::{CascadeError, CascadeResult};
