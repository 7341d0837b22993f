//! 通用常量.

/// BraTS 标签值.
pub mod label {
    /// 背景体素.
    pub const BACKGROUND: u8 = 0;

    /// 坏死区.
    pub const NECROSIS: u8 = 1;

    /// 水肿区.
    pub const EDEMA: u8 = 2;

    /// 非增强肿瘤区.
    pub const NON_ENHANCING: u8 = 3;

    /// 增强肿瘤区.
    pub const ENHANCING: u8 = 4;

    /// 第一阶段二分类中的 "肿瘤" 标签.
    pub const TUMOR: u8 = 1;

    /// 四个肿瘤子区域标签, 即第二阶段模型的类别 (升序).
    pub const SUB_LABELS: [u8; 4] = [NECROSIS, EDEMA, NON_ENHANCING, ENHANCING];

    /// 全部五个标签 (升序).
    pub const ALL_LABELS: [u8; 5] = [BACKGROUND, NECROSIS, EDEMA, NON_ENHANCING, ENHANCING];

    /// 第一阶段模型的类别.
    pub const BINARY_LABELS: [u8; 2] = [BACKGROUND, TUMOR];

    /// 体素是否是肿瘤 (任意子区域)?
    #[inline]
    pub const fn is_tumor(p: u8) -> bool {
        matches!(p, NECROSIS | EDEMA | NON_ENHANCING | ENHANCING)
    }
}

/// 单通道颜色. 仅用于可视化.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道亮灰色.
    pub const LIGHT_GRAY: u8 = 0b_1100_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}

/// 预测肿瘤体素少于该值时, 改为取肿瘤概率最高的该数量个体素.
pub const MIN_TUMOR_VOXELS: usize = 3000;

/// 未校准时使用的闭运算半径.
pub const DEFAULT_RADIUS: usize = 6;

/// 未校准时使用的检测阈值.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// 未校准时使用的势函数倍率.
pub const DEFAULT_POTENTIAL_FACTOR: f64 = 0.04;

/// 二次势函数使用的子区域排序 (按 [`label::SUB_LABELS`] 的位置给出秩).
pub const SUB_LABEL_ORDER: [u8; 4] = [2, 1, 3, 4];

/// 阈值扫描的候选值 (升序).
pub const THRESHOLD_CANDIDATES: [f32; 9] = [0.55, 0.57, 0.58, 0.59, 0.6, 0.61, 0.62, 0.63, 0.65];

/// 闭运算半径扫描的候选值 (升序).
pub const RADIUS_CANDIDATES: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// 势函数扫描的倍率候选值 (升序).
pub const POTENTIAL_FACTORS: [f64; 9] = [0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.09, 0.1];

/// 势函数扫描时默认绘图的开发集患者个数.
pub const PLOTTED_DEV_PATIENTS: usize = 5;

/// 小于最大连通分量该比例的前景分量会被去除.
pub const COMPONENT_KEEP_RATIO: f64 = 0.1;

/// 默认森林规模.
pub const N_TREES: usize = 30;

/// 默认每患者最多采样的体素个数.
pub const VOXEL_CAP: usize = 30000;

/// 在线学习每患者最多采样的体素个数.
pub const ONLINE_VOXEL_CAP: usize = 10000;

/// 默认随机种子.
pub const SEED: u64 = 42;
