//! 运行时错误.

use ndarray_npy::ReadNpzError;
use std::error::Error;
use std::fmt;
use std::io;

/// 级联训练、校准与预测的运行时错误.
#[derive(Debug)]
pub enum CascadeError {
    /// 两个本应等长的序列长度不一致.
    ///
    /// 第一个参数描述出错的对象, 后两个参数分别为期望长度和实际长度.
    ShapeMismatch(&'static str, usize, usize),

    /// 样本权重不是正的有限实数. 参数为样本下标.
    InvalidWeight(usize),

    /// 体素坐标超出体积范围. 参数为样本下标.
    CoordOutOfBounds(usize),

    /// 训练集为空, 或不包含任何可用类别.
    EmptyTrainingSet,

    /// 候选超参数列表为空. 参数为扫描名称.
    EmptyCandidates(&'static str),

    /// 配置非法.
    InvalidConfig(String),

    /// 底层 I/O 错误.
    Io(io::Error),

    /// 读取 npz 归档错误.
    Npz(ReadNpzError),

    /// 模型序列化/反序列化错误.
    Codec(bincode::Error),

    /// 配置文件解析错误.
    Json(serde_json::Error),

    /// 图片编码或写入错误.
    Image(image::ImageError),
}

/// 级联运行时错误的简写.
pub type CascadeResult<T> = Result<T, CascadeError>;

impl fmt::Display for CascadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch(what, expected, found) => {
                write!(f, "{what}: expected length {expected}, found {found}")
            }
            Self::InvalidWeight(i) => write!(f, "sample weight #{i} is not a positive finite real"),
            Self::CoordOutOfBounds(i) => write!(f, "coordinate of sample #{i} lies outside the volume"),
            Self::EmptyTrainingSet => write!(f, "training set is empty"),
            Self::EmptyCandidates(name) => write!(f, "no candidates given to the `{name}` sweep"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Npz(e) => write!(f, "npz error: {e}"),
            Self::Codec(e) => write!(f, "model codec error: {e}"),
            Self::Json(e) => write!(f, "config parse error: {e}"),
            Self::Image(e) => write!(f, "image error: {e}"),
        }
    }
}

impl Error for CascadeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Npz(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CascadeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ReadNpzError> for CascadeError {
    fn from(e: ReadNpzError) -> Self {
        Self::Npz(e)
    }
}

impl From<bincode::Error> for CascadeError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<serde_json::Error> for CascadeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<image::ImageError> for CascadeError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}

/// 检查两个长度是否一致.
#[inline]
pub(crate) fn ensure_len(what: &'static str, expected: usize, found: usize) -> CascadeResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(CascadeError::ShapeMismatch(what, expected, found))
    }
}
