//! 对 `brats-berry::data` 的更一层封装. 提供更直接的数据集加载器.

use brats_berry::data::home_dataset_dir_with;
use std::env;
use std::path::PathBuf;

/// 获取 BraTS 体素特征数据集路径.
///
/// 1. 若环境变量 `$BRATS_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/brats`; 无法确定主目录时返回 `None`.
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("BRATS_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["brats"]),
    }
}
