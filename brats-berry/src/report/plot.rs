//! 预测结果的切片可视化.

use crate::consts::gray::*;
use crate::consts::label::{BACKGROUND, EDEMA, ENHANCING, NECROSIS, NON_ENHANCING};
use crate::data::LabelVolume;
use crate::{CascadeResult, Idx3d};
use image::{GrayImage, Luma};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// 大脑内背景体素的颜色, 用于显示大脑轮廓.
const BRAIN: u8 = 0b_0010_0000;

/// 使像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    match label {
        BACKGROUND => BRAIN,
        NECROSIS => DARK_GRAY,
        EDEMA => GRAY,
        NON_ENHANCING => LIGHT_GRAY,
        ENHANCING => WHITE,
        // 未知标签也按肿瘤显示.
        _ => WHITE,
    }
}

/// 把每个患者的 "真实标签 | 正则化前 | 正则化后" 三联图写为 PNG.
///
/// 显示的水平切片是真实肿瘤体素最多的一层; 真实标签中没有肿瘤时取预测结果中
/// 肿瘤最多的一层, 仍然没有时取中间层. 大脑外的体素为黑色.
#[derive(Debug, Clone)]
pub struct Plotter {
    dir: PathBuf,
    scale: u32,
}

impl Plotter {
    /// 图片写入目录 `dir`, 每个体素放大为 `4 × 4` 像素.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            scale: 4,
        }
    }

    /// 设置放大倍数, 至少为 1.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.max(1);
        self
    }

    /// 图片文件名 `pat{id}_slices_2S_{method}.png`.
    pub fn file_name(id: u32, method: &str) -> String {
        format!("pat{id}_slices_2S_{method}.png")
    }

    /// 绘制并保存, 返回图片路径.
    ///
    /// # 错误
    ///
    /// 三组标签与 `coords` 不等长或坐标越界时返回对应的形状错误;
    /// 目录创建或图片写入失败时返回 I/O 或图片错误.
    #[allow(clippy::too_many_arguments)]
    pub fn plot_predictions(
        &self,
        id: u32,
        method: &str,
        coords: &[Idx3d],
        dims: Idx3d,
        truth: &[u8],
        before: &[u8],
        after: &[u8],
    ) -> CascadeResult<PathBuf> {
        let panels = [
            LabelVolume::scatter(dims, coords, truth)?,
            LabelVolume::scatter(dims, coords, before)?,
            LabelVolume::scatter(dims, coords, after)?,
        ];
        let brain = LabelVolume::scatter(dims, coords, &vec![1; coords.len()])?;
        let z = panels[0]
            .busiest_slice()
            .or_else(|| panels[2].busiest_slice())
            .unwrap_or(dims.0 / 2);

        let (_, h, w) = dims;
        let s = self.scale;
        let panel_w = w as u32 * s;
        let mut img = GrayImage::new(panel_w * 3 + 2 * s, h as u32 * s);
        for (k, vol) in panels.iter().enumerate() {
            let x0 = k as u32 * (panel_w + s);
            if k > 0 {
                for y in 0..img.height() {
                    for dx in 0..s {
                        img.put_pixel(x0 - s + dx, y, Luma([WHITE]));
                    }
                }
            }
            let slice = vol.slice_at(z);
            let inside = brain.slice_at(z);
            for ((hh, ww), &pix) in slice.indexed_iter() {
                let v = if inside[(hh, ww)] == 0 { BLACK } else { pretty(pix) };
                for dy in 0..s {
                    for dx in 0..s {
                        img.put_pixel(x0 + ww as u32 * s + dx, hh as u32 * s + dy, Luma([v]));
                    }
                }
            }
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(id, method));
        img.save(&path)?;
        Ok(path)
    }

    /// 同 [`Plotter::plot_predictions`], 但失败时只记录警告.
    #[allow(clippy::too_many_arguments)]
    pub fn plot_or_warn(
        &self,
        id: u32,
        method: &str,
        coords: &[Idx3d],
        dims: Idx3d,
        truth: &[u8],
        before: &[u8],
        after: &[u8],
    ) {
        match self.plot_predictions(id, method, coords, dims, truth, before, after) {
            Ok(path) => info!("Saved {}", path.display()),
            Err(e) => warn!("Cannot plot patient {id} ({method}): {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_predictions() {
        let dir = std::env::temp_dir().join(format!("brats-berry-plot-{}", std::process::id()));
        let coords = vec![(0, 0, 0), (1, 0, 1), (1, 1, 1)];
        let p = Plotter::new(&dir).with_scale(2);
        let path = p
            .plot_predictions(7, "MRF", &coords, (2, 2, 2), &[0, 4, 2], &[0, 2, 2], &[0, 4, 4])
            .unwrap();
        assert!(path.ends_with("pat7_slices_2S_MRF.png"));

        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (2 * 2 * 3 + 4, 4));
        // 第 1 层: 真实标签 (0, 1) 为增强区.
        assert_eq!(img.get_pixel(2, 0).0, [WHITE]);
        assert_eq!(img.get_pixel(0, 0).0, [BLACK]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_plot_rejects_mismatched_labels() {
        let dir = std::env::temp_dir().join(format!("brats-berry-plot-bad-{}", std::process::id()));
        let p = Plotter::new(&dir);
        let ans = p.plot_predictions(1, "closing", &[(0, 0, 0), (0, 0, 1)], (1, 1, 2), &[1, 1], &[1], &[1, 1]);
        assert!(matches!(ans, Err(crate::CascadeError::ShapeMismatch(..))));
        assert!(!dir.join(Plotter::file_name(1, "closing")).exists());
    }
}
