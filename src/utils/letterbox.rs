// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// Letterbox 变换
/// Aspect-preserving resize into a fixed canvas with centred padding.
///
/// 正向: source → model, `m = s * p + pad`
/// 逆向: model → source, `p = (m - pad) / s`
///
/// padding 取整数 `floor((W - newW) / 2)`: 画布贴图位置与逆变换使用同一个偏移,
/// 奇数时多出的 1 像素落在右侧/底部。
///
/// `LetterboxPlan` 是 `(w, h, W, H)` 的纯函数, 解码阶段直接重新计算,
/// 不需要在流水线中传递额外状态。
use std::borrow::Cow;

use fast_image_resize as fr;
use image::RgbImage;

use super::affine_transform::AffineMatrix;
use crate::error::{PipelineError, Result};

/// Letterbox 参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxPlan {
    pub scale: f64,
    pub pad_x: f64,
    pub pad_y: f64,
    pub new_w: u32,
    pub new_h: u32,
    pub target_w: u32,
    pub target_h: u32,
    forward: AffineMatrix,
    inverse: AffineMatrix,
}

impl LetterboxPlan {
    pub fn new(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> Result<Self> {
        if src_w == 0 || src_h == 0 {
            return Err(PipelineError::Letterbox(format!(
                "source size {}x{} is empty",
                src_w, src_h
            )));
        }
        if target_w == 0 || target_h == 0 {
            return Err(PipelineError::Letterbox(format!(
                "target size {}x{} is empty",
                target_w, target_h
            )));
        }

        let (w0, h0) = (src_w as f64, src_h as f64);
        let (w1, h1) = (target_w as f64, target_h as f64);
        let scale = (w1 / w0).min(h1 / h0);
        // 极端长宽比下保证至少 1 像素
        let new_w = ((w0 * scale).round() as u32).clamp(1, target_w);
        let new_h = ((h0 * scale).round() as u32).clamp(1, target_h);
        let pad_x = ((target_w - new_w) / 2) as f64;
        let pad_y = ((target_h - new_h) / 2) as f64;

        let forward =
            AffineMatrix::translation(pad_x, pad_y).compose(&AffineMatrix::scale(scale, scale));
        let inverse = forward.inverse().ok_or_else(|| {
            PipelineError::Letterbox(format!(
                "scale {scale} for {src_w}x{src_h} → {target_w}x{target_h} is not invertible"
            ))
        })?;

        Ok(Self {
            scale,
            pad_x,
            pad_y,
            new_w,
            new_h,
            target_w,
            target_h,
            forward,
            inverse,
        })
    }

    /// source → model 仿射矩阵
    pub fn forward(&self) -> AffineMatrix {
        self.forward
    }

    /// model → source 仿射矩阵
    pub fn inverse(&self) -> AffineMatrix {
        self.inverse
    }

    pub fn to_model(&self, x: f64, y: f64) -> (f64, f64) {
        self.forward.transform_point(x, y)
    }

    /// model → source
    pub fn to_source(&self, mx: f32, my: f32) -> (f32, f32) {
        let (sx, sy) = self.inverse.transform_point(mx as f64, my as f64);
        (sx as f32, sy as f32)
    }

    /// 画布上贴图的整数偏移
    pub fn offset(&self) -> (u32, u32) {
        (self.pad_x as u32, self.pad_y as u32)
    }
}

/// Letterbox 之后的画布 (RGB 交错排列, `target_w x target_h`)
#[derive(Debug, Clone)]
pub struct LetterboxCanvas {
    pub plan: LetterboxPlan,
    pub pixels: Vec<u8>,
}

/// Letterbox 变换器: 固定目标尺寸 + 填充色
#[derive(Debug, Clone)]
pub struct Letterbox {
    target_w: u32,
    target_h: u32,
    pad_color: [u8; 3],
}

impl Letterbox {
    pub fn new(target_w: u32, target_h: u32, pad_color: [u8; 3]) -> Self {
        Self {
            target_w,
            target_h,
            pad_color,
        }
    }

    pub fn plan(&self, src_w: u32, src_h: u32) -> Result<LetterboxPlan> {
        LetterboxPlan::new(src_w, src_h, self.target_w, self.target_h)
    }

    /// 填充背景色, 再把缩放后的源图贴到 (pad_x, pad_y)
    pub fn apply(&self, img: &RgbImage) -> Result<LetterboxCanvas> {
        let (src_w, src_h) = img.dimensions();
        let plan = self.plan(src_w, src_h)?;

        let resized = if (plan.new_w, plan.new_h) == (src_w, src_h) {
            Cow::Borrowed(img.as_raw().as_slice())
        } else {
            Cow::Owned(resize_rgb(img, plan.new_w, plan.new_h)?)
        };

        let (tw, th) = (self.target_w as usize, self.target_h as usize);
        let mut pixels = Vec::with_capacity(tw * th * 3);
        for _ in 0..tw * th {
            pixels.extend_from_slice(&self.pad_color);
        }

        let (ox, oy) = plan.offset();
        let (ox, oy) = (ox as usize, oy as usize);
        let row_bytes = plan.new_w as usize * 3;
        for (row, src_row) in resized.chunks_exact(row_bytes).enumerate() {
            let start = ((oy + row) * tw + ox) * 3;
            pixels[start..start + row_bytes].copy_from_slice(src_row);
        }

        Ok(LetterboxCanvas { plan, pixels })
    }
}

fn resize_rgb(img: &RgbImage, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    let (src_w, src_h) = img.dimensions();
    let src_image = fr::images::ImageRef::new(src_w, src_h, img.as_raw(), fr::PixelType::U8x3)
        .map_err(|e| PipelineError::Letterbox(e.to_string()))?;
    let mut dst_image = fr::images::Image::new(dst_w, dst_h, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| PipelineError::Letterbox(e.to_string()))?;

    Ok(dst_image.into_vec())
}
