// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 张量编码器
/// Interleaved u8 pixels (RGB or RGBA) → planar f32 NCHW tensor in [0, 1].
use ndarray::{Array, IxDyn};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct TensorEncoder {
    width: u32,
    height: u32,
}

impl TensorEncoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `channels` 为每像素字节数 (3 = RGB, 4 = RGBA, alpha 丢弃)
    pub fn encode(&self, pixels: &[u8], channels: usize) -> Result<Array<f32, IxDyn>> {
        let (w, h) = (self.width as usize, self.height as usize);
        let expected = w * h * channels;
        if channels < 3 || pixels.len() != expected {
            return Err(PipelineError::InvalidPixelBuffer {
                expected,
                actual: pixels.len(),
            });
        }

        let mut ys = Array::zeros((1, 3, h, w)).into_dyn();
        for (i, px) in pixels.chunks_exact(channels).enumerate() {
            let (y, x) = (i / w, i % w);
            ys[[0, 0, y, x]] = px[0] as f32 / 255.0;
            ys[[0, 1, y, x]] = px[1] as f32 / 255.0;
            ys[[0, 2, y, x]] = px[2] as f32 / 255.0;
        }

        Ok(ys)
    }
}
