// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 仿射变换矩阵
/// Axis-aligned 2x3 affine used for the letterbox forward/inverse mapping.
///
/// | sx  0  tx |
/// | 0   sy ty |
///
/// 只保留 letterbox 需要的缩放 + 平移,不含旋转/剪切。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub sx: f64,
    pub tx: f64,
    pub sy: f64,
    pub ty: f64,
}

impl AffineMatrix {
    /// 创建平移矩阵
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            sx: 1.0,
            tx: dx,
            sy: 1.0,
            ty: dy,
        }
    }

    /// 创建缩放矩阵
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            sx,
            tx: 0.0,
            sy,
            ty: 0.0,
        }
    }

    /// 应用仿射变换到点 (x, y)
    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (self.sx * x + self.tx, self.sy * y + self.ty)
    }

    /// 矩阵组合 (self * other): 先应用 other, 再应用 self
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            sx: self.sx * other.sx,
            tx: self.sx * other.tx + self.tx,
            sy: self.sy * other.sy,
            ty: self.sy * other.ty + self.ty,
        }
    }

    /// 计算逆矩阵 (用于反向映射), 缩放为0时不可逆
    pub fn inverse(&self) -> Option<Self> {
        if self.sx.abs() < 1e-12 || self.sy.abs() < 1e-12 {
            return None;
        }
        Some(Self {
            sx: 1.0 / self.sx,
            tx: -self.tx / self.sx,
            sy: 1.0 / self.sy,
            ty: -self.ty / self.sy,
        })
    }
}
